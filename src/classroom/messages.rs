//! Classroom wire protocol
//!
//! Frames are JSON text: `{"event": <name>, "data": <payload>, "ack": <id?>}`.
//! A frame carrying `ack` asks for a reply frame `{"event":"ack","data":{"id":..}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::ConnectionId;
use crate::error::{ClassroomError, Result};
use crate::identity::{InstructorRole, Principal};

/// Raw inbound frame before the payload is typed
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum RoomRefRepr {
    Bare(String),
    Object {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

/// Room addressed either as a bare string or as `{roomId}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RoomRefRepr")]
pub struct RoomRef {
    pub room_id: String,
}

impl From<RoomRefRepr> for RoomRef {
    fn from(repr: RoomRefRepr) -> Self {
        match repr {
            RoomRefRepr::Bare(room_id) | RoomRefRepr::Object { room_id } => Self { room_id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub course_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub room_id: String,
    pub student_id: String,
    pub sdp: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub room_id: String,
    pub sdp: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateRequest {
    pub room_id: String,
    pub candidate: Value,
    #[serde(default)]
    pub student_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub room_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiRequest {
    pub room_id: String,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteRequest {
    pub room_id: String,
    pub target_id: String,
    pub mute: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    pub room_id: String,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub room_id: String,
    #[serde(default)]
    pub task_data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub room_id: String,
    #[serde(default)]
    pub submission_data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    CreateRoom(CreateRoomRequest),
    JoinRoom(RoomRef),
    LeaveRoom(RoomRef),
    WebrtcOffer(OfferRequest),
    WebrtcAnswer(AnswerRequest),
    IceCandidate(IceCandidateRequest),
    SendMessage(ChatRequest),
    SendEmoji(EmojiRequest),
    MuteStudent(MuteRequest),
    KickStudent(KickRequest),
    RaiseHand(RoomRef),
    LowerHand(RoomRef),
    SendTask(TaskRequest),
    SubmitTask(SubmissionRequest),
}

impl ClientEvent {
    pub fn parse(event: &str, data: Value) -> Result<Self> {
        fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T> {
            serde_json::from_value(data)
                .map_err(|e| ClassroomError::InvalidMessage(format!("{event}: {e}")))
        }

        let parsed = match event {
            "create-room" => ClientEvent::CreateRoom(payload(event, data)?),
            "join-room" => ClientEvent::JoinRoom(payload(event, data)?),
            "leave-room" => ClientEvent::LeaveRoom(payload(event, data)?),
            "webrtc-offer" => ClientEvent::WebrtcOffer(payload(event, data)?),
            "webrtc-answer" => ClientEvent::WebrtcAnswer(payload(event, data)?),
            "ice-candidate" => ClientEvent::IceCandidate(payload(event, data)?),
            "send-message" => ClientEvent::SendMessage(payload(event, data)?),
            "send-emoji" => ClientEvent::SendEmoji(payload(event, data)?),
            "instructor-mute-student" => ClientEvent::MuteStudent(payload(event, data)?),
            "instructor-kick-student" => ClientEvent::KickStudent(payload(event, data)?),
            "raise-hand" => ClientEvent::RaiseHand(payload(event, data)?),
            "lower-hand" => ClientEvent::LowerHand(payload(event, data)?),
            "send-task" => ClientEvent::SendTask(payload(event, data)?),
            "submit-task" => ClientEvent::SubmitTask(payload(event, data)?),
            other => {
                return Err(ClassroomError::InvalidMessage(format!(
                    "unknown event '{other}'"
                )))
            }
        };
        Ok(parsed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CreateRoom(_) => "create-room",
            ClientEvent::JoinRoom(_) => "join-room",
            ClientEvent::LeaveRoom(_) => "leave-room",
            ClientEvent::WebrtcOffer(_) => "webrtc-offer",
            ClientEvent::WebrtcAnswer(_) => "webrtc-answer",
            ClientEvent::IceCandidate(_) => "ice-candidate",
            ClientEvent::SendMessage(_) => "send-message",
            ClientEvent::SendEmoji(_) => "send-emoji",
            ClientEvent::MuteStudent(_) => "instructor-mute-student",
            ClientEvent::KickStudent(_) => "instructor-kick-student",
            ClientEvent::RaiseHand(_) => "raise-hand",
            ClientEvent::LowerHand(_) => "lower-hand",
            ClientEvent::SendTask(_) => "send-task",
            ClientEvent::SubmitTask(_) => "submit-task",
        }
    }
}

/// `{id, name}` of a room member as seen by other members
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedReply {
    pub status: &'static str,
    pub room_id: String,
    pub course_title: String,
    pub instructor_name: String,
    pub instructor_role: InstructorRole,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedReply {
    pub status: &'static str,
    pub room_id: String,
    pub student_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AckReply {
    RoomCreated(RoomCreatedReply),
    Joined(JoinedReply),
    Done { status: &'static str },
    Error { error: String, code: &'static str },
}

impl AckReply {
    pub fn done() -> Self {
        AckReply::Done { status: "success" }
    }

    pub fn error(err: &ClassroomError) -> Self {
        AckReply::Error {
            error: err.to_string(),
            code: err.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
        principal: Principal,
    },
    Ack {
        id: u64,
        #[serde(flatten)]
        reply: AckReply,
    },
    /// Offer/answer failure reported to a sender that did not ask for an ack
    SignalingError {
        event: String,
        error: String,
    },
    RoomCreated(RoomCreatedReply),
    UserJoined(Member),
    UserLeft(Member),
    RoomEnded,
    WebrtcOffer {
        from: ConnectionId,
        sdp: Value,
        room_id: String,
    },
    WebrtcAnswer {
        from: ConnectionId,
        sdp: Value,
        room_id: String,
        student: Member,
    },
    IceCandidate {
        from: ConnectionId,
        candidate: Value,
        room_id: String,
        student_id: String,
    },
    NewMessage {
        sender: String,
        message: String,
        is_instructor: bool,
    },
    ReceiveEmoji {
        sender: String,
        emoji: String,
    },
    ForceMute,
    ForceUnmute,
    ForceKick,
    StudentRaisedHand(Member),
    StudentLoweredHand(Member),
    ReceiveTask(Value),
    TaskSubmitted {
        student_id: String,
        student_name: String,
        submission: Value,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
