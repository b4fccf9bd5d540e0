use std::sync::Arc;

use super::connection::{ConnectionId, Outbox};
use super::messages::{AckReply, ClientEvent, Envelope, ServerEvent};
use super::registry::RoomRegistry;
use crate::error::Result;
use crate::identity::Principal;

/// Decodes one connection's frames and applies them to the registry
pub struct SignalingHandler {
    registry: Arc<RoomRegistry>,
    connection_id: ConnectionId,
    principal: Principal,
    outbox: Outbox,
}

impl SignalingHandler {
    pub fn new(
        registry: Arc<RoomRegistry>,
        connection_id: ConnectionId,
        principal: Principal,
        outbox: Outbox,
    ) -> Self {
        Self {
            registry,
            connection_id,
            principal,
            outbox,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub async fn handle_text(&self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to parse signaling frame"
                );
                return;
            }
        };

        let ack = envelope.ack;
        let event = match ClientEvent::parse(&envelope.event, envelope.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    event = %envelope.event,
                    error = %e,
                    "Rejected signaling message"
                );
                if let Some(id) = ack {
                    self.send(ServerEvent::Ack {
                        id,
                        reply: AckReply::error(&e),
                    });
                }
                return;
            }
        };

        self.handle_event(event, ack).await;
    }

    pub async fn handle_event(&self, event: ClientEvent, ack: Option<u64>) {
        let name = event.name();
        let surfaces_errors = matches!(
            event,
            ClientEvent::WebrtcOffer(_) | ClientEvent::WebrtcAnswer(_)
        );

        match self.dispatch(event).await {
            Ok(Some(reply)) => {
                if let Some(id) = ack {
                    self.send(ServerEvent::Ack { id, reply });
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::info!(
                    connection_id = %self.connection_id,
                    event = name,
                    error = %e,
                    "Signaling request failed"
                );
                match ack {
                    Some(id) => self.send(ServerEvent::Ack {
                        id,
                        reply: AckReply::error(&e),
                    }),
                    None if surfaces_errors => self.send(ServerEvent::SignalingError {
                        event: name.to_string(),
                        error: e.to_string(),
                    }),
                    None => {}
                }
            }
        }
    }

    /// `Ok(Some)` carries an ack reply; events without one return `Ok(None)`
    async fn dispatch(&self, event: ClientEvent) -> Result<Option<AckReply>> {
        let registry = &self.registry;
        let me = &self.connection_id;

        match event {
            ClientEvent::CreateRoom(request) => {
                let reply = registry
                    .create_room(&request.room_id, &request.course_id, &self.principal, me)
                    .await?;
                self.send(ServerEvent::RoomCreated(reply.clone()));
                Ok(Some(AckReply::RoomCreated(reply)))
            }
            ClientEvent::JoinRoom(room) => {
                let reply = registry.join_room(&room.room_id, &self.principal, me).await?;
                Ok(Some(AckReply::Joined(reply)))
            }
            ClientEvent::LeaveRoom(room) => {
                registry.leave_room(&room.room_id, me).await;
                Ok(None)
            }
            ClientEvent::WebrtcOffer(request) => {
                registry.relay_offer(me, request).await?;
                Ok(Some(AckReply::done()))
            }
            ClientEvent::WebrtcAnswer(request) => {
                registry.relay_answer(me, request).await?;
                Ok(Some(AckReply::done()))
            }
            ClientEvent::IceCandidate(request) => {
                registry.relay_ice_candidate(me, request).await;
                Ok(None)
            }
            ClientEvent::SendMessage(request) => {
                registry.broadcast_chat(&request.room_id, me, &request.message).await;
                Ok(None)
            }
            ClientEvent::SendEmoji(request) => {
                registry.send_emoji(&request.room_id, me, &request.emoji).await;
                Ok(None)
            }
            ClientEvent::MuteStudent(request) => {
                registry
                    .mute_student(&request.room_id, me, &request.target_id, request.mute)
                    .await;
                Ok(None)
            }
            ClientEvent::KickStudent(request) => {
                registry
                    .kick_student(&request.room_id, me, &request.target_id)
                    .await;
                Ok(None)
            }
            ClientEvent::RaiseHand(room) => {
                registry.raise_hand(&room.room_id, me).await;
                Ok(None)
            }
            ClientEvent::LowerHand(room) => {
                registry.lower_hand(&room.room_id, me).await;
                Ok(None)
            }
            ClientEvent::SendTask(request) => {
                registry.send_task(&request.room_id, me, request.task_data).await;
                Ok(None)
            }
            ClientEvent::SubmitTask(request) => {
                registry
                    .submit_task(&request.room_id, me, request.submission_data)
                    .await;
                Ok(None)
            }
        }
    }

    fn send(&self, event: ServerEvent) {
        if self.outbox.send(event).is_err() {
            tracing::debug!(connection_id = %self.connection_id, "Reply dropped, connection closing");
        }
    }

    /// Runs the disconnect cascade for this connection
    pub async fn cleanup(&self) {
        self.registry.disconnect(&self.connection_id).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;
    use crate::classroom::test_support::*;

    async fn handler(
        registry: &Arc<RoomRegistry>,
        principal: Principal,
    ) -> (SignalingHandler, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::generate();
        registry.register_connection(id.clone(), principal.clone(), tx.clone()).await;
        (SignalingHandler::new(registry.clone(), id, principal, tx), rx)
    }

    fn wire(events: Vec<ServerEvent>) -> Vec<Value> {
        events
            .iter()
            .map(|e| serde_json::from_str(&e.to_json().unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_create_room_acks_and_emits() {
        let registry = registry();
        let (instructor, mut rx) = handler(&registry, admin()).await;

        instructor
            .handle_text(r#"{"event":"create-room","data":{"roomId":"r1","courseId":"c1"},"ack":1}"#)
            .await;

        let events = wire(drain(&mut rx));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "room-created");
        assert_eq!(events[1]["event"], "ack");
        assert_eq!(
            events[1]["data"],
            json!({
                "id": 1,
                "status": "success",
                "roomId": "r1",
                "courseTitle": "Physics 101",
                "instructorName": "islam",
                "instructorRole": "admin"
            })
        );
    }

    #[tokio::test]
    async fn test_errors_become_acks() {
        let registry = registry();
        let (instructor, mut rx) = handler(&registry, admin()).await;

        instructor
            .handle_text(r#"{"event":"create-room","data":{"roomId":"r1","courseId":"nope"},"ack":4}"#)
            .await;
        let events = wire(drain(&mut rx));
        assert_eq!(events[0]["data"], json!({"id": 4, "error": "Invalid course", "code": "CourseNotFound"}));

        instructor
            .handle_text(r#"{"event":"join-room","data":"missing","ack":5}"#)
            .await;
        let events = wire(drain(&mut rx));
        assert_eq!(events[0]["data"]["code"], "RoomNotFound");
    }

    #[tokio::test]
    async fn test_unknown_event_and_garbage() {
        let registry = registry();
        let (conn, mut rx) = handler(&registry, student("sa", "Amal")).await;

        conn.handle_text("not json").await;
        assert!(drain(&mut rx).is_empty());

        conn.handle_text(r#"{"event":"dance","ack":9}"#).await;
        let events = wire(drain(&mut rx));
        assert_eq!(events[0]["data"]["id"], 9);
        assert_eq!(events[0]["data"]["code"], "InvalidMessage");

        // no ack requested, nothing sent
        conn.handle_text(r#"{"event":"dance"}"#).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_offer_failure_without_ack_is_reported() {
        let registry = registry();
        let (instructor, mut rx) = handler(&registry, admin()).await;

        instructor
            .handle_text(r#"{"event":"webrtc-offer","data":{"roomId":"r1","studentId":"sa","sdp":{}}}"#)
            .await;
        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::SignalingError {
                event: "webrtc-offer".into(),
                error: "Invalid room or student".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_silent_events_never_reply() {
        let registry = registry();
        let (instructor, mut irx) = handler(&registry, admin()).await;
        let (amal, mut srx) = handler(&registry, student("sa", "Amal")).await;
        instructor
            .handle_text(r#"{"event":"create-room","data":{"roomId":"r1","courseId":"c1"}}"#)
            .await;
        drain(&mut irx);

        amal
            .handle_text(r#"{"event":"instructor-kick-student","data":{"roomId":"r1","targetId":"x"},"ack":3}"#)
            .await;
        amal
            .handle_text(r#"{"event":"ice-candidate","data":{"roomId":"r1","candidate":"c"},"ack":4}"#)
            .await;
        assert!(drain(&mut srx).is_empty());
        assert!(drain(&mut irx).is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_ends_owned_room() {
        let registry = registry();
        let (instructor, _irx) = handler(&registry, admin()).await;
        let (amal, mut srx) = handler(&registry, student("sa", "Amal")).await;

        instructor
            .handle_text(r#"{"event":"create-room","data":{"roomId":"r1","courseId":"c1"}}"#)
            .await;
        amal.handle_text(r#"{"event":"join-room","data":{"roomId":"r1"}}"#).await;
        drain(&mut srx);

        instructor.cleanup().await;
        assert_eq!(drain(&mut srx), vec![ServerEvent::RoomEnded]);
        assert!(!registry.room_exists("r1").await);
    }
}
