//! Offer/answer/candidate routing between a room's instructor and its students.
//!
//! The server never looks inside session descriptions or candidates; it only
//! checks that sender and target are bound into the same room.

use super::connection::ConnectionId;
use super::messages::{AnswerRequest, IceCandidateRequest, OfferRequest, ServerEvent};
use super::registry::RoomRegistry;
use super::room::Target;
use crate::error::{ClassroomError, Result};

impl RoomRegistry {
    /// Instructor to student. Fails if the sender is not the room's instructor
    /// or the student is not bound into the room.
    pub async fn relay_offer(&self, from: &ConnectionId, request: OfferRequest) -> Result<()> {
        let state = self.state.read().await;

        let target = state
            .rooms
            .get(&request.room_id)
            .filter(|room| room.is_instructor_connection(from))
            .and_then(|room| room.resolve(Target::Student(&request.student_id)))
            .ok_or(ClassroomError::InvalidRoomOrStudent)?;

        tracing::debug!(
            room_id = %request.room_id,
            connection_id = %from,
            student_id = %request.student_id,
            "Relaying offer"
        );

        state.deliver(
            target,
            ServerEvent::WebrtcOffer {
                from: from.clone(),
                sdp: request.sdp,
                room_id: request.room_id.clone(),
            },
        );
        Ok(())
    }

    /// Student to instructor, tagged with the student's id and name
    pub async fn relay_answer(&self, from: &ConnectionId, request: AnswerRequest) -> Result<()> {
        let state = self.state.read().await;

        let room = state
            .rooms
            .get(&request.room_id)
            .ok_or_else(|| ClassroomError::RoomNotFound(request.room_id.clone()))?;
        let student = room
            .student_id_for(from)
            .and_then(|id| room.member(id))
            .ok_or(ClassroomError::InvalidRoomOrStudent)?;

        tracing::debug!(
            room_id = %request.room_id,
            connection_id = %from,
            student_id = %student.id,
            "Relaying answer"
        );

        state.deliver(
            &room.instructor.connection_id,
            ServerEvent::WebrtcAnswer {
                from: from.clone(),
                sdp: request.sdp,
                room_id: request.room_id.clone(),
                student,
            },
        );
        Ok(())
    }

    /// Routes a candidate to the named student, or to the instructor when no
    /// student is named. Unroutable candidates are dropped; returns whether
    /// one was delivered.
    pub async fn relay_ice_candidate(&self, from: &ConnectionId, request: IceCandidateRequest) -> bool {
        let state = self.state.read().await;

        let Some(room) = state.rooms.get(&request.room_id) else {
            tracing::debug!(room_id = %request.room_id, "Dropping candidate for unknown room");
            return false;
        };

        let route = match request.student_id.as_deref() {
            Some(student_id) if room.is_instructor_connection(from) => room
                .resolve(Target::Student(student_id))
                .map(|target| (target, student_id)),
            Some(_) => None,
            None => room
                .student_id_for(from)
                .map(|student_id| (&room.instructor.connection_id, student_id)),
        };

        let Some((target, student_id)) = route else {
            tracing::debug!(
                room_id = %request.room_id,
                connection_id = %from,
                "Dropping unroutable candidate"
            );
            return false;
        };

        state.deliver(
            target,
            ServerEvent::IceCandidate {
                from: from.clone(),
                candidate: request.candidate,
                room_id: request.room_id.clone(),
                student_id: student_id.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::classroom::messages::Member;
    use crate::classroom::test_support::*;
    use crate::classroom::{ConnectionId, RoomRegistry, ServerEvent};
    use crate::error::ClassroomError;

    use super::*;

    struct Classroom {
        registry: std::sync::Arc<RoomRegistry>,
        instructor: ConnectionId,
        irx: tokio::sync::mpsc::UnboundedReceiver<ServerEvent>,
        a: ConnectionId,
        arx: tokio::sync::mpsc::UnboundedReceiver<ServerEvent>,
        b: ConnectionId,
        brx: tokio::sync::mpsc::UnboundedReceiver<ServerEvent>,
    }

    async fn classroom() -> Classroom {
        let registry = registry();
        let (instructor, mut irx) = connect(&registry, admin()).await;
        registry.create_room("r1", COURSE, &admin(), &instructor).await.unwrap();
        let (a, mut arx) = connect(&registry, student("sa", "Amal")).await;
        registry.join_room("r1", &student("sa", "Amal"), &a).await.unwrap();
        let (b, mut brx) = connect(&registry, student("sb", "Badr")).await;
        registry.join_room("r1", &student("sb", "Badr"), &b).await.unwrap();
        drain(&mut irx);
        drain(&mut arx);
        drain(&mut brx);
        Classroom {
            registry,
            instructor,
            irx,
            a,
            arx,
            b,
            brx,
        }
    }

    fn offer(student_id: &str) -> OfferRequest {
        OfferRequest {
            room_id: "r1".into(),
            student_id: student_id.into(),
            sdp: json!({"type": "offer", "sdp": "v=0"}),
        }
    }

    #[tokio::test]
    async fn test_offer_reaches_only_target_student() {
        let mut c = classroom().await;

        // a second room must never see the offer
        let (other, mut orx) = connect(&c.registry, assistant()).await;
        c.registry.create_room("r2", COURSE, &assistant(), &other).await.unwrap();

        c.registry.relay_offer(&c.instructor, offer("sa")).await.unwrap();

        assert_eq!(
            drain(&mut c.arx),
            vec![ServerEvent::WebrtcOffer {
                from: c.instructor.clone(),
                sdp: json!({"type": "offer", "sdp": "v=0"}),
                room_id: "r1".into(),
            }]
        );
        assert!(drain(&mut c.brx).is_empty());
        assert!(drain(&mut c.irx).is_empty());
        assert!(drain(&mut orx).is_empty());
    }

    #[tokio::test]
    async fn test_offer_to_unknown_student_fails() {
        let c = classroom().await;
        let err = c.registry.relay_offer(&c.instructor, offer("ghost")).await.unwrap_err();
        assert!(matches!(err, ClassroomError::InvalidRoomOrStudent));
    }

    #[tokio::test]
    async fn test_offer_from_student_rejected() {
        let mut c = classroom().await;
        let err = c.registry.relay_offer(&c.a, offer("sb")).await.unwrap_err();
        assert!(matches!(err, ClassroomError::InvalidRoomOrStudent));
        assert!(drain(&mut c.brx).is_empty());
    }

    #[tokio::test]
    async fn test_answer_tagged_with_student() {
        let mut c = classroom().await;
        let answer = AnswerRequest {
            room_id: "r1".into(),
            sdp: json!({"type": "answer"}),
        };
        c.registry.relay_answer(&c.a, answer).await.unwrap();

        assert_eq!(
            drain(&mut c.irx),
            vec![ServerEvent::WebrtcAnswer {
                from: c.a.clone(),
                sdp: json!({"type": "answer"}),
                room_id: "r1".into(),
                student: Member {
                    id: "sa".into(),
                    name: "Amal".into()
                },
            }]
        );
        assert!(drain(&mut c.brx).is_empty());
    }

    #[tokio::test]
    async fn test_answer_errors() {
        let c = classroom().await;
        let missing = AnswerRequest {
            room_id: "nope".into(),
            sdp: json!({}),
        };
        assert!(matches!(
            c.registry.relay_answer(&c.a, missing).await,
            Err(ClassroomError::RoomNotFound(_))
        ));

        let (outsider, _rx) = connect(&c.registry, student("sx", "X")).await;
        let answer = AnswerRequest {
            room_id: "r1".into(),
            sdp: json!({}),
        };
        assert!(matches!(
            c.registry.relay_answer(&outsider, answer).await,
            Err(ClassroomError::InvalidRoomOrStudent)
        ));
    }

    #[tokio::test]
    async fn test_ice_candidate_routing() {
        let mut c = classroom().await;

        let to_student = IceCandidateRequest {
            room_id: "r1".into(),
            candidate: json!("cand-1"),
            student_id: Some("sb".into()),
        };
        assert!(c.registry.relay_ice_candidate(&c.instructor, to_student).await);
        assert_eq!(
            drain(&mut c.brx),
            vec![ServerEvent::IceCandidate {
                from: c.instructor.clone(),
                candidate: json!("cand-1"),
                room_id: "r1".into(),
                student_id: "sb".into(),
            }]
        );

        let to_instructor = IceCandidateRequest {
            room_id: "r1".into(),
            candidate: json!("cand-2"),
            student_id: None,
        };
        assert!(c.registry.relay_ice_candidate(&c.b, to_instructor).await);
        assert_eq!(
            drain(&mut c.irx),
            vec![ServerEvent::IceCandidate {
                from: c.b.clone(),
                candidate: json!("cand-2"),
                room_id: "r1".into(),
                student_id: "sb".into(),
            }]
        );
        assert!(drain(&mut c.arx).is_empty());
    }

    #[tokio::test]
    async fn test_unroutable_candidates_dropped() {
        let mut c = classroom().await;

        // students cannot address each other
        let sideways = IceCandidateRequest {
            room_id: "r1".into(),
            candidate: json!("cand"),
            student_id: Some("sb".into()),
        };
        assert!(!c.registry.relay_ice_candidate(&c.a, sideways).await);

        let unknown_room = IceCandidateRequest {
            room_id: "gone".into(),
            candidate: json!("cand"),
            student_id: None,
        };
        assert!(!c.registry.relay_ice_candidate(&c.a, unknown_room).await);

        assert!(drain(&mut c.brx).is_empty());
        assert!(drain(&mut c.irx).is_empty());
    }
}
