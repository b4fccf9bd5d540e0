use super::connection::ConnectionId;
use super::registry::{Departure, RoomRegistry};

impl RoomRegistry {
    /// Transport-level disconnect.
    ///
    /// The connection leaves the live table first, so nothing produced by the
    /// cascade (or by a lookup still in flight for it) can be delivered to or
    /// bound to it. Rooms it owned end; rooms it joined lose the binding.
    /// A room left with no students is kept while its instructor is connected.
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Vec<Departure> {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.remove(connection_id) else {
            return Vec::new();
        };

        let mut owned = Vec::new();
        let mut joined = Vec::new();
        for (room_id, room) in &state.rooms {
            if room.is_instructor_connection(connection_id) {
                owned.push(room_id.clone());
            } else if let Some(student_id) = room.student_id_for(connection_id) {
                joined.push((room_id.clone(), student_id.to_string()));
            }
        }

        let mut departures = Vec::with_capacity(owned.len() + joined.len());
        for room_id in &owned {
            departures.extend(state.end_room(room_id));
        }
        for (room_id, student_id) in &joined {
            departures.extend(state.remove_student(room_id, student_id));
        }

        tracing::info!(
            connection_id = %connection_id,
            principal_id = %connection.principal.id,
            rooms_ended = owned.len(),
            rooms_left = joined.len(),
            "Connection closed"
        );

        departures
    }
}

#[cfg(test)]
mod tests {
    use crate::classroom::messages::Member;
    use crate::classroom::test_support::*;
    use crate::classroom::{ServerEvent, Target};
    use crate::error::ClassroomError;

    use super::*;

    #[tokio::test]
    async fn test_instructor_drop_ends_room_for_every_student() {
        let registry = registry();
        let (instructor, irx) = connect(&registry, admin()).await;
        registry.create_room("r1", COURSE, &admin(), &instructor).await.unwrap();
        let (a, mut arx) = connect(&registry, student("sa", "Amal")).await;
        registry.join_room("r1", &student("sa", "Amal"), &a).await.unwrap();
        let (b, mut brx) = connect(&registry, student("sb", "Badr")).await;
        registry.join_room("r1", &student("sb", "Badr"), &b).await.unwrap();
        drain(&mut arx);
        drain(&mut brx);

        drop(irx);
        let departures = registry.disconnect(&instructor).await;
        assert_eq!(
            departures,
            vec![Departure::RoomEnded {
                room_id: "r1".into(),
                notified: 2
            }]
        );

        assert_eq!(drain(&mut arx), vec![ServerEvent::RoomEnded]);
        assert_eq!(drain(&mut brx), vec![ServerEvent::RoomEnded]);
        assert!(matches!(
            registry.find_target_connection("r1", Target::Instructor).await,
            Err(ClassroomError::RoomNotFound(_))
        ));
        assert!(matches!(
            registry.join_room("r1", &student("sc", "C"), &a).await,
            Err(ClassroomError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_student_drop_keeps_room() {
        let registry = registry();
        let (instructor, mut irx) = connect(&registry, admin()).await;
        registry.create_room("r1", COURSE, &admin(), &instructor).await.unwrap();
        let (a, _arx) = connect(&registry, student("sa", "Amal")).await;
        registry.join_room("r1", &student("sa", "Amal"), &a).await.unwrap();
        drain(&mut irx);

        let departures = registry.disconnect(&a).await;
        assert_eq!(
            departures,
            vec![Departure::StudentLeft {
                room_id: "r1".into(),
                student_id: "sa".into()
            }]
        );
        assert_eq!(
            drain(&mut irx),
            vec![ServerEvent::UserLeft(Member {
                id: "sa".into(),
                name: "Amal".into()
            })]
        );

        let room = registry.room("r1").await.unwrap();
        assert_eq!(room.student_count(), 0);
        assert_eq!(room.instructor.connection_id, instructor);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let registry = registry();
        let (conn, _rx) = connect(&registry, student("sa", "Amal")).await;

        assert!(registry.disconnect(&conn).await.is_empty());
        assert!(registry.disconnect(&conn).await.is_empty());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_student_can_rejoin_after_drop() {
        let registry = registry();
        let (instructor, _irx) = connect(&registry, admin()).await;
        registry.create_room("r1", COURSE, &admin(), &instructor).await.unwrap();

        let (first, _rx1) = connect(&registry, student("sa", "Amal")).await;
        registry.join_room("r1", &student("sa", "Amal"), &first).await.unwrap();
        registry.disconnect(&first).await;

        let (second, _rx2) = connect(&registry, student("sa", "Amal")).await;
        assert!(registry.join_room("r1", &student("sa", "Amal"), &second).await.is_ok());
    }
}
