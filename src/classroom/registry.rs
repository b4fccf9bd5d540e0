use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::connection::{ConnectionId, ConnectionPhase, LiveConnection, Outbox};
use super::messages::{JoinedReply, Member, RoomCreatedReply, ServerEvent};
use super::room::{InstructorBinding, Room, RoomSummary, Target};
use crate::error::{ClassroomError, Result};
use crate::identity::{Directory, InstructorRole, Principal};

/// What a leave, kick or disconnect did to a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The instructor left; the room is gone and `notified` students were told
    RoomEnded { room_id: String, notified: usize },
    StudentLeft { room_id: String, student_id: String },
}

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) rooms: HashMap<String, Room>,
    pub(crate) connections: HashMap<ConnectionId, LiveConnection>,
}

impl RegistryState {
    pub(crate) fn is_live(&self, connection_id: &ConnectionId) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(LiveConnection::is_open)
    }

    pub(crate) fn principal(&self, connection_id: &ConnectionId) -> Option<&Principal> {
        self.connections.get(connection_id).map(|c| &c.principal)
    }

    /// Queues an event for one connection. Undeliverable events are dropped.
    pub(crate) fn deliver(&self, to: &ConnectionId, event: ServerEvent) -> bool {
        let Some(connection) = self.connections.get(to) else {
            tracing::debug!(connection_id = %to, "Dropping event for departed connection");
            return false;
        };

        if connection.outbox.send(event).is_err() {
            tracing::warn!(connection_id = %to, "Outbox closed, event dropped");
            return false;
        }
        true
    }

    pub(crate) fn broadcast(&self, to: &[ConnectionId], event: &ServerEvent) -> usize {
        to.iter()
            .filter(|connection_id| self.deliver(connection_id, event.clone()))
            .count()
    }

    fn is_bound(&self, connection_id: &ConnectionId) -> bool {
        self.rooms.values().any(|room| {
            room.is_instructor_connection(connection_id)
                || room.student_id_for(connection_id).is_some()
        })
    }

    fn refresh_phase(&mut self, connection_id: &ConnectionId) {
        let phase = if self.is_bound(connection_id) {
            ConnectionPhase::Active
        } else {
            ConnectionPhase::Connected
        };
        if let Some(connection) = self.connections.get_mut(connection_id) {
            connection.phase = phase;
        }
    }

    /// Deletes the room and tells every remaining member it ended
    pub(crate) fn end_room(&mut self, room_id: &str) -> Option<Departure> {
        let room = self.rooms.remove(room_id)?;

        let members = room.member_connections();
        self.broadcast(&members, &ServerEvent::RoomEnded);
        for connection_id in &members {
            self.refresh_phase(connection_id);
        }

        tracing::info!(
            room_id = %room_id,
            instructor = %room.instructor.display_name,
            students = room.student_count(),
            "Room ended"
        );

        Some(Departure::RoomEnded {
            room_id: room_id.to_string(),
            notified: room.student_count(),
        })
    }

    /// Drops a student binding and tells the remaining members
    pub(crate) fn remove_student(&mut self, room_id: &str, student_id: &str) -> Option<Departure> {
        let room = self.rooms.get_mut(room_id)?;
        let binding = room.remove_student(student_id)?;
        let remaining = room.member_connections();

        self.broadcast(
            &remaining,
            &ServerEvent::UserLeft(Member {
                id: student_id.to_string(),
                name: binding.display_name.clone(),
            }),
        );
        self.refresh_phase(&binding.connection_id);

        tracing::info!(
            room_id = %room_id,
            student_id = %student_id,
            name = %binding.display_name,
            "Student left room"
        );

        Some(Departure::StudentLeft {
            room_id: room_id.to_string(),
            student_id: student_id.to_string(),
        })
    }
}

/// Authoritative in-memory map of live classrooms and the connections bound to them.
///
/// Every operation takes the state lock once and runs to completion under it,
/// so operations on the same room never interleave. Directory lookups happen
/// before the lock is taken.
pub struct RoomRegistry {
    directory: Arc<dyn Directory>,
    pub(crate) state: RwLock<RegistryState>,
}

impl RoomRegistry {
    pub fn new(directory: Arc<dyn Directory>) -> Arc<Self> {
        Arc::new(Self {
            directory,
            state: RwLock::new(RegistryState::default()),
        })
    }

    pub async fn register_connection(
        &self,
        connection_id: ConnectionId,
        principal: Principal,
        outbox: Outbox,
    ) {
        let mut state = self.state.write().await;
        tracing::info!(
            connection_id = %connection_id,
            role = principal.role.as_str(),
            principal_id = %principal.id,
            "Connection registered"
        );
        state.connections.insert(
            connection_id,
            LiveConnection {
                principal,
                outbox,
                phase: ConnectionPhase::Connected,
            },
        );
    }

    pub async fn connection_phase(&self, connection_id: &ConnectionId) -> Option<ConnectionPhase> {
        let state = self.state.read().await;
        state.connections.get(connection_id).map(|c| c.phase)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Opens a room owned by the calling instructor connection
    pub async fn create_room(
        &self,
        room_id: &str,
        course_id: &str,
        principal: &Principal,
        connection_id: &ConnectionId,
    ) -> Result<RoomCreatedReply> {
        // ids are opaque keys, stored exactly as sent
        if room_id.trim().is_empty() || course_id.trim().is_empty() || principal.id.is_empty() {
            return Err(ClassroomError::MissingFields);
        }

        if self.state.read().await.rooms.contains_key(room_id) {
            return Err(ClassroomError::RoomAlreadyExists(room_id.to_string()));
        }

        let authority = principal.authority().ok_or(ClassroomError::Unauthorized)?;

        let course = self
            .directory
            .find_course(course_id)
            .await?
            .ok_or_else(|| ClassroomError::CourseNotFound(course_id.to_string()))?;

        let instructor_name = match authority.role {
            InstructorRole::Admin => self.directory.find_admin(&authority.id).await?,
            InstructorRole::Assistant => self.directory.find_assistant(&authority.id).await?,
        }
        .ok_or_else(|| ClassroomError::InstructorNotFound(authority.id.clone()))?;

        let mut state = self.state.write().await;

        // the lookups above may have outlived the connection
        if !state.is_live(connection_id) {
            tracing::info!(
                connection_id = %connection_id,
                room_id = %room_id,
                "Discarding room creation for closed connection"
            );
            return Err(ClassroomError::ConnectionClosed(connection_id.to_string()));
        }
        if state.rooms.contains_key(room_id) {
            return Err(ClassroomError::RoomAlreadyExists(room_id.to_string()));
        }

        let room = Room::new(
            room_id.to_string(),
            course.id.clone(),
            course.title.clone(),
            InstructorBinding {
                principal_id: authority.id.clone(),
                role: authority.role,
                display_name: instructor_name.clone(),
                connection_id: connection_id.clone(),
            },
        );
        state.rooms.insert(room_id.to_string(), room);
        state.refresh_phase(connection_id);

        tracing::info!(
            room_id = %room_id,
            course_title = %course.title,
            role = authority.role.as_str(),
            instructor = %instructor_name,
            "Room created"
        );

        Ok(RoomCreatedReply {
            status: "success",
            room_id: room_id.to_string(),
            course_title: course.title,
            instructor_name,
            instructor_role: authority.role,
        })
    }

    /// Binds the calling connection into a room as a student
    pub async fn join_room(
        &self,
        room_id: &str,
        principal: &Principal,
        connection_id: &ConnectionId,
    ) -> Result<JoinedReply> {
        let mut state = self.state.write().await;

        if !state.is_live(connection_id) {
            return Err(ClassroomError::ConnectionClosed(connection_id.to_string()));
        }

        let room = state
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| ClassroomError::RoomNotFound(room_id.to_string()))?;

        // the owning instructor is already a member
        if room.is_instructor_connection(connection_id) {
            return Err(ClassroomError::AlreadyJoined(principal.id.clone()));
        }

        let student_name = principal.display_name.clone();
        if !room.add_student(principal.id.clone(), connection_id.clone(), student_name.clone()) {
            return Err(ClassroomError::AlreadyJoined(principal.id.clone()));
        }
        let members = room.member_connections();

        state.refresh_phase(connection_id);
        state.broadcast(
            &members,
            &ServerEvent::UserJoined(Member {
                id: principal.id.clone(),
                name: student_name.clone(),
            }),
        );

        tracing::info!(
            room_id = %room_id,
            student_id = %principal.id,
            name = %student_name,
            "Student joined room"
        );

        Ok(JoinedReply {
            status: "success",
            room_id: room_id.to_string(),
            student_name,
        })
    }

    /// Explicit leave. The instructor leaving ends the room; a student leaving
    /// only drops their binding, even if the room becomes empty.
    pub async fn leave_room(
        &self,
        room_id: &str,
        connection_id: &ConnectionId,
    ) -> Option<Departure> {
        let mut state = self.state.write().await;
        let room = state.rooms.get(room_id)?;

        if room.is_instructor_connection(connection_id) {
            return state.end_room(room_id);
        }

        let principal_id = state.principal(connection_id)?.id.clone();
        let owns_binding = room
            .student(&principal_id)
            .is_some_and(|binding| &binding.connection_id == connection_id);
        if !owns_binding {
            return None;
        }
        state.remove_student(room_id, &principal_id)
    }

    pub async fn find_target_connection(
        &self,
        room_id: &str,
        target: Target<'_>,
    ) -> Result<ConnectionId> {
        let state = self.state.read().await;
        let room = state
            .rooms
            .get(room_id)
            .ok_or_else(|| ClassroomError::RoomNotFound(room_id.to_string()))?;

        room.resolve(target).cloned().ok_or_else(|| match target {
            Target::Student(id) => ClassroomError::StudentNotFound(id.to_string()),
            Target::Instructor => ClassroomError::InstructorNotFound(room_id.to_string()),
        })
    }

    pub async fn room(&self, room_id: &str) -> Option<Room> {
        self.state.read().await.rooms.get(room_id).cloned()
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.state.read().await.rooms.contains_key(room_id)
    }

    /// Snapshot of every active room, oldest first
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let state = self.state.read().await;
        let mut rooms: Vec<RoomSummary> = state.rooms.values().map(Room::summary).collect();
        rooms.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.room_id.cmp(&b.room_id))
        });
        rooms
    }

    /// Ends every room, notifying members. Returns the number of rooms ended.
    pub async fn shutdown(&self) -> usize {
        let mut state = self.state.write().await;
        let room_ids: Vec<String> = state.rooms.keys().cloned().collect();

        let ended = room_ids
            .iter()
            .filter(|room_id| state.end_room(room_id).is_some())
            .count();

        tracing::info!(rooms = ended, "Room registry shut down");
        ended
    }
}
