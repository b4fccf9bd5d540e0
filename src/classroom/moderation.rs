//! Instructor controls and in-room interaction.
//!
//! Nothing here reports failure to the caller. A request from a connection
//! without the right binding, or naming a room or student that does not
//! exist, has no effect and returns [`ModerationOutcome::Ignored`].

use serde_json::Value;

use super::connection::ConnectionId;
use super::messages::ServerEvent;
use super::registry::{RegistryState, RoomRegistry};
use super::room::{Room, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOutcome {
    Applied,
    Ignored,
}

impl ModerationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ModerationOutcome::Applied)
    }
}

/// Room whose bound instructor is `requester`
fn instructor_room<'a>(
    state: &'a RegistryState,
    room_id: &str,
    requester: &ConnectionId,
) -> Option<&'a Room> {
    let room = state.rooms.get(room_id)?;
    if room.is_instructor_connection(requester) {
        return Some(room);
    }
    tracing::debug!(
        room_id = %room_id,
        connection_id = %requester,
        "Ignoring instructor action from non-instructor connection"
    );
    None
}

/// Room plus the sender's display name and role, for any bound member
fn member_room<'a>(
    state: &'a RegistryState,
    room_id: &str,
    sender: &ConnectionId,
) -> Option<(&'a Room, String, bool)> {
    let room = state.rooms.get(room_id)?;
    if room.is_instructor_connection(sender) {
        return Some((room, room.instructor.display_name.clone(), true));
    }
    let student_id = room.student_id_for(sender)?;
    let member = room.member(student_id)?;
    Some((room, member.name, false))
}

impl RoomRegistry {
    pub async fn mute_student(
        &self,
        room_id: &str,
        requester: &ConnectionId,
        target_id: &str,
        mute: bool,
    ) -> ModerationOutcome {
        let state = self.state.read().await;
        let Some(target) = instructor_room(&state, room_id, requester)
            .and_then(|room| room.resolve(Target::Student(target_id)))
        else {
            return ModerationOutcome::Ignored;
        };

        let directive = if mute {
            ServerEvent::ForceMute
        } else {
            ServerEvent::ForceUnmute
        };
        state.deliver(target, directive);

        tracing::info!(room_id = %room_id, student_id = %target_id, mute, "Student mute toggled");
        ModerationOutcome::Applied
    }

    /// Sends `force-kick` to the student, then unbinds them and tells the rest of the room
    pub async fn kick_student(
        &self,
        room_id: &str,
        requester: &ConnectionId,
        target_id: &str,
    ) -> ModerationOutcome {
        let mut state = self.state.write().await;
        let Some(target) = instructor_room(&state, room_id, requester)
            .and_then(|room| room.resolve(Target::Student(target_id)))
            .cloned()
        else {
            return ModerationOutcome::Ignored;
        };

        state.deliver(&target, ServerEvent::ForceKick);
        state.remove_student(room_id, target_id);

        tracing::info!(room_id = %room_id, student_id = %target_id, "Student kicked");
        ModerationOutcome::Applied
    }

    pub async fn raise_hand(&self, room_id: &str, requester: &ConnectionId) -> ModerationOutcome {
        self.signal_hand(room_id, requester, true).await
    }

    pub async fn lower_hand(&self, room_id: &str, requester: &ConnectionId) -> ModerationOutcome {
        self.signal_hand(room_id, requester, false).await
    }

    async fn signal_hand(
        &self,
        room_id: &str,
        requester: &ConnectionId,
        raised: bool,
    ) -> ModerationOutcome {
        let state = self.state.read().await;
        let Some(room) = state.rooms.get(room_id) else {
            return ModerationOutcome::Ignored;
        };
        let Some(member) = room.student_id_for(requester).and_then(|id| room.member(id)) else {
            return ModerationOutcome::Ignored;
        };

        tracing::debug!(room_id = %room_id, student_id = %member.id, raised, "Hand signal");

        let event = if raised {
            ServerEvent::StudentRaisedHand(member)
        } else {
            ServerEvent::StudentLoweredHand(member)
        };
        state.deliver(&room.instructor.connection_id, event);
        ModerationOutcome::Applied
    }

    /// Instructor pushes a task to every member of the room, itself included
    pub async fn send_task(
        &self,
        room_id: &str,
        requester: &ConnectionId,
        task: Value,
    ) -> ModerationOutcome {
        let state = self.state.read().await;
        let Some(room) = instructor_room(&state, room_id, requester) else {
            return ModerationOutcome::Ignored;
        };

        let delivered = state.broadcast(&room.member_connections(), &ServerEvent::ReceiveTask(task));
        tracing::info!(room_id = %room_id, delivered, "Task sent");
        ModerationOutcome::Applied
    }

    pub async fn submit_task(
        &self,
        room_id: &str,
        requester: &ConnectionId,
        submission: Value,
    ) -> ModerationOutcome {
        let state = self.state.read().await;
        let Some(room) = state.rooms.get(room_id) else {
            return ModerationOutcome::Ignored;
        };
        let Some(member) = room.student_id_for(requester).and_then(|id| room.member(id)) else {
            return ModerationOutcome::Ignored;
        };

        tracing::info!(room_id = %room_id, student_id = %member.id, "Task submitted");

        state.deliver(
            &room.instructor.connection_id,
            ServerEvent::TaskSubmitted {
                student_id: member.id,
                student_name: member.name,
                submission,
            },
        );
        ModerationOutcome::Applied
    }

    /// Chat to every member, marked with whether the sender is the instructor.
    /// Nothing is persisted.
    pub async fn broadcast_chat(
        &self,
        room_id: &str,
        sender: &ConnectionId,
        text: &str,
    ) -> ModerationOutcome {
        if text.trim().is_empty() {
            return ModerationOutcome::Ignored;
        }

        let state = self.state.read().await;
        let Some((room, sender_name, is_instructor)) = member_room(&state, room_id, sender) else {
            return ModerationOutcome::Ignored;
        };

        state.broadcast(
            &room.member_connections(),
            &ServerEvent::NewMessage {
                sender: sender_name,
                message: text.to_string(),
                is_instructor,
            },
        );
        ModerationOutcome::Applied
    }

    pub async fn send_emoji(
        &self,
        room_id: &str,
        sender: &ConnectionId,
        emoji: &str,
    ) -> ModerationOutcome {
        if emoji.is_empty() {
            return ModerationOutcome::Ignored;
        }

        let state = self.state.read().await;
        let Some((room, sender_name, _)) = member_room(&state, room_id, sender) else {
            return ModerationOutcome::Ignored;
        };

        state.broadcast(
            &room.member_connections(),
            &ServerEvent::ReceiveEmoji {
                sender: sender_name,
                emoji: emoji.to_string(),
            },
        );
        ModerationOutcome::Applied
    }
}
