use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use super::connection::ConnectionId;
use super::messages::Member;
use crate::identity::InstructorRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructorBinding {
    pub principal_id: String,
    pub role: InstructorRole,
    pub display_name: String,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentBinding {
    pub connection_id: ConnectionId,
    pub display_name: String,
    /// Join order, only used to make broadcasts deterministic
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
}

/// Who a relayed message is addressed to inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Instructor,
    Student(&'a str),
}

#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    pub course_id: String,
    /// Snapshot taken at creation, not kept in sync with the course store
    pub course_title: String,
    pub instructor: InstructorBinding,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    students: HashMap<String, StudentBinding>,
    next_seq: u64,
}

impl Room {
    pub fn new(
        room_id: String,
        course_id: String,
        course_title: String,
        instructor: InstructorBinding,
    ) -> Self {
        Self {
            room_id,
            course_id,
            course_title,
            instructor,
            status: RoomStatus::Active,
            created_at: Utc::now(),
            students: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn student(&self, student_id: &str) -> Option<&StudentBinding> {
        self.students.get(student_id)
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }

    pub fn has_student(&self, student_id: &str) -> bool {
        self.students.contains_key(student_id)
    }

    /// Returns false without touching the existing binding if the id is taken
    pub(crate) fn add_student(
        &mut self,
        student_id: String,
        connection_id: ConnectionId,
        display_name: String,
    ) -> bool {
        if self.students.contains_key(&student_id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.students.insert(
            student_id,
            StudentBinding {
                connection_id,
                display_name,
                seq,
            },
        );
        true
    }

    pub(crate) fn remove_student(&mut self, student_id: &str) -> Option<StudentBinding> {
        self.students.remove(student_id)
    }

    pub fn is_instructor_connection(&self, connection_id: &ConnectionId) -> bool {
        &self.instructor.connection_id == connection_id
    }

    /// Student id bound to this connection, if any
    pub fn student_id_for(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.students
            .iter()
            .find(|(_, binding)| &binding.connection_id == connection_id)
            .map(|(id, _)| id.as_str())
    }

    pub fn resolve(&self, target: Target<'_>) -> Option<&ConnectionId> {
        match target {
            Target::Instructor => Some(&self.instructor.connection_id),
            Target::Student(id) => self.students.get(id).map(|b| &b.connection_id),
        }
    }

    /// Students in join order
    pub fn students(&self) -> Vec<(&str, &StudentBinding)> {
        let mut students: Vec<_> = self
            .students
            .iter()
            .map(|(id, binding)| (id.as_str(), binding))
            .collect();
        students.sort_by_key(|(_, binding)| binding.seq);
        students
    }

    /// Instructor first, then students in join order
    pub fn member_connections(&self) -> Vec<ConnectionId> {
        std::iter::once(self.instructor.connection_id.clone())
            .chain(
                self.students()
                    .into_iter()
                    .map(|(_, binding)| binding.connection_id.clone()),
            )
            .collect()
    }

    pub fn member(&self, student_id: &str) -> Option<Member> {
        self.students.get(student_id).map(|binding| Member {
            id: student_id.to_string(),
            name: binding.display_name.clone(),
        })
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            course_id: self.course_id.clone(),
            course_title: self.course_title.clone(),
            instructor_id: self.instructor.principal_id.clone(),
            instructor_name: self.instructor.display_name.clone(),
            instructor_role: self.instructor.role,
            status: self.status,
            student_count: self.students.len(),
            created_at: self.created_at,
        }
    }
}

/// Read-only snapshot used by the room listing endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub course_id: String,
    pub course_title: String,
    pub instructor_id: String,
    pub instructor_name: String,
    pub instructor_role: InstructorRole,
    pub status: RoomStatus,
    pub student_count: usize,
    pub created_at: DateTime<Utc>,
}
