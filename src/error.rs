use thiserror::Error;

/// Custom error types for the classroom signaling server
#[derive(Debug, Error)]
pub enum ClassroomError {
    /// Validation errors
    #[error("Missing required fields")]
    MissingFields,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Room and membership errors
    #[error("Room already exists")]
    RoomAlreadyExists(String),

    #[error("Room does not exist or has ended")]
    RoomNotFound(String),

    #[error("You are already in this room")]
    AlreadyJoined(String),

    #[error("Student {0} not found in room")]
    StudentNotFound(String),

    #[error("Invalid room or student")]
    InvalidRoomOrStudent,

    #[error("Invalid course")]
    CourseNotFound(String),

    #[error("Instructor not found")]
    InstructorNotFound(String),

    #[error("Only admins and assistants can create rooms")]
    Unauthorized,

    /// Connection lifecycle errors
    #[error("Connection {0} is no longer live")]
    ConnectionClosed(String),

    /// External dependency errors
    #[error("Directory lookup failed: {0}")]
    Directory(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing required configuration: {0}")]
    MissingConfiguration(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using ClassroomError
pub type Result<T> = std::result::Result<T, ClassroomError>;

impl ClassroomError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        ClassroomError::Internal(msg.into())
    }

    /// Helper to create directory (external store) errors
    pub fn directory(msg: impl Into<String>) -> Self {
        ClassroomError::Directory(msg.into())
    }

    /// Stable machine-readable code sent alongside the message in acks
    pub fn code(&self) -> &'static str {
        match self {
            ClassroomError::MissingFields => "MissingFields",
            ClassroomError::InvalidMessage(_) => "InvalidMessage",
            ClassroomError::RoomAlreadyExists(_) => "RoomAlreadyExists",
            ClassroomError::RoomNotFound(_) => "RoomNotFound",
            ClassroomError::AlreadyJoined(_) => "AlreadyJoined",
            ClassroomError::StudentNotFound(_) => "StudentNotFound",
            ClassroomError::InvalidRoomOrStudent => "InvalidRoomOrStudent",
            ClassroomError::CourseNotFound(_) => "CourseNotFound",
            ClassroomError::InstructorNotFound(_) => "InstructorNotFound",
            ClassroomError::Unauthorized => "Unauthorized",
            ClassroomError::ConnectionClosed(_) => "ConnectionClosed",
            ClassroomError::Directory(_) => "DirectoryUnavailable",
            ClassroomError::InvalidToken(_) => "InvalidToken",
            ClassroomError::InvalidConfiguration(_)
            | ClassroomError::MissingConfiguration(_)
            | ClassroomError::SerializationFailed(_)
            | ClassroomError::Internal(_) => "Internal",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ClassroomError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ClassroomError::InvalidToken(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClassroomError::RoomNotFound("r1".to_string());
        assert_eq!(err.to_string(), "Room does not exist or has ended");

        let err = ClassroomError::AlreadyJoined("s1".to_string());
        assert_eq!(err.to_string(), "You are already in this room");
    }

    #[test]
    fn test_error_helpers() {
        let err = ClassroomError::internal("Something went wrong");
        assert!(matches!(err, ClassroomError::Internal(_)));

        let err = ClassroomError::directory("store offline");
        assert_eq!(err.to_string(), "Directory lookup failed: store offline");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ClassroomError::CourseNotFound("c1".into()).code(), "CourseNotFound");
        assert_eq!(ClassroomError::AlreadyJoined("s1".into()).code(), "AlreadyJoined");
        assert_eq!(ClassroomError::internal("x").code(), "Internal");
    }
}
