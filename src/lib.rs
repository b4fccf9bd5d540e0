//! Live-classroom signaling server.
//!
//! Keeps an in-memory registry of classrooms (one instructor connection and a
//! set of student connections each) and relays WebRTC offers, answers and ICE
//! candidates between them over a websocket event protocol. Media never
//! passes through the server.

pub mod api;
pub mod classroom;
pub mod config;
pub mod error;
pub mod ice;
pub mod identity;
pub mod logging;

pub use classroom::{ClassroomServer, ConnectionId, RoomRegistry};
pub use config::Config;
pub use error::{ClassroomError, Result};
