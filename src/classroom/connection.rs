use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

use super::messages::ServerEvent;
use crate::identity::Principal;

const CONNECTION_ID_LEN: usize = 20;

/// Transport-level id of one live connection.
///
/// This is the only key that ties a socket to its room bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CONNECTION_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Outbound half of a connection; the websocket writer drains the receiver
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Authenticated, not bound into any room
    Connected,
    /// Bound as instructor or student of a room
    Active,
}

pub(crate) struct LiveConnection {
    pub(crate) principal: Principal,
    pub(crate) outbox: Outbox,
    pub(crate) phase: ConnectionPhase,
}

impl LiveConnection {
    pub(crate) fn is_open(&self) -> bool {
        !self.outbox.is_closed()
    }
}
