use std::sync::Arc;
use tokio::sync::mpsc;

use super::connection::ConnectionId;
use super::messages::ServerEvent;
use super::registry::RoomRegistry;
use super::signaling::SignalingHandler;
use crate::error::Result;
use crate::ice::{IceConfig, IceServersResponse};
use crate::identity::{Credentials, Directory, IdentityResolver};

/// Process-wide classroom service shared by every route
pub struct ClassroomServer {
    registry: Arc<RoomRegistry>,
    resolver: IdentityResolver,
    ice: IceConfig,
}

impl ClassroomServer {
    pub fn new(
        directory: Arc<dyn Directory>,
        jwt_secret: Option<&str>,
        dev_mode: bool,
        ice: IceConfig,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(directory.clone()),
            resolver: IdentityResolver::new(directory, jwt_secret, dev_mode),
            ice,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Resolves the connecting principal and registers the connection.
    ///
    /// The returned receiver is the connection's outbox; the first event in it
    /// is always `connected`.
    pub async fn connect(
        &self,
        credentials: &Credentials,
    ) -> (SignalingHandler, mpsc::UnboundedReceiver<ServerEvent>) {
        let connection_id = ConnectionId::generate();
        let principal = self.resolver.resolve(credentials, &connection_id).await;
        let (tx, rx) = mpsc::unbounded_channel();

        // cannot fail, the receiver is still in hand
        let _ = tx.send(ServerEvent::Connected {
            connection_id: connection_id.clone(),
            principal: principal.clone(),
        });

        self.registry
            .register_connection(connection_id.clone(), principal.clone(), tx.clone())
            .await;

        (
            SignalingHandler::new(self.registry.clone(), connection_id, principal, tx),
            rx,
        )
    }

    pub fn ice_servers(&self) -> Result<IceServersResponse> {
        self.ice.ice_servers(chrono::Utc::now().timestamp())
    }

    pub async fn shutdown(&self) -> usize {
        self.registry.shutdown().await
    }
}
