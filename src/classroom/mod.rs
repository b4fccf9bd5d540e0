pub mod connection;
pub mod lifecycle;
pub mod messages;
pub mod moderation;
pub mod registry;
pub mod relay;
pub mod room;
pub mod server;
pub mod signaling;

pub use connection::{ConnectionId, ConnectionPhase, Outbox};
pub use messages::{ClientEvent, Envelope, ServerEvent};
pub use moderation::ModerationOutcome;
pub use registry::{Departure, RoomRegistry};
pub use room::{Room, RoomSummary, Target};
pub use server::ClassroomServer;
pub use signaling::SignalingHandler;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Notify};

    use super::{ConnectionId, RoomRegistry, ServerEvent};
    use crate::error::Result;
    use crate::identity::{Course, Directory, InstructorRole, Principal, Role, StaticDirectory};

    pub const ADMIN_ID: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";
    pub const ASSISTANT_ID: &str = "bbbbbbbbbbbbbbbbbbbbbbbb";
    pub const COURSE: &str = "c1";

    pub fn directory() -> StaticDirectory {
        StaticDirectory::new()
            .with_admin(ADMIN_ID, "islam")
            .with_assistant(ASSISTANT_ID, "mona")
            .with_course(COURSE, "Physics 101")
    }

    pub fn registry() -> Arc<RoomRegistry> {
        RoomRegistry::new(Arc::new(directory()))
    }

    pub fn admin() -> Principal {
        Principal {
            id: ADMIN_ID.into(),
            role: Role::Instructor(InstructorRole::Admin),
            display_name: "islam".into(),
        }
    }

    pub fn assistant() -> Principal {
        Principal {
            id: ASSISTANT_ID.into(),
            role: Role::Instructor(InstructorRole::Assistant),
            display_name: "mona".into(),
        }
    }

    pub fn student(id: &str, name: &str) -> Principal {
        Principal {
            id: id.into(),
            role: Role::Student,
            display_name: name.into(),
        }
    }

    pub async fn connect(
        registry: &RoomRegistry,
        principal: Principal,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::generate();
        registry.register_connection(id.clone(), principal, tx).await;
        (id, rx)
    }

    pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Signals `entered` when a course lookup starts, then holds it until
    /// `release` is notified
    pub struct Gate {
        pub entered: Arc<Notify>,
        pub release: Arc<Notify>,
    }

    pub struct GatedDirectory {
        inner: StaticDirectory,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl GatedDirectory {
        pub fn new() -> (Arc<Self>, Gate) {
            let gate = Gate {
                entered: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            };
            let directory = Arc::new(Self {
                inner: directory(),
                entered: gate.entered.clone(),
                release: gate.release.clone(),
            });
            (directory, gate)
        }
    }

    #[async_trait]
    impl Directory for GatedDirectory {
        async fn find_admin(&self, id: &str) -> Result<Option<String>> {
            self.inner.find_admin(id).await
        }

        async fn find_assistant(&self, id: &str) -> Result<Option<String>> {
            self.inner.find_assistant(id).await
        }

        async fn find_student(&self, id: &str) -> Result<Option<String>> {
            self.inner.find_student(id).await
        }

        async fn find_course(&self, id: &str) -> Result<Option<Course>> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.find_course(id).await
        }
    }
}
