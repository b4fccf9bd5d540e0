//! Connection identity resolution
//!
//! Every connection resolves to a [`Principal`] before its first event is
//! processed. Resolution never refuses a connection: anything that cannot be
//! verified or looked up degrades to an anonymous guest, and instructor-only
//! actions re-check the role where they are performed.

mod directory;
mod token;

pub use directory::{Course, Directory, StaticDirectory};
pub use token::{Claims, TokenVerifier};

#[cfg(test)]
pub(crate) use token::sign_for_tests;

use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::classroom::ConnectionId;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructorRole {
    Admin,
    Assistant,
}

impl InstructorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructorRole::Admin => "admin",
            InstructorRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Instructor(InstructorRole),
    Student,
    Anonymous,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Instructor(role) => role.as_str(),
            Role::Student => "student",
            Role::Anonymous => "anonymous",
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl Serialize for InstructorRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    #[serde(rename = "name")]
    pub display_name: String,
}

/// Proof that a principal may own and moderate a room.
///
/// Only obtainable from an admin or assistant principal, so registry code
/// takes this instead of matching on roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructorAuthority {
    pub id: String,
    pub role: InstructorRole,
    pub display_name: String,
}

impl Principal {
    pub fn anonymous(id: impl Into<String>) -> Self {
        let id = id.into();
        let display_name = fallback_name(&id);
        Self {
            id,
            role: Role::Anonymous,
            display_name,
        }
    }

    pub fn authority(&self) -> Option<InstructorAuthority> {
        match self.role {
            Role::Instructor(role) => Some(InstructorAuthority {
                id: self.id.clone(),
                role,
                display_name: self.display_name.clone(),
            }),
            Role::Student | Role::Anonymous => None,
        }
    }
}

/// `Student <first 8 chars>`, used wherever no stored name is available
pub fn fallback_name(id: &str) -> String {
    let short: String = id.chars().take(8).collect();
    format!("Student {short}")
}

/// Stable store identifiers are 24 hex digits
pub fn is_stable_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Raw credentials presented at connect time
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    /// Development mode only
    pub admin_id: Option<String>,
    /// Development mode only
    pub student_id: Option<String>,
}

/// One store probe in the resolution chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Admin,
    Assistant,
    Student,
}

impl Lookup {
    const INSTRUCTOR_CHAIN: &'static [Lookup] = &[Lookup::Admin, Lookup::Assistant];
    const STUDENT_CHAIN: &'static [Lookup] = &[Lookup::Student];
    const FULL_CHAIN: &'static [Lookup] = &[Lookup::Admin, Lookup::Assistant, Lookup::Student];

    async fn probe(self, directory: &dyn Directory, id: &str) -> Result<Option<Principal>> {
        let (name, role) = match self {
            Lookup::Admin => (
                directory.find_admin(id).await?,
                Role::Instructor(InstructorRole::Admin),
            ),
            Lookup::Assistant => (
                directory.find_assistant(id).await?,
                Role::Instructor(InstructorRole::Assistant),
            ),
            Lookup::Student => (directory.find_student(id).await?, Role::Student),
        };

        Ok(name.map(|name| Principal {
            id: id.to_string(),
            role,
            display_name: if name.is_empty() { fallback_name(id) } else { name },
        }))
    }
}

pub struct IdentityResolver {
    directory: Arc<dyn Directory>,
    verifier: Option<TokenVerifier>,
    dev_mode: bool,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn Directory>, jwt_secret: Option<&str>, dev_mode: bool) -> Self {
        Self {
            directory,
            verifier: jwt_secret.map(TokenVerifier::new),
            dev_mode,
        }
    }

    pub fn directory(&self) -> Arc<dyn Directory> {
        self.directory.clone()
    }

    pub async fn resolve(&self, credentials: &Credentials, connection_id: &ConnectionId) -> Principal {
        let Some((subject, chain)) = self.subject(credentials) else {
            return Principal::anonymous(connection_id.as_str());
        };

        if !is_stable_id(&subject) {
            tracing::debug!(
                connection_id = %connection_id,
                subject = %subject,
                "Subject is not a stable id, treating as guest"
            );
            return Principal::anonymous(subject);
        }

        for lookup in chain {
            match lookup.probe(self.directory.as_ref(), &subject).await {
                Ok(Some(principal)) => return principal,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        subject = %subject,
                        error = %e,
                        "Identity lookup failed, treating as guest"
                    );
                    break;
                }
            }
        }

        Principal::anonymous(subject)
    }

    fn subject(&self, credentials: &Credentials) -> Option<(String, &'static [Lookup])> {
        if self.dev_mode {
            if let Some(id) = non_empty(&credentials.admin_id) {
                return Some((id.to_string(), Lookup::INSTRUCTOR_CHAIN));
            }
            if let Some(id) = non_empty(&credentials.student_id) {
                return Some((id.to_string(), Lookup::STUDENT_CHAIN));
            }
        }

        let token = non_empty(&credentials.token)?;
        let Some(verifier) = &self.verifier else {
            tracing::warn!("Token presented but no JWT secret is configured");
            return None;
        };

        match verifier.verify(token) {
            Ok(claims) => claims
                .subject()
                .map(|id| (id.to_string(), Lookup::FULL_CHAIN)),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected connection token");
                None
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassroomError;
    use async_trait::async_trait;

    const ADMIN: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";
    const ASSISTANT: &str = "bbbbbbbbbbbbbbbbbbbbbbbb";
    const STUDENT: &str = "cccccccccccccccccccccccc";

    fn directory() -> Arc<dyn Directory> {
        Arc::new(
            StaticDirectory::new()
                .with_admin(ADMIN, "islam")
                .with_assistant(ASSISTANT, "mona")
                .with_student(STUDENT, "Omar"),
        )
    }

    fn conn() -> ConnectionId {
        ConnectionId::from("conn-1234567890")
    }

    fn token_for(id: &str) -> String {
        let claims = Claims {
            id: Some(id.to_string()),
            exp: chrono::Utc::now().timestamp() + 600,
            ..Claims::default()
        };
        sign_for_tests("secret", &claims)
    }

    #[tokio::test]
    async fn test_no_credentials_is_anonymous_by_connection() {
        let resolver = IdentityResolver::new(directory(), Some("secret"), false);
        let principal = resolver.resolve(&Credentials::default(), &conn()).await;

        assert_eq!(principal.role, Role::Anonymous);
        assert_eq!(principal.id, "conn-1234567890");
        assert_eq!(principal.display_name, "Student conn-123");
    }

    #[tokio::test]
    async fn test_token_resolves_chain_in_order() {
        let resolver = IdentityResolver::new(directory(), Some("secret"), false);

        let admin = Credentials {
            token: Some(token_for(ADMIN)),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&admin, &conn()).await;
        assert_eq!(principal.role, Role::Instructor(InstructorRole::Admin));
        assert_eq!(principal.display_name, "islam");

        let assistant = Credentials {
            token: Some(token_for(ASSISTANT)),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&assistant, &conn()).await;
        assert_eq!(principal.role, Role::Instructor(InstructorRole::Assistant));

        let student = Credentials {
            token: Some(token_for(STUDENT)),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&student, &conn()).await;
        assert_eq!(principal.role, Role::Student);
        assert_eq!(principal.display_name, "Omar");
    }

    #[tokio::test]
    async fn test_invalid_token_degrades_to_anonymous() {
        let resolver = IdentityResolver::new(directory(), Some("secret"), false);
        let creds = Credentials {
            token: Some("not-a-jwt".into()),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&creds, &conn()).await;
        assert_eq!(principal.role, Role::Anonymous);
        assert_eq!(principal.id, "conn-1234567890");
    }

    #[tokio::test]
    async fn test_unknown_stable_id_keeps_subject() {
        let resolver = IdentityResolver::new(directory(), Some("secret"), false);
        let unknown = "dddddddddddddddddddddddd";
        let creds = Credentials {
            token: Some(token_for(unknown)),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&creds, &conn()).await;
        assert_eq!(principal.role, Role::Anonymous);
        assert_eq!(principal.id, unknown);
        assert_eq!(principal.display_name, "Student dddddddd");
    }

    #[tokio::test]
    async fn test_dev_mode_query_params() {
        let resolver = IdentityResolver::new(directory(), None, true);

        let creds = Credentials {
            admin_id: Some(ADMIN.into()),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&creds, &conn()).await;
        assert!(principal.authority().is_some());

        // a student id never probes the instructor stores
        let creds = Credentials {
            student_id: Some(ADMIN.into()),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&creds, &conn()).await;
        assert_eq!(principal.role, Role::Anonymous);

        let creds = Credentials {
            student_id: Some("guest-42".into()),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&creds, &conn()).await;
        assert_eq!(principal.id, "guest-42");
        assert_eq!(principal.role, Role::Anonymous);
    }

    #[tokio::test]
    async fn test_dev_params_ignored_in_production() {
        let resolver = IdentityResolver::new(directory(), None, false);
        let creds = Credentials {
            admin_id: Some(ADMIN.into()),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&creds, &conn()).await;
        assert_eq!(principal.role, Role::Anonymous);
        assert_eq!(principal.id, "conn-1234567890");
    }

    struct BrokenDirectory;

    #[async_trait]
    impl Directory for BrokenDirectory {
        async fn find_admin(&self, _id: &str) -> Result<Option<String>> {
            Err(ClassroomError::directory("offline"))
        }
        async fn find_assistant(&self, _id: &str) -> Result<Option<String>> {
            Err(ClassroomError::directory("offline"))
        }
        async fn find_student(&self, _id: &str) -> Result<Option<String>> {
            Err(ClassroomError::directory("offline"))
        }
        async fn find_course(&self, _id: &str) -> Result<Option<Course>> {
            Err(ClassroomError::directory("offline"))
        }
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_anonymous() {
        let resolver = IdentityResolver::new(Arc::new(BrokenDirectory), None, true);
        let creds = Credentials {
            admin_id: Some(ADMIN.into()),
            ..Credentials::default()
        };
        let principal = resolver.resolve(&creds, &conn()).await;
        assert_eq!(principal.role, Role::Anonymous);
        assert_eq!(principal.id, ADMIN);
    }

    #[test]
    fn test_principal_serialization() {
        let principal = Principal {
            id: ADMIN.into(),
            role: Role::Instructor(InstructorRole::Assistant),
            display_name: "mona".into(),
        };
        let json = serde_json::to_value(&principal).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["name"], "mona");
    }

    #[test]
    fn test_is_stable_id() {
        assert!(is_stable_id("65a1b2c3d4e5f60718293a4b"));
        assert!(!is_stable_id("65a1b2c3d4e5f60718293a4"));
        assert!(!is_stable_id("zza1b2c3d4e5f60718293a4b"));
    }
}
