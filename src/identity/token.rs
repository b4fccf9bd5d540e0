use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Claims carried by connection tokens.
///
/// Tokens are issued by the surrounding platform under several historical
/// shapes, so the subject may appear under any of the id fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "assistantId", default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(rename = "adminId", default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
}

impl Claims {
    /// First non-empty subject id, in issuer precedence order
    pub fn subject(&self) -> Option<&str> {
        [
            &self.user_id,
            &self.assistant_id,
            &self.admin_id,
            &self.object_id,
            &self.id,
            &self.sub,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .find(|id| !id.is_empty())
    }
}

/// Verifies HS256 connection tokens against the shared secret
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
pub(crate) fn sign_for_tests(secret: &str, claims: &Claims) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassroomError;

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_subject_precedence() {
        let claims = Claims {
            id: Some("plain".into()),
            assistant_id: Some("assistant".into()),
            exp: 0,
            ..Claims::default()
        };
        assert_eq!(claims.subject(), Some("assistant"));

        let claims = Claims {
            user_id: Some(String::new()),
            sub: Some("subject".into()),
            exp: 0,
            ..Claims::default()
        };
        assert_eq!(claims.subject(), Some("subject"));
    }

    #[test]
    fn test_verify_round_trip() {
        let claims = Claims {
            id: Some("65a1b2c3d4e5f60718293a4b".into()),
            role: Some("admin".into()),
            exp: future_exp(),
            ..Claims::default()
        };
        let token = sign_for_tests("secret", &claims);

        let verified = TokenVerifier::new("secret").verify(&token).unwrap();
        assert_eq!(verified.subject(), Some("65a1b2c3d4e5f60718293a4b"));
        assert_eq!(verified.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let claims = Claims {
            id: Some("x".into()),
            exp: future_exp(),
            ..Claims::default()
        };
        let token = sign_for_tests("secret", &claims);

        let result = TokenVerifier::new("other").verify(&token);
        assert!(matches!(result, Err(ClassroomError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_rejects_expired() {
        let claims = Claims {
            id: Some("x".into()),
            exp: chrono::Utc::now().timestamp() - 3600,
            ..Claims::default()
        };
        let token = sign_for_tests("secret", &claims);

        assert!(TokenVerifier::new("secret").verify(&token).is_err());
    }
}
