//! ICE server provisioning for classroom clients
//!
//! The server never relays media itself. Clients fetch the STUN/TURN servers
//! to use from `GET /classroom/config`; TURN entries carry time-limited REST
//! credentials compatible with coturn's `static-auth-secret` mode:
//!
//! - username: `<prefix><unix expiry>`
//! - credential: base64(HMAC-SHA1(secret, username))

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;
use std::env;

use crate::config::parse_var;
use crate::error::{ClassroomError, Result};

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Default lifetime of generated TURN credentials in seconds
pub const DEFAULT_TURN_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct IceConfig {
    pub stun_urls: Vec<String>,
    pub turn_urls: Vec<String>,
    /// Shared secret with the TURN server; TURN entries are omitted without it
    pub turn_secret: Option<String>,
    pub turn_realm: Option<String>,
    pub turn_ttl_secs: u64,
    pub turn_username_prefix: String,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: vec![DEFAULT_STUN_URL.to_string()],
            turn_urls: Vec::new(),
            turn_secret: None,
            turn_realm: None,
            turn_ttl_secs: DEFAULT_TURN_TTL_SECS,
            turn_username_prefix: String::new(),
        }
    }
}

impl IceConfig {
    /// Creates configuration from environment variables
    ///
    /// - `STUN_URLS`: comma separated (default: Google's public STUN server)
    /// - `TURN_URLS`: comma separated `turn:`/`turns:` urls
    /// - `TURN_SECRET`, `TURN_REALM`, `TURN_TTL_SECS`, `TURN_USERNAME_PREFIX`
    pub fn from_env() -> Result<Self> {
        let stun_urls = match env::var("STUN_URLS") {
            Ok(raw) => split_urls(&raw),
            Err(_) => vec![DEFAULT_STUN_URL.to_string()],
        };
        let turn_urls = env::var("TURN_URLS")
            .map(|raw| split_urls(&raw))
            .unwrap_or_default();

        if let Some(bad) = turn_urls
            .iter()
            .find(|url| !url.starts_with("turn:") && !url.starts_with("turns:"))
        {
            return Err(ClassroomError::InvalidConfiguration(format!(
                "TURN url must start with 'turn:' or 'turns:' ({bad})"
            )));
        }

        let turn_secret = env::var("TURN_SECRET").ok().filter(|s| !s.is_empty());
        if !turn_urls.is_empty() && turn_secret.is_none() {
            tracing::warn!("TURN_URLS set without TURN_SECRET, TURN servers will not be offered");
        }

        Ok(Self {
            stun_urls,
            turn_urls,
            turn_secret,
            turn_realm: env::var("TURN_REALM").ok().filter(|s| !s.is_empty()),
            turn_ttl_secs: parse_var("TURN_TTL_SECS", DEFAULT_TURN_TTL_SECS)?,
            turn_username_prefix: env::var("TURN_USERNAME_PREFIX").unwrap_or_default(),
        })
    }

    /// Builds the ICE server list handed to clients, minting fresh TURN
    /// credentials relative to `now` (unix seconds).
    pub fn ice_servers(&self, now: i64) -> Result<IceServersResponse> {
        let mut ice_servers = Vec::new();

        if !self.stun_urls.is_empty() {
            ice_servers.push(IceServer {
                urls: self.stun_urls.clone(),
                username: None,
                credential: None,
            });
        }

        let mut ttl = None;
        if let (false, Some(secret)) = (self.turn_urls.is_empty(), self.turn_secret.as_deref()) {
            let cred = TurnCredential::generate(
                secret,
                &self.turn_username_prefix,
                self.turn_ttl_secs,
                now,
            )?;
            ice_servers.push(IceServer {
                urls: self.turn_urls.clone(),
                username: Some(cred.username),
                credential: Some(cred.credential),
            });
            ttl = Some(self.turn_ttl_secs);
        }

        Ok(IceServersResponse {
            ice_servers,
            ttl,
            realm: self.turn_realm.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServersResponse {
    pub ice_servers: Vec<IceServer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnCredential {
    pub username: String,
    pub credential: String,
    /// Unix timestamp after which the TURN server rejects the credential
    pub expires_at: i64,
}

impl TurnCredential {
    pub fn generate(secret: &str, prefix: &str, ttl_secs: u64, now: i64) -> Result<Self> {
        let expires_at = now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
        let username = format!("{prefix}{expires_at}");

        let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
            .map_err(|e| ClassroomError::internal(format!("Failed to create HMAC: {e}")))?;
        mac.update(username.as_bytes());
        let credential =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(Self {
            username,
            credential,
            expires_at,
        })
    }
}

fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
