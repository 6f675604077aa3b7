//! Session payload and artifact
//!
//! The payload is what gets signed. It carries its own expiry so a presented
//! token can be judged without any server-side lookup.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::signer::SignedToken;

/// Fixed session lifetime. No sliding expiry.
pub const SESSION_LIFETIME_HOURS: i64 = 24;

pub fn session_lifetime() -> Duration {
    Duration::hours(SESSION_LIFETIME_HOURS)
}

/// Identity carried inside a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// User record id
    #[serde(rename = "sub")]
    pub subject: String,
    /// Issued at (Unix timestamp)
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiration time (Unix timestamp)
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl SessionPayload {
    /// Payload for a session starting at `issued_at`.
    ///
    /// Timestamps are truncated to whole seconds so the lifetime is exact
    /// after a round trip through the token.
    pub fn new(subject: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        let issued_at = issued_at.timestamp();
        Self {
            subject: subject.into(),
            issued_at,
            expires_at: issued_at + session_lifetime().num_seconds(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Plain struct of strings and integers; serialization cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.issued_at)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.expires_at)
    }

    /// Expired strictly after `exp`, at full clock precision
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Issuance-time bundle produced by a successful login
#[derive(Debug, Clone)]
pub struct SessionArtifact {
    pub subject: String,
    pub token: SignedToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
