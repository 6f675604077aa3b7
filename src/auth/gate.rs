//! Per-request session gate
//!
//! Decides from the presented cookie value alone whether the caller is
//! authenticated. No I/O and no shared mutable state: the signer's key is the
//! only thing shared between requests.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

use crate::auth::session::SessionPayload;
use crate::auth::signer::{SignedToken, TokenError, TokenSigner};
use crate::types::UsergateError;

/// Outcome of evaluating a presented session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Authenticated(String),
    Missing,
    Malformed,
    InvalidSignature,
    Expired,
}

impl AuthDecision {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthDecision::Authenticated(_))
    }

    /// Authenticated subject, if any
    pub fn subject(&self) -> Option<&str> {
        match self {
            AuthDecision::Authenticated(subject) => Some(subject),
            _ => None,
        }
    }

    /// Short label for logging. Never sent to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthDecision::Authenticated(_) => "authenticated",
            AuthDecision::Missing => "missing",
            AuthDecision::Malformed => "malformed",
            AuthDecision::InvalidSignature => "invalid_signature",
            AuthDecision::Expired => "expired",
        }
    }
}

impl fmt::Display for AuthDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl From<TokenError> for AuthDecision {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(_) => AuthDecision::Malformed,
            TokenError::InvalidSignature => AuthDecision::InvalidSignature,
        }
    }
}

/// Session gate in front of every privileged operation
#[derive(Debug, Clone)]
pub struct SessionGate {
    signer: TokenSigner,
}

impl SessionGate {
    pub fn new(signer: TokenSigner) -> Self {
        Self { signer }
    }

    /// Evaluate a cookie value against the current time
    pub fn authenticate(&self, cookie: Option<&str>) -> AuthDecision {
        self.authenticate_at(cookie, Utc::now())
    }

    /// Evaluate a cookie value as of `now`
    pub fn authenticate_at(&self, cookie: Option<&str>, now: DateTime<Utc>) -> AuthDecision {
        let value = match cookie {
            Some(v) if !v.is_empty() => v,
            _ => return AuthDecision::Missing,
        };

        let token = match SignedToken::from_wire(value) {
            Ok(t) => t,
            Err(e) => return e.into(),
        };

        let payload = match self.signer.verify(&token) {
            Ok(bytes) => bytes,
            Err(e) => return e.into(),
        };

        // Signed by us but not a session payload
        let Some(session) = SessionPayload::from_bytes(payload) else {
            return AuthDecision::Malformed;
        };

        if session.is_expired_at(now) {
            return AuthDecision::Expired;
        }

        AuthDecision::Authenticated(session.subject)
    }

    /// Precondition for privileged handlers.
    ///
    /// Returns the authenticated subject, or the generic `Unauthorized` error.
    /// The specific reason is only logged.
    pub fn require(&self, cookie: Option<&str>) -> Result<String, UsergateError> {
        match self.authenticate(cookie) {
            AuthDecision::Authenticated(subject) => Ok(subject),
            decision => {
                debug!("Session rejected: {}", decision);
                Err(UsergateError::Unauthorized)
            }
        }
    }
}
