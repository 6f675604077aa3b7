//! Credential-to-session issuance
//!
//! Flow:
//! 1. Ask the credential store whether identifier and secret match
//! 2. Collapse "unknown identifier" and "wrong secret" into one `Unauthorized`
//! 3. Sign a session payload for the resolved subject
//!
//! Nothing is persisted; the returned artifact is the whole session.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::session::{SessionArtifact, SessionPayload};
use crate::auth::signer::TokenSigner;
use crate::types::UsergateError;

/// Submitted login credentials. Lives only for one login call.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What a credential store found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    Verified { subject: String },
    UnknownIdentifier,
    SecretMismatch,
}

/// Source of truth for credentials
///
/// Returns `Err` only when the store itself failed; a rejection is an `Ok`.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn verify(&self, identifier: &str, secret: &str)
        -> Result<CredentialCheck, UsergateError>;
}

/// Login failure as seen by callers
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Bad credentials; does not say which part was wrong
    #[error("Unauthorized")]
    Unauthorized,

    /// The credential store failed or timed out
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LoginError> for UsergateError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Unauthorized => UsergateError::Unauthorized,
            LoginError::Internal(msg) => UsergateError::Internal(msg),
        }
    }
}

/// Verifies credentials and issues session artifacts
#[derive(Clone)]
pub struct LoginOrchestrator {
    store: Arc<dyn CredentialStore>,
    signer: TokenSigner,
    timeout: Duration,
}

impl LoginOrchestrator {
    pub fn new(store: Arc<dyn CredentialStore>, signer: TokenSigner, timeout: Duration) -> Self {
        Self {
            store,
            signer,
            timeout,
        }
    }

    /// Log in with the current time as issuance time
    pub async fn login(&self, credentials: Credentials) -> Result<SessionArtifact, LoginError> {
        self.login_at(credentials, Utc::now()).await
    }

    /// Log in with an explicit issuance time
    pub async fn login_at(
        &self,
        credentials: Credentials,
        now: DateTime<Utc>,
    ) -> Result<SessionArtifact, LoginError> {
        let Credentials { identifier, secret } = credentials;

        // Dropping the store future on timeout abandons the check
        let check = tokio::time::timeout(self.timeout, self.store.verify(&identifier, &secret))
            .await;
        drop(secret);

        let subject = match check {
            Ok(Ok(CredentialCheck::Verified { subject })) => subject,
            Ok(Ok(CredentialCheck::UnknownIdentifier)) => {
                warn!("Login failed - unknown identifier: {}", identifier);
                return Err(LoginError::Unauthorized);
            }
            Ok(Ok(CredentialCheck::SecretMismatch)) => {
                warn!("Login failed - invalid password: {}", identifier);
                return Err(LoginError::Unauthorized);
            }
            Ok(Err(e)) => {
                error!("Credential store failed during login for {}: {}", identifier, e);
                return Err(LoginError::Internal(e.to_string()));
            }
            Err(_) => {
                error!(
                    "Credential check timed out after {:?} for {}",
                    self.timeout, identifier
                );
                return Err(LoginError::Internal("credential check timed out".into()));
            }
        };

        let payload = SessionPayload::new(subject.clone(), now);
        let token = self.signer.sign(&payload.to_bytes());

        info!("Login successful: {} (subject {})", identifier, subject);

        Ok(SessionArtifact {
            subject,
            token,
            issued_at: payload.issued_at(),
            expires_at: payload.expires_at(),
        })
    }
}
