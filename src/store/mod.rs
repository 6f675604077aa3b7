//! User persistence
//!
//! `UserStore` hides where user records live so the HTTP layer and the login
//! flow work the same against MongoDB (production) and memory (dev mode,
//! tests).

mod memory;
mod mongo;

use async_trait::async_trait;
use bson::oid::ObjectId;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::auth::login::{CredentialCheck, CredentialStore};
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::db::schemas::UserDoc;
use crate::types::{Result, UsergateError};

pub use memory::MemoryUserStore;
pub use mongo::MongoUserStore;

/// Partial update of a user record. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.password_hash.is_none()
    }

    fn apply(self, user: &mut UserDoc) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(password_hash) = self.password_hash {
            user.password_hash = password_hash;
        }
    }
}

/// CRUD over user records. Soft-deleted users are invisible to every method.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; fails with `Conflict` if the email is taken
    async fn create(&self, user: UserDoc) -> Result<UserDoc>;

    async fn list(&self) -> Result<Vec<UserDoc>>;

    async fn get(&self, id: &str) -> Result<Option<UserDoc>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>>;

    /// Apply changes; `Ok(None)` if no such user
    async fn update(&self, id: &str, changes: UserChanges) -> Result<Option<UserDoc>>;

    /// Soft delete; `Ok(false)` if no such user
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Parse a hex user id
pub fn parse_id(id: &str) -> Result<ObjectId> {
    Ok(ObjectId::parse_str(id)?)
}

/// Canonical form used for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Credential store backed by user records and Argon2 hashes
pub struct UserCredentials {
    users: Arc<dyn UserStore>,
}

impl UserCredentials {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

/// Hash checked when the identifier is unknown, so both rejection paths cost
/// one Argon2 verification. Hashed once, on the blocking pool.
async fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceCell<Option<String>> = OnceCell::const_new();
    DUMMY
        .get_or_init(|| async {
            hash_password_blocking("usergate-dummy-password".to_string())
                .await
                .ok()
        })
        .await
        .as_deref()
}

#[async_trait]
impl CredentialStore for UserCredentials {
    async fn verify(&self, identifier: &str, secret: &str) -> Result<CredentialCheck> {
        let user = self.users.find_by_email(&normalize_email(identifier)).await?;

        let Some(user) = user else {
            if let Some(hash) = dummy_hash().await {
                let _ = verify_password_blocking(secret.to_string(), hash.to_string()).await;
            }
            return Ok(CredentialCheck::UnknownIdentifier);
        };

        let matches = verify_password_blocking(secret.to_string(), user.password_hash.clone())
            .await
            .map_err(|e| {
                UsergateError::Internal(format!("Stored hash unusable for {}: {}", user.id_hex(), e))
            })?;

        if matches {
            Ok(CredentialCheck::Verified {
                subject: user.id_hex(),
            })
        } else {
            Ok(CredentialCheck::SecretMismatch)
        }
    }
}
