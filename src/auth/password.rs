//! Password hashing and verification using Argon2
//!
//! Uses the argon2id variant with default parameters. Hashes are stored in
//! PHC string format, which embeds salt and parameters.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::UsergateError;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, UsergateError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UsergateError::Auth(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
///
/// `Ok(false)` is a mismatch; `Err` means the stored hash is unusable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, UsergateError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| UsergateError::Auth(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash on the blocking pool
pub async fn hash_password_blocking(password: String) -> Result<String, UsergateError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| UsergateError::Internal(format!("Password hashing task failed: {e}")))?
}

/// Verify on the blocking pool
pub async fn verify_password_blocking(
    password: String,
    hash: String,
) -> Result<bool, UsergateError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| UsergateError::Internal(format!("Password verification task failed: {e}")))?
}
