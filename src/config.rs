//! Configuration for usergate
//!
//! CLI arguments with environment variable fallbacks, using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::signer::{SecretKey, MIN_SECRET_LENGTH};
use crate::types::UsergateError;

/// usergate - user service with signed session cookies
#[derive(Parser, Debug, Clone)]
#[command(name = "usergate")]
#[command(about = "User service with HMAC-signed session cookies")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory users, generated session key)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "usergate")]
    pub mongodb_db: String,

    /// Session signing secret, at least 32 bytes (required in production)
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Mark session cookies Secure (HTTPS only)
    #[arg(long, env = "COOKIE_SECURE", default_value = "false")]
    pub cookie_secure: bool,

    /// Upper bound on a login's credential check, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "5000")]
    pub request_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build the signing key.
    ///
    /// In dev mode without a configured secret a random key is generated, so
    /// sessions do not survive a restart.
    pub fn secret_key(&self) -> Result<SecretKey, UsergateError> {
        match &self.session_secret {
            Some(secret) => SecretKey::new(secret.as_bytes().to_vec()),
            None if self.dev_mode => Ok(SecretKey::generate()),
            None => Err(UsergateError::Config(
                "SESSION_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match &self.session_secret {
            None if !self.dev_mode => {
                return Err("SESSION_SECRET is required in production mode".to_string());
            }
            Some(secret) if secret.len() < MIN_SECRET_LENGTH => {
                return Err(format!(
                    "SESSION_SECRET must be at least {} bytes",
                    MIN_SECRET_LENGTH
                ));
            }
            _ => {}
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        Ok(())
    }
}
