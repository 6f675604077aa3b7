//! Error types for usergate

use hyper::StatusCode;

/// Main error type for usergate operations
#[derive(Debug, thiserror::Error)]
pub enum UsergateError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Carries no detail; callers never learn why they were rejected.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl UsergateError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DB_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Http(_) => "BAD_REQUEST",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
        }
    }

    /// Message safe to show to clients.
    ///
    /// Server-side failures are collapsed to a generic message; the detail
    /// stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) => "Database unavailable".to_string(),
            Self::Internal(_) | Self::Config(_) | Self::Auth(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether this error indicates the service, not the caller, is at fault
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for UsergateError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<bson::oid::Error> for UsergateError {
    fn from(err: bson::oid::Error) -> Self {
        Self::BadRequest(format!("Invalid user ID: {}", err))
    }
}

/// Result type alias for usergate operations
pub type Result<T> = std::result::Result<T, UsergateError>;
