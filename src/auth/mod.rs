//! Session authentication for usergate
//!
//! Provides:
//! - HMAC-SHA256 token signing with fixed-time verification
//! - Login: credentials in, signed 24h session artifact out
//! - The per-request session gate
//! - Session cookie issuing and parsing
//! - Password hashing with Argon2

pub mod cookie;
pub mod gate;
pub mod login;
pub mod password;
pub mod session;
pub mod signer;

pub use cookie::{session_cookie, CookieIssuer, SessionCookie, SESSION_COOKIE};
pub use gate::{AuthDecision, SessionGate};
pub use login::{CredentialCheck, CredentialStore, Credentials, LoginError, LoginOrchestrator};
pub use password::{hash_password, verify_password};
pub use session::{SessionArtifact, SessionPayload, SESSION_LIFETIME_HOURS};
pub use signer::{SecretKey, SignedToken, TokenError, TokenSigner};
