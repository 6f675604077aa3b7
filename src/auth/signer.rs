//! HMAC-SHA256 token signing and verification
//!
//! Security notes:
//! - Tokens are `payload` + HMAC-SHA256(secret, payload); nothing is encrypted
//! - Signatures are compared in fixed time
//! - The wire form is `Bearer <b64(payload)>|<b64(signature)>`. Only the raw
//!   payload bytes are signed; the `Bearer ` prefix is transport decoration.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::UsergateError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Transport prefix on the wire form.
pub const WIRE_PREFIX: &str = "Bearer ";

/// Separator between payload and signature on the wire form.
pub const WIRE_SEPARATOR: char = '|';

/// Process-wide signing key.
///
/// Loaded once at startup and never rotated. Bytes are wiped on drop and
/// never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Create a key from configured bytes
    ///
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LENGTH`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, UsergateError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LENGTH {
            return Err(UsergateError::Config(format!(
                "SESSION_SECRET must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        Ok(Self(bytes))
    }

    /// Create a random key.
    ///
    /// Tokens signed with it die with the process; only for dev mode and tests.
    pub fn generate() -> Self {
        let mut key = vec![0u8; MIN_SECRET_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Failure to accept a presented token
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Could not be parsed into payload and signature
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// Parsed, but the signature does not match the payload
    #[error("invalid token signature")]
    InvalidSignature,
}

/// A payload together with its keyed digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedToken {
    /// Render the cookie-safe wire form
    pub fn to_wire(&self) -> String {
        format!(
            "{}{}{}{}",
            WIRE_PREFIX,
            URL_SAFE_NO_PAD.encode(&self.payload),
            WIRE_SEPARATOR,
            URL_SAFE_NO_PAD.encode(&self.signature)
        )
    }

    /// Parse the wire form produced by [`SignedToken::to_wire`].
    ///
    /// Only structure is checked here; the signature is checked by
    /// [`TokenSigner::verify`].
    pub fn from_wire(value: &str) -> Result<Self, TokenError> {
        let body = value
            .strip_prefix(WIRE_PREFIX)
            .ok_or(TokenError::Malformed("missing Bearer prefix"))?;

        let (payload, signature) = body
            .split_once(WIRE_SEPARATOR)
            .ok_or(TokenError::Malformed("missing separator"))?;

        if signature.contains(WIRE_SEPARATOR) {
            return Err(TokenError::Malformed("multiple separators"));
        }
        if payload.is_empty() {
            return Err(TokenError::Malformed("empty payload"));
        }
        if signature.is_empty() {
            return Err(TokenError::Malformed("empty signature"));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed("payload is not base64"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed("signature is not base64"))?;

        Ok(Self { payload, signature })
    }
}

/// Stateless signer and verifier
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: Arc<SecretKey>,
}

impl TokenSigner {
    pub fn new(key: SecretKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Sign a payload. Deterministic for a given key.
    pub fn sign(&self, payload: &[u8]) -> SignedToken {
        SignedToken {
            payload: payload.to_vec(),
            signature: self.mac(payload),
        }
    }

    /// Check the signature and hand back the payload it covers
    pub fn verify<'a>(&self, token: &'a SignedToken) -> Result<&'a [u8], TokenError> {
        let expected = self.mac(&token.payload);
        if !expected.is_empty() && constant_time_eq(&expected, &token.signature) {
            Ok(&token.payload)
        } else {
            Err(TokenError::InvalidSignature)
        }
    }

    fn mac(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = match <HmacSha256 as Mac>::new_from_slice(self.key.as_bytes()) {
            Ok(m) => m,
            Err(_) => return Vec::new(), // Unreachable: HMAC accepts keys of any length
        };
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time byte comparison to prevent timing attacks.
///
/// Every byte pair is visited regardless of where the first difference is.
/// Lengths are not secret (a signature is always 32 bytes) so a length
/// mismatch returns early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    std::hint::black_box(result) == 0
}
