//! Session cookie packaging
//!
//! Outbound: artifact → `Set-Cookie`. Inbound: `Cookie` header → raw value for
//! the session gate. Both sides use the token wire form from
//! [`crate::auth::signer`].

use chrono::{DateTime, Utc};
use hyper::header::{HeaderMap, HeaderValue, COOKIE};

use crate::auth::session::SessionArtifact;
use crate::types::UsergateError;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Wire-level cookie descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub secure: bool,
}

impl SessionCookie {
    /// Render as a `Set-Cookie` header value
    pub fn to_header_value(&self) -> Result<HeaderValue, UsergateError> {
        let mut cookie = format!(
            "{}={}; Expires={}; Path=/; HttpOnly; SameSite=Strict",
            self.name,
            self.value,
            http_date(self.expires_at)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }

        HeaderValue::from_str(&cookie)
            .map_err(|e| UsergateError::Internal(format!("Invalid cookie header: {}", e)))
    }
}

/// Turns session artifacts into cookies
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieIssuer {
    secure: bool,
}

impl CookieIssuer {
    /// `secure` adds the `Secure` attribute (HTTPS-only cookies)
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    pub fn to_cookie(&self, artifact: &SessionArtifact) -> SessionCookie {
        SessionCookie {
            name: SESSION_COOKIE,
            value: artifact.token.to_wire(),
            expires_at: artifact.expires_at,
            secure: self.secure,
        }
    }

    /// Cookie that makes the client drop its session
    pub fn expired(&self) -> SessionCookie {
        SessionCookie {
            name: SESSION_COOKIE,
            value: String::new(),
            expires_at: DateTime::<Utc>::default(),
            secure: self.secure,
        }
    }
}

/// IMF-fixdate, e.g. `Thu, 01 Jan 1970 00:00:00 GMT`
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Extract the session cookie value from request headers
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|header| parse_cookie(header, SESSION_COOKIE))
}

/// Find a cookie by name in a `Cookie` header value.
///
/// Surrounding double quotes are stripped; inner spaces are preserved because
/// the session value itself contains one.
pub fn parse_cookie(header: &str, name: &str) -> Option<String> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::gate::{AuthDecision, SessionGate};
    use crate::auth::session::SessionPayload;
    use crate::auth::signer::{SecretKey, TokenSigner};
    use chrono::TimeZone;

    fn artifact(signer: &TokenSigner, issued_at: DateTime<Utc>) -> SessionArtifact {
        let payload = SessionPayload::new("65f1c0ffee65f1c0ffee65f1", issued_at);
        SessionArtifact {
            subject: payload.subject.clone(),
            token: signer.sign(&payload.to_bytes()),
            issued_at: payload.issued_at(),
            expires_at: payload.expires_at(),
        }
    }

    #[test]
    fn test_to_cookie() {
        let signer = TokenSigner::new(SecretKey::generate());
        let artifact = artifact(&signer, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let cookie = CookieIssuer::new(false).to_cookie(&artifact);

        assert_eq!(cookie.name, "session");
        assert!(cookie.value.starts_with("Bearer "));
        assert_eq!(cookie.value, artifact.token.to_wire());
        assert_eq!(cookie.expires_at, artifact.expires_at);
    }

    #[test]
    fn test_header_value_attributes() {
        let signer = TokenSigner::new(SecretKey::generate());
        let artifact = artifact(&signer, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        let header = CookieIssuer::new(true)
            .to_cookie(&artifact)
            .to_header_value()
            .unwrap();
        let header = header.to_str().unwrap();

        assert!(header.starts_with("session=Bearer "));
        assert!(header.contains("; Expires=Wed, 15 Nov 2023 22:13:20 GMT"));
        assert!(header.contains("; HttpOnly"));
        assert!(header.contains("; SameSite=Strict"));
        assert!(header.ends_with("; Secure"));

        let insecure = CookieIssuer::new(false)
            .to_cookie(&artifact)
            .to_header_value()
            .unwrap();
        assert!(!insecure.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn test_expired_cookie() {
        let header = CookieIssuer::default().expired().to_header_value().unwrap();
        assert_eq!(
            header.to_str().unwrap(),
            "session=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly; SameSite=Strict"
        );
    }

    #[test]
    fn test_parse_cookie() {
        assert_eq!(
            parse_cookie("theme=dark; session=Bearer abc|def; lang=en", "session"),
            Some("Bearer abc|def".into())
        );
        assert_eq!(
            parse_cookie("session=\"Bearer abc|def\"", "session"),
            Some("Bearer abc|def".into())
        );
        assert_eq!(parse_cookie("theme=dark", "session"), None);
        assert_eq!(parse_cookie("sessionid=x", "session"), None);
        assert_eq!(parse_cookie("", "session"), None);
    }

    #[test]
    fn test_cookie_roundtrips_through_gate() {
        let signer = TokenSigner::new(SecretKey::generate());
        let artifact = artifact(&signer, Utc::now());
        let set_cookie = CookieIssuer::default()
            .to_cookie(&artifact)
            .to_header_value()
            .unwrap();

        // What a client sends back: name=value without attributes
        let sent = set_cookie.to_str().unwrap().split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("a=b; {}", sent)).unwrap());

        let value = session_cookie(&headers);
        let gate = SessionGate::new(signer);
        assert_eq!(
            gate.authenticate(value.as_deref()),
            AuthDecision::Authenticated("65f1c0ffee65f1c0ffee65f1".into())
        );
    }

    #[test]
    fn test_session_cookie_absent() {
        let headers = HeaderMap::new();
        assert_eq!(session_cookie(&headers), None);
    }
}
