//! User routes
//!
//! - `POST /users` - register
//! - `POST /users/login` - verify credentials, set the session cookie
//! - `POST /users/logout` - clear the session cookie
//! - `GET /users`, `GET|PUT|DELETE /users/{id}` - require a valid session
//!
//! The router runs the session gate before the protected handlers and passes
//! the authenticated subject in.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::SET_COOKIE;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{empty_response, json_response, parse_json_body};
use crate::auth::password::hash_password_blocking;
use crate::auth::Credentials;
use crate::db::schemas::UserDoc;
use crate::server::AppState;
use crate::store::{normalize_email, UserChanges};
use crate::types::{Result, UsergateError};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub subject: String,
    /// RFC 3339
    pub expires_at: String,
}

/// User as returned to clients; never includes the password hash
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<&UserDoc> for UserView {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id_hex(),
            name: user.name.clone(),
            email: user.email.clone(),
            created_at: user
                .metadata
                .created_at
                .map(|t| t.to_chrono().to_rfc3339()),
            updated_at: user
                .metadata
                .updated_at
                .map(|t| t.to_chrono().to_rfc3339()),
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(UsergateError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    require_non_empty("email", email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(UsergateError::BadRequest("email is not valid".into())),
    }
}

// =============================================================================
// Public routes
// =============================================================================

/// POST /users
pub async fn handle_create_user<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let body: NewUser = parse_json_body(req).await?;
    require_non_empty("name", &body.name)?;
    validate_email(&body.email)?;
    require_non_empty("password", &body.password)?;

    let password_hash = hash_password_blocking(body.password).await?;
    let user = state
        .users
        .create(UserDoc::new(
            body.name.trim().to_string(),
            normalize_email(&body.email),
            password_hash,
        ))
        .await?;

    info!("User registered: {}", user.id_hex());
    Ok(json_response(StatusCode::CREATED, &UserView::from(&user)))
}

/// POST /users/login
pub async fn handle_login<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let body: LoginRequest = parse_json_body(req).await?;

    let artifact = state
        .login
        .login(Credentials::new(body.email, body.password))
        .await?;

    let cookie = state.cookies.to_cookie(&artifact).to_header_value()?;
    info!("User logged in: {}", artifact.subject);

    let mut response = json_response(
        StatusCode::OK,
        &LoginResponse {
            subject: artifact.subject,
            expires_at: artifact.expires_at.to_rfc3339(),
        },
    );
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

/// POST /users/logout
///
/// Sessions are stateless, so logout only asks the client to drop its cookie.
pub fn handle_logout(state: &AppState) -> Result<Response<Full<Bytes>>> {
    let cookie = state.cookies.expired().to_header_value()?;
    let mut response = json_response(StatusCode::OK, &serde_json::json!({ "status": "logged out" }));
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

// =============================================================================
// Protected routes
// =============================================================================

/// GET /users
pub async fn handle_list_users(state: &AppState, _subject: &str) -> Result<Response<Full<Bytes>>> {
    let users = state.users.list().await?;
    let views: Vec<UserView> = users.iter().map(UserView::from).collect();
    Ok(json_response(StatusCode::OK, &views))
}

/// GET /users/{id}
pub async fn handle_get_user(
    state: &AppState,
    _subject: &str,
    id: &str,
) -> Result<Response<Full<Bytes>>> {
    match state.users.get(id).await? {
        Some(user) => Ok(json_response(StatusCode::OK, &UserView::from(&user))),
        None => Err(UsergateError::NotFound(format!("User {}", id))),
    }
}

/// PUT /users/{id}
pub async fn handle_update_user<B>(
    state: &AppState,
    subject: &str,
    id: &str,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let body: UserUpdate = parse_json_body(req).await?;

    if let Some(name) = &body.name {
        require_non_empty("name", name)?;
    }
    if let Some(email) = &body.email {
        validate_email(email)?;
    }
    let password_hash = match body.password {
        Some(password) => {
            require_non_empty("password", &password)?;
            Some(hash_password_blocking(password).await?)
        }
        None => None,
    };

    let changes = UserChanges {
        name: body.name.map(|n| n.trim().to_string()),
        email: body.email.as_deref().map(normalize_email),
        password_hash,
    };
    if changes.is_empty() {
        return Err(UsergateError::BadRequest("No fields to update".into()));
    }

    match state.users.update(id, changes).await? {
        Some(user) => {
            info!("User {} updated by {}", id, subject);
            Ok(json_response(StatusCode::OK, &UserView::from(&user)))
        }
        None => Err(UsergateError::NotFound(format!("User {}", id))),
    }
}

/// DELETE /users/{id}
///
/// Soft delete: the record is retained but hidden and its email released.
pub async fn handle_delete_user(
    state: &AppState,
    subject: &str,
    id: &str,
) -> Result<Response<Full<Bytes>>> {
    if state.users.delete(id).await? {
        info!("User {} deleted by {}", id, subject);
        Ok(empty_response(StatusCode::NO_CONTENT))
    } else {
        Err(UsergateError::NotFound(format!("User {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::signer::SecretKey;
    use crate::config::Args;
    use crate::store::MemoryUserStore;
    use clap::Parser;
    use http_body_util::BodyExt;
    use std::sync::Arc;

    fn state() -> AppState {
        let args = Args::try_parse_from(["usergate", "--dev-mode"]).unwrap();
        let key = SecretKey::new("route-test-secret-at-least-32-bytes!!").unwrap();
        AppState::new(args, Arc::new(MemoryUserStore::new()), key, "memory")
    }

    fn json_request(body: serde_json::Value) -> Request<Full<Bytes>> {
        Request::new(Full::new(Bytes::from(body.to_string())))
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(state: &AppState, email: &str) -> UserView {
        let response = handle_create_user(
            state,
            json_request(serde_json::json!({
                "name": "Ada",
                "email": email,
                "password": "correct-horse",
            })),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        serde_json::from_value(body_json(response).await).unwrap()
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("  ").is_err());
    }

    #[tokio::test]
    async fn test_create_user_hides_hash() {
        let state = state();
        let response = handle_create_user(
            &state,
            json_request(serde_json::json!({
                "name": " Ada ",
                "email": "Ada@Example.com",
                "password": "correct-horse",
            })),
        )
        .await
        .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["name"], "Ada");
        assert_eq!(body["email"], "ada@example.com");
        assert!(body.get("password_hash").is_none());
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_create_user_rejects_missing_fields() {
        let state = state();
        let err = handle_create_user(
            &state,
            json_request(serde_json::json!({ "name": "Ada", "email": "ada@example.com" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UsergateError::BadRequest(_)));

        let err = handle_create_user(
            &state,
            json_request(serde_json::json!({
                "name": "",
                "email": "ada@example.com",
                "password": "pw",
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UsergateError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let state = state();
        register(&state, "ada@example.com").await;

        let err = handle_create_user(
            &state,
            json_request(serde_json::json!({
                "name": "Ada again",
                "email": "ADA@example.com",
                "password": "pw",
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UsergateError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_sets_cookie_that_passes_gate() {
        let state = state();
        let ada = register(&state, "ada@example.com").await;

        let response = handle_login(
            &state,
            json_request(serde_json::json!({
                "email": "ada@example.com",
                "password": "correct-horse",
            })),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("session=Bearer "));
        assert!(set_cookie.contains("HttpOnly"));

        let value = crate::auth::cookie::parse_cookie(&set_cookie, "session").unwrap();
        assert_eq!(state.gate.require(Some(value.as_str())).unwrap(), ada.id);

        let body = body_json(response).await;
        assert_eq!(body["subject"], ada.id);
    }

    #[tokio::test]
    async fn test_login_rejections_are_indistinguishable() {
        let state = state();
        register(&state, "ada@example.com").await;

        let wrong_password = handle_login(
            &state,
            json_request(serde_json::json!({ "email": "ada@example.com", "password": "nope" })),
        )
        .await
        .unwrap_err();
        let unknown_user = handle_login(
            &state,
            json_request(serde_json::json!({ "email": "who@example.com", "password": "nope" })),
        )
        .await
        .unwrap_err();

        assert!(matches!(wrong_password, UsergateError::Unauthorized));
        assert!(matches!(unknown_user, UsergateError::Unauthorized));
        assert_eq!(
            body_json(super::super::error_response(&wrong_password)).await,
            body_json(super::super::error_response(&unknown_user)).await
        );
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let state = state();
        let response = handle_logout(&state).unwrap();
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("session=;"));
        assert!(set_cookie.contains("1970"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let state = state();
        let ada = register(&state, "ada@example.com").await;

        let response = handle_update_user(
            &state,
            &ada.id,
            &ada.id,
            json_request(serde_json::json!({ "name": "Ada Lovelace" })),
        )
        .await
        .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["name"], "Ada Lovelace");
        assert_eq!(body["email"], "ada@example.com");

        let err = handle_update_user(&state, &ada.id, &ada.id, json_request(serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, UsergateError::BadRequest(_)));

        let response = handle_delete_user(&state, &ada.id, &ada.id).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let err = handle_get_user(&state, &ada.id, &ada.id).await.unwrap_err();
        assert!(matches!(err, UsergateError::NotFound(_)));
        let err = handle_delete_user(&state, &ada.id, &ada.id).await.unwrap_err();
        assert!(matches!(err, UsergateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_password_update_changes_login() {
        let state = state();
        let ada = register(&state, "ada@example.com").await;

        handle_update_user(
            &state,
            &ada.id,
            &ada.id,
            json_request(serde_json::json!({ "password": "new-secret" })),
        )
        .await
        .unwrap();

        let old = handle_login(
            &state,
            json_request(serde_json::json!({ "email": "ada@example.com", "password": "correct-horse" })),
        )
        .await;
        assert!(matches!(old, Err(UsergateError::Unauthorized)));

        let new = handle_login(
            &state,
            json_request(serde_json::json!({ "email": "ada@example.com", "password": "new-secret" })),
        )
        .await;
        assert!(new.is_ok());
    }

    #[tokio::test]
    async fn test_get_with_bad_id() {
        let state = state();
        let err = handle_get_user(&state, "someone", "not-hex").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
