//! HTTP routes for usergate

pub mod health;
pub mod users;

pub use health::{health_check, version_info};
pub use users::{
    handle_create_user, handle_delete_user, handle_get_user, handle_list_users, handle_login,
    handle_logout, handle_update_user,
};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::error;

use crate::types::UsergateError;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// Serialize `body` as a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// `{"error", "code"}` response for an error.
///
/// Server-side failures are logged here and reach the client only as a
/// generic message.
pub fn error_response(err: &UsergateError) -> Response<Full<Bytes>> {
    if err.is_server_error() {
        error!("Request failed: {}", err);
    }

    json_response(
        err.status_code(),
        &serde_json::json!({
            "error": err.public_message(),
            "code": err.code(),
        }),
    )
}

pub fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(&UsergateError::NotFound(format!("No route for {}", path)))
}

pub fn method_not_allowed_response() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({
            "error": "Method not allowed",
            "code": "METHOD_NOT_ALLOWED",
        }),
    )
}

/// Read and deserialize a JSON body of at most `MAX_BODY_BYTES`
pub async fn parse_json_body<T, B>(req: Request<B>) -> Result<T, UsergateError>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<http_body_util::LengthLimitError>() {
                UsergateError::BadRequest("Request body too large".into())
            } else {
                UsergateError::Http(format!("Failed to read body: {}", e))
            }
        })?;

    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| UsergateError::BadRequest(format!("Invalid JSON: {}", e)))
}
