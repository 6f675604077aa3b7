//! Liveness and build information

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    store: &'static str,
}

/// Handle `/health`; reports which user store backs this instance
pub fn health_check(store: &'static str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok",
            store,
        },
    )
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle `/version` for deployment verification
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "usergate",
    };

    json_response(StatusCode::OK, &response)
}
