//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one task per connection.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{session_cookie, CookieIssuer, LoginOrchestrator, SecretKey, SessionGate, TokenSigner};
use crate::config::Args;
use crate::routes;
use crate::store::{UserCredentials, UserStore};
use crate::types::UsergateError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub users: Arc<dyn UserStore>,
    pub login: LoginOrchestrator,
    pub gate: SessionGate,
    pub cookies: CookieIssuer,
    /// Which store backs `users` ("mongodb" or "memory"), for /health
    pub store_kind: &'static str,
}

impl AppState {
    /// Wire the auth components around one signing key
    pub fn new(
        args: Args,
        users: Arc<dyn UserStore>,
        key: SecretKey,
        store_kind: &'static str,
    ) -> Self {
        let signer = TokenSigner::new(key);
        let credentials = Arc::new(UserCredentials::new(Arc::clone(&users)));

        Self {
            login: LoginOrchestrator::new(credentials, signer.clone(), args.request_timeout()),
            gate: SessionGate::new(signer),
            cookies: CookieIssuer::new(args.cookie_secure),
            users,
            store_kind,
            args,
        }
    }
}

/// Bind the configured address and serve forever
pub async fn run(state: Arc<AppState>) -> Result<(), UsergateError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("usergate listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - users are kept in memory");
    }

    serve(listener, state).await;
    Ok(())
}

/// Accept loop over an already-bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match route(&state, req).await {
        Ok(response) => response,
        Err(err) => routes::error_response(&err),
    };

    info!("[{}] {} {} -> {}", addr, method, path, response.status().as_u16());
    Ok(response)
}

/// Dispatch on (method, path). Protected routes pass the session gate first.
async fn route(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, UsergateError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let trimmed = match path.strip_suffix('/') {
        Some(p) if !p.is_empty() => p,
        _ => path.as_str(),
    };

    match (method, trimmed) {
        (Method::GET, "/health") => Ok(routes::health_check(state.store_kind)),
        (Method::GET, "/version") => Ok(routes::version_info()),
        (_, "/health") | (_, "/version") => Ok(routes::method_not_allowed_response()),

        (Method::POST, "/users") => routes::handle_create_user(state, req).await,
        (Method::GET, "/users") => {
            let subject = authenticate(state, &req)?;
            routes::handle_list_users(state, &subject).await
        }
        (_, "/users") => Ok(routes::method_not_allowed_response()),

        (Method::POST, "/users/login") => routes::handle_login(state, req).await,
        (_, "/users/login") => Ok(routes::method_not_allowed_response()),

        (Method::POST, "/users/logout") => routes::handle_logout(state),
        (_, "/users/logout") => Ok(routes::method_not_allowed_response()),

        (method, p) => match user_id(p) {
            Some(id) => {
                let id = id.to_string();
                match method {
                    Method::GET => {
                        let subject = authenticate(state, &req)?;
                        routes::handle_get_user(state, &subject, &id).await
                    }
                    Method::PUT => {
                        let subject = authenticate(state, &req)?;
                        routes::handle_update_user(state, &subject, &id, req).await
                    }
                    Method::DELETE => {
                        let subject = authenticate(state, &req)?;
                        routes::handle_delete_user(state, &subject, &id).await
                    }
                    _ => Ok(routes::method_not_allowed_response()),
                }
            }
            None => Ok(routes::not_found_response(&path)),
        },
    }
}

fn authenticate(state: &AppState, req: &Request<Incoming>) -> Result<String, UsergateError> {
    let cookie = session_cookie(req.headers());
    state.gate.require(cookie.as_deref())
}

/// `{id}` from `/users/{id}`
fn user_id(path: &str) -> Option<&str> {
    path.strip_prefix("/users/")
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
}
