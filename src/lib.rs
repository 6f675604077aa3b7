//! usergate - user service with signed session cookies
//!
//! ## Components
//!
//! - **Auth**: HMAC-SHA256 token signing, login, the per-request session gate,
//!   cookie packaging
//! - **Store**: user records in MongoDB, or in memory for development
//! - **Server**: hyper HTTP/1 server exposing registration, login and user CRUD

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, UsergateError};
