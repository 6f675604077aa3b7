//! HTTP server for usergate

pub mod http;

pub use http::{run, serve, AppState};
