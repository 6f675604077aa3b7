//! Shared types for usergate

mod error;

pub use error::{Result, UsergateError};
