//! Authentication module for Keystone token sessions.
//!
//! This module provides:
//! - `Credentials`: the immutable identity used for the token exchange
//! - `SessionManager`: caches the token and resolved Swift endpoint, verifies
//!   it before use and re-authenticates (single-flight) when it is rejected
//!
//! The Keystone v2.0 wire types and service catalog resolution live in `token`.

pub mod credentials;
pub mod error;
pub mod session;
mod token;

pub use credentials::Credentials;
pub use error::AuthError;
pub use session::{SessionData, SessionManager, ValidSession};

/// Header carrying the token on every Swift request
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
