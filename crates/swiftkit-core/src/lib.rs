//! Core library for swiftkit.
//!
//! Provides a client for OpenStack Swift object storage authenticated through
//! a Keystone v2.0 token exchange:
//!
//! - `auth`: credentials and the `SessionManager` that caches, verifies and
//!   refreshes the token and service endpoint
//! - `api`: the `SwiftClient` operation layer (objects, containers, metadata)
//! - `models`: listing and metadata result types
//! - `tempurl`: HMAC-SHA1 temporary URL signing
//! - `config`: client configuration, loadable from JSON or the environment

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod tempurl;

pub use api::{ApiError, SwiftClient};
pub use auth::{AuthError, Credentials, SessionData, SessionManager, ValidSession};
pub use config::{ConfigError, EndpointInterface, SwiftConfig, ValidationPolicy};
