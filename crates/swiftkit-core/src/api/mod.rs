//! Swift object storage API module.
//!
//! `SwiftClient` issues one authenticated request per operation against the
//! service endpoint resolved by the session manager. Every operation first
//! calls `SessionManager::ensure_session` and propagates its error unchanged.

pub mod client;
pub mod error;

pub use client::{RemovedObjects, SwiftClient, UploadBody, UploadRequest};
pub use error::ApiError;
