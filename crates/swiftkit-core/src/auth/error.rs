use std::sync::Arc;

use thiserror::Error;

/// Failures of `SessionManager::ensure_session`.
///
/// Clone so one failed authentication can be handed to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Unexpected status {status} when accessing {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Transport(Arc::new(err))
    }
}
