//! Session management for Keystone tokens.
//!
//! `SessionManager` owns the cached token, its expiry and the Swift endpoint
//! resolved from the service catalog. Every operation calls
//! [`SessionManager::ensure_session`] before issuing its own request.
//!
//! Validation follows the configured [`ValidationPolicy`]:
//! - `Probe` (default): HEAD the account with the cached token. 2xx confirms
//!   it and the response headers are kept as account metadata; 401/403
//!   triggers re-authentication; anything else is an error.
//! - `TrustExpiry`: accept the token while its expiry minus a safety margin
//!   is in the future. Tokens without a known expiry are probed.
//!
//! Re-authentication is single-flight: callers that need a new token while
//! one is already being fetched await the same shared future and observe the
//! same result, success or failure.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{header, Client, StatusCode};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::token::{TokenRequest, TokenResponse};
use super::{AuthError, Credentials, AUTH_TOKEN_HEADER};
use crate::api::error::truncate_body;
use crate::config::{EndpointInterface, ValidationPolicy};
use crate::models::Metadata;

/// Token, expiry and endpoint from one successful authentication.
/// Always replaced as a unit, never updated field by field.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionData {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub service_url: String,
    pub authenticated_at: DateTime<Utc>,
}

impl SessionData {
    /// Check if the token is inside `margin` of its expiry. Unknown expiry
    /// always needs verification.
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at - margin,
            None => true,
        }
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|at| at - Utc::now())
    }
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("service_url", &self.service_url)
            .field("authenticated_at", &self.authenticated_at)
            .finish()
    }
}

/// A session the caller may use for exactly one request.
#[derive(Debug, Clone)]
pub struct ValidSession {
    pub session: Arc<SessionData>,
    /// Account metadata returned by the probe that verified this session,
    /// when a probe was made.
    pub probe: Option<Metadata>,
}

impl ValidSession {
    fn unprobed(session: Arc<SessionData>) -> Self {
        Self {
            session,
            probe: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.session.token
    }

    pub fn service_url(&self) -> &str {
        &self.session.service_url
    }
}

enum ProbeOutcome {
    Accepted(Metadata),
    Rejected(StatusCode),
}

type RefreshResult = Result<Arc<SessionData>, AuthError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

#[derive(Default)]
struct SessionState {
    current: Option<Arc<SessionData>>,
    /// Incremented on every committed authentication
    generation: u64,
}

struct SessionCore {
    http: Client,
    credentials: Credentials,
    interface: EndpointInterface,
    state: RwLock<SessionState>,
    pending: Mutex<Option<SharedRefresh>>,
}

/// Owns the cached Keystone session. Clone is cheap and clones share state.
#[derive(Clone)]
pub struct SessionManager {
    core: Arc<SessionCore>,
    policy: ValidationPolicy,
}

impl SessionManager {
    pub fn new(
        http: Client,
        credentials: Credentials,
        policy: ValidationPolicy,
        interface: EndpointInterface,
    ) -> Self {
        Self {
            core: Arc::new(SessionCore {
                http,
                credentials,
                interface,
                state: RwLock::new(SessionState::default()),
                pending: Mutex::new(None),
            }),
            policy,
        }
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn credentials(&self) -> &Credentials {
        &self.core.credentials
    }

    /// The cached session without any validation
    pub async fn current(&self) -> Option<Arc<SessionData>> {
        self.core.state.read().await.current.clone()
    }

    /// Return a session the storage service should accept, authenticating,
    /// verifying or re-authenticating as the policy requires.
    pub async fn ensure_session(&self) -> Result<ValidSession, AuthError> {
        let (current, generation) = {
            let state = self.core.state.read().await;
            (state.current.clone(), state.generation)
        };

        let Some(session) = current else {
            debug!("No cached session, authenticating");
            return self.refresh(generation).await.map(ValidSession::unprobed);
        };

        if let Some(margin) = self.policy.expiry_margin() {
            if session.expires_at.is_some() {
                if !session.needs_refresh(margin) {
                    return Ok(ValidSession::unprobed(session));
                }
                debug!("Cached token inside expiry margin, re-authenticating");
                return self.refresh(generation).await.map(ValidSession::unprobed);
            }
        }

        match self.probe(&session).await? {
            ProbeOutcome::Accepted(metadata) => Ok(ValidSession {
                session,
                probe: Some(metadata),
            }),
            ProbeOutcome::Rejected(status) => {
                warn!(status = status.as_u16(), "Cached token rejected, re-authenticating");
                self.refresh(generation).await.map(ValidSession::unprobed)
            }
        }
    }

    /// Discard trust in the cached token and authenticate again.
    /// Joins an authentication already in flight instead of starting another.
    pub async fn reauthenticate(&self) -> Result<Arc<SessionData>, AuthError> {
        let generation = self.core.state.read().await.generation;
        self.refresh(generation).await
    }

    async fn probe(&self, session: &SessionData) -> Result<ProbeOutcome, AuthError> {
        debug!(url = %session.service_url, "Probing session");
        let response = self
            .core
            .http
            .head(&session.service_url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => Ok(ProbeOutcome::Rejected(status)),
            code if code < 300 => Ok(ProbeOutcome::Accepted(Metadata::from_response(&response))),
            code => Err(AuthError::UnexpectedStatus {
                status: code,
                url: session.service_url.clone(),
            }),
        }
    }

    /// Obtain a session newer than `observed_generation`.
    ///
    /// If another caller committed one since, it is returned directly. If an
    /// authentication is in flight, this joins it. Otherwise a new one starts.
    async fn refresh(&self, observed_generation: u64) -> RefreshResult {
        let pending = {
            let mut slot = self.core.pending.lock().await;

            {
                let state = self.core.state.read().await;
                if state.generation != observed_generation {
                    if let Some(session) = &state.current {
                        debug!(generation = state.generation, "Session already refreshed");
                        return Ok(session.clone());
                    }
                }
            }

            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("Joining in-flight authentication");
                    in_flight.clone()
                }
                None => {
                    let refresh = Self::authenticate_and_commit(self.core.clone())
                        .boxed()
                        .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        pending.await
    }

    async fn authenticate_and_commit(core: Arc<SessionCore>) -> RefreshResult {
        let result = authenticate(&core.http, &core.credentials, core.interface)
            .await
            .map(Arc::new);

        // New generation and cleared slot become visible together
        let mut slot = core.pending.lock().await;
        match &result {
            Ok(session) => {
                let mut state = core.state.write().await;
                state.current = Some(session.clone());
                state.generation += 1;
                info!(
                    service_url = %session.service_url,
                    generation = state.generation,
                    "Authenticated"
                );
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed, keeping previous session");
            }
        }
        *slot = None;
        result
    }
}

/// Run the Keystone token exchange and resolve the service endpoint.
/// Does not touch any cached state.
pub async fn authenticate(
    http: &Client,
    credentials: &Credentials,
    interface: EndpointInterface,
) -> Result<SessionData, AuthError> {
    let url = credentials.tokens_url();
    debug!(url = %url, username = %credentials.username, "Requesting token");

    let response = http
        .post(&url)
        .header(header::ACCEPT, "application/json")
        .json(&TokenRequest::new(credentials))
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::AuthenticationFailed(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate_body(&body)
        )));
    }

    let body = response.text().await?;
    let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        AuthError::AuthenticationFailed(format!("malformed token response: {}", e))
    })?;

    parsed.into_session(
        &credentials.service_name,
        credentials.region.as_deref(),
        interface,
    )
}
