//! Client configuration.
//!
//! A `SwiftConfig` carries the Keystone credentials plus the knobs the client
//! exposes: token validation policy, HTTP timeouts, which catalog interface to
//! use and the default lifetime of temporary URLs. It can be built in code,
//! read from a JSON file, or assembled from the usual `OS_*` environment
//! variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::credentials::DEFAULT_SERVICE_NAME;
use crate::auth::Credentials;

/// HTTP request timeout in seconds.
/// Covers both the identity and storage endpoints, which may hang independently.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// TCP connect timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Safety margin subtracted from the token expiry under `TrustExpiry` (2 hours)
const DEFAULT_EXPIRY_MARGIN_SECS: u64 = 2 * 60 * 60;

/// Upper bound for the expiry margin (one year)
const MAX_EXPIRY_MARGIN_SECS: u64 = 365 * 24 * 60 * 60;

/// Default lifetime of a temporary URL when no explicit expiry is given (1 hour)
const DEFAULT_TEMP_URL_DURATION_SECS: u64 = 3600;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How `ensure_session` decides whether a cached token is still good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Verify every cached token with a HEAD request against the account.
    /// Detects tokens the server revoked before their advertised expiry.
    #[default]
    Probe,
    /// Trust the token until `margin_secs` before its advertised expiry,
    /// without contacting the server.
    TrustExpiry {
        #[serde(default = "default_expiry_margin_secs")]
        margin_secs: u64,
    },
}

fn default_expiry_margin_secs() -> u64 {
    DEFAULT_EXPIRY_MARGIN_SECS
}

impl ValidationPolicy {
    pub fn trust_expiry() -> Self {
        ValidationPolicy::TrustExpiry {
            margin_secs: DEFAULT_EXPIRY_MARGIN_SECS,
        }
    }

    /// The expiry safety margin, or `None` when tokens are always probed
    pub fn expiry_margin(&self) -> Option<chrono::Duration> {
        match self {
            ValidationPolicy::Probe => None,
            ValidationPolicy::TrustExpiry { margin_secs } => {
                let secs = (*margin_secs).min(MAX_EXPIRY_MARGIN_SECS) as i64;
                Some(chrono::Duration::seconds(secs))
            }
        }
    }
}

/// Which URL of a catalog endpoint becomes the service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointInterface {
    #[default]
    Internal,
    Public,
    Admin,
}

impl EndpointInterface {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointInterface::Internal => "internal",
            EndpointInterface::Public => "public",
            EndpointInterface::Admin => "admin",
        }
    }
}

/// Whole seconds, rounding any fraction up so a short non-zero duration
/// never becomes zero
fn whole_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_temp_url_duration_secs() -> u64 {
    DEFAULT_TEMP_URL_DURATION_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwiftConfig {
    pub credentials: Credentials,
    #[serde(default)]
    pub validation: ValidationPolicy,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub endpoint_interface: EndpointInterface,
    #[serde(default = "default_temp_url_duration_secs")]
    pub temp_url_duration_secs: u64,
}

impl SwiftConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            validation: ValidationPolicy::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            endpoint_interface: EndpointInterface::default(),
            temp_url_duration_secs: DEFAULT_TEMP_URL_DURATION_SECS,
        }
    }

    pub fn with_validation(mut self, validation: ValidationPolicy) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = whole_secs(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = whole_secs(timeout);
        self
    }

    pub fn with_endpoint_interface(mut self, interface: EndpointInterface) -> Self {
        self.endpoint_interface = interface;
        self
    }

    pub fn with_temp_url_duration(mut self, duration: Duration) -> Self {
        self.temp_url_duration_secs = whole_secs(duration);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load a JSON config file. The password is not stored in the file and
    /// must be filled in afterwards.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Build a config from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from `OS_*`/`SWIFT_*` variables supplied by `lookup`.
    ///
    /// Required: `OS_AUTH_URL`, `OS_USERNAME`, `OS_PASSWORD`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let auth_url = get("OS_AUTH_URL").ok_or(ConfigError::Missing("OS_AUTH_URL"))?;
        let username = get("OS_USERNAME").ok_or(ConfigError::Missing("OS_USERNAME"))?;
        let password = get("OS_PASSWORD").ok_or(ConfigError::Missing("OS_PASSWORD"))?;
        let tenant_name = get("OS_TENANT_NAME")
            .or_else(|| get("OS_PROJECT_NAME"))
            .unwrap_or_default();

        let mut credentials = Credentials::new(auth_url, username, password, tenant_name)
            .with_service_name(
                get("OS_SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            );
        credentials.tenant_id = get("OS_TENANT_ID");
        credentials.region = get("OS_REGION_NAME");

        let mut config = SwiftConfig::new(credentials);

        if let Some(mode) = get("SWIFT_VALIDATION") {
            config.validation = match mode.to_ascii_lowercase().as_str() {
                "probe" => ValidationPolicy::Probe,
                "expiry" | "trust_expiry" => ValidationPolicy::trust_expiry(),
                other => {
                    return Err(ConfigError::Invalid {
                        field: "SWIFT_VALIDATION",
                        reason: format!("expected 'probe' or 'expiry', got '{}'", other),
                    })
                }
            };
        }

        if let Some(secs) = get("SWIFT_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.parse().map_err(|_| ConfigError::Invalid {
                field: "SWIFT_TIMEOUT_SECS",
                reason: format!("'{}' is not a number of seconds", secs),
            })?;
        }

        if let Some(interface) = get("OS_INTERFACE").or_else(|| get("OS_ENDPOINT_TYPE")) {
            config.endpoint_interface = match interface.to_ascii_lowercase().as_str() {
                "internal" | "internalurl" => EndpointInterface::Internal,
                "public" | "publicurl" => EndpointInterface::Public,
                "admin" | "adminurl" => EndpointInterface::Admin,
                other => {
                    return Err(ConfigError::Invalid {
                        field: "OS_INTERFACE",
                        reason: format!("unknown interface '{}'", other),
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that everything the token exchange needs is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let creds = &self.credentials;
        if creds.auth_url.trim().is_empty() {
            return Err(ConfigError::Missing("auth_url"));
        }
        reqwest::Url::parse(&creds.auth_url).map_err(|e| ConfigError::Invalid {
            field: "auth_url",
            reason: e.to_string(),
        })?;
        if creds.username.trim().is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        if creds.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        if creds.service_name.trim().is_empty() {
            return Err(ConfigError::Missing("service_name"));
        }
        let timeouts = [
            ("request_timeout_secs", self.request_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ];
        for (field, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}
