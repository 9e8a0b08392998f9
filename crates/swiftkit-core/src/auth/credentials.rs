use std::fmt;

use serde::{Deserialize, Serialize};

/// Service name looked up in the catalog when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "swift";

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

/// Identity used for the Keystone token exchange.
///
/// The password is never serialized, so a saved config carries everything
/// except the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub tenant_name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Keystone v2.0 base URL, e.g. `https://identity.example.com/v2.0`
    pub auth_url: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl Credentials {
    pub fn new(
        auth_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        tenant_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            tenant_name: tenant_name.into(),
            tenant_id: None,
            auth_url: auth_url.into(),
            service_name: default_service_name(),
            region: None,
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Token endpoint, tolerating auth URLs given with or without a trailing slash
    pub fn tokens_url(&self) -> String {
        format!("{}/tokens", self.auth_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant_name", &self.tenant_name)
            .field("tenant_id", &self.tenant_id)
            .field("auth_url", &self.auth_url)
            .field("service_name", &self.service_name)
            .field("region", &self.region)
            .finish()
    }
}
