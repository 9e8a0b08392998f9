//! Keystone v2.0 token exchange wire types and service catalog resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthError, Credentials, SessionData};
use crate::config::EndpointInterface;

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    auth: AuthBody<'a>,
}

#[derive(Debug, Serialize)]
struct AuthBody<'a> {
    #[serde(rename = "passwordCredentials")]
    password_credentials: PasswordCredentials<'a>,
    #[serde(rename = "tenantName")]
    tenant_name: &'a str,
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    tenant_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> TokenRequest<'a> {
    pub(crate) fn new(credentials: &'a Credentials) -> Self {
        Self {
            auth: AuthBody {
                password_credentials: PasswordCredentials {
                    username: &credentials.username,
                    password: &credentials.password,
                },
                tenant_name: &credentials.tenant_name,
                tenant_id: credentials.tenant_id.as_deref(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog")]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "internalURL", default)]
    internal_url: Option<String>,
    #[serde(rename = "publicURL", default)]
    public_url: Option<String>,
    #[serde(rename = "adminURL", default)]
    admin_url: Option<String>,
}

impl CatalogEndpoint {
    fn url(&self, interface: EndpointInterface) -> Option<&str> {
        match interface {
            EndpointInterface::Internal => self.internal_url.as_deref(),
            EndpointInterface::Public => self.public_url.as_deref(),
            EndpointInterface::Admin => self.admin_url.as_deref(),
        }
    }
}

impl CatalogEntry {
    /// Endpoint in `region` if there is one, otherwise the first listed endpoint.
    /// Endpoints without region info simply never match.
    fn select_endpoint(&self, region: Option<&str>) -> Option<&CatalogEndpoint> {
        region
            .and_then(|region| {
                self.endpoints
                    .iter()
                    .find(|ep| ep.region.as_deref() == Some(region))
            })
            .or_else(|| self.endpoints.first())
    }
}

/// Parse the `expires` timestamp. Keystone emits RFC 3339, with or without
/// fractional seconds; anything else is treated as unknown expiry.
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl TokenResponse {
    /// Resolve the service endpoint and build the session this token describes.
    ///
    /// The first catalog entry named `service_name` that yields an endpoint URL
    /// for `interface` wins.
    pub(crate) fn into_session(
        self,
        service_name: &str,
        region: Option<&str>,
        interface: EndpointInterface,
    ) -> Result<SessionData, AuthError> {
        let mut named_entries = self
            .access
            .service_catalog
            .iter()
            .filter(|entry| entry.name == service_name)
            .peekable();

        if named_entries.peek().is_none() {
            return Err(AuthError::ServiceNotFound(format!(
                "no catalog entry named '{}'",
                service_name
            )));
        }

        let service_url = named_entries
            .filter_map(|entry| entry.select_endpoint(region))
            .find_map(|endpoint| endpoint.url(interface))
            .ok_or_else(|| {
                AuthError::ServiceNotFound(format!(
                    "catalog entry '{}' has no usable {} endpoint",
                    service_name,
                    interface.as_str()
                ))
            })?
            .trim_end_matches('/')
            .to_string();

        let expires_at = self.access.token.expires.as_deref().and_then(parse_expiry);
        if expires_at.is_none() {
            debug!("Token expiry missing or unparseable");
        }

        Ok(SessionData {
            token: self.access.token.id,
            expires_at,
            service_url,
            authenticated_at: Utc::now(),
        })
    }
}
