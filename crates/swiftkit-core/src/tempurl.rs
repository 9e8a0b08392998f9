//! Temporary URL generation for Swift objects.
//!
//! A temp URL grants unauthenticated access to one object for one HTTP method
//! until an absolute expiry. The signature is
//! `hex(HMAC-SHA1(key, "METHOD\nEXPIRES\nPATH"))` where `PATH` is the object
//! path including the service endpoint's path (`/v1/AUTH_acct/container/obj`).
//! The key must match `X-Account-Meta-Temp-URL-Key` on the account.
//!
//! # Example
//!
//! ```
//! use swiftkit_core::tempurl::TempUrlOptions;
//!
//! let url = TempUrlOptions::new("GET", "photos", "cat.jpg", "secret")
//!     .expires(1_700_000_000)
//!     .filename("kitten.jpg")
//!     .build_url("https://swift.example.com/v1/AUTH_demo", 3600)
//!     .unwrap();
//! assert!(url.contains("temp_url_expires=1700000000"));
//! ```

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TempUrlError {
    #[error("Temp URL key is required")]
    MissingKey,

    #[error("Container and object name are required")]
    MissingObject,

    #[error("Invalid service endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// Compute the hex HMAC-SHA1 signature over `METHOD\nEXPIRES\nPATH`
pub fn sign(method: &str, expires: i64, path: &str, key: &str) -> Result<String, TempUrlError> {
    let body = format!("{}\n{}\n{}", method.to_ascii_uppercase(), expires, path);
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes()).map_err(|_| TempUrlError::MissingKey)?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Parameters of one temporary URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempUrlOptions {
    pub method: String,
    pub container: String,
    pub remote: String,
    pub key: String,
    /// Absolute expiry in unix seconds; defaults to now + `duration_secs`
    pub expires: Option<i64>,
    /// Lifetime used when `expires` is not set; defaults to the client's configured duration
    pub duration_secs: Option<u64>,
    /// Suggested download filename, appended as `filename=`
    pub filename: Option<String>,
}

impl TempUrlOptions {
    pub fn new(
        method: impl Into<String>,
        container: impl Into<String>,
        remote: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            container: container.into(),
            remote: remote.into(),
            key: key.into(),
            expires: None,
            duration_secs: None,
            filename: None,
        }
    }

    pub fn expires(mut self, expires: i64) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    fn expires_at(&self, default_duration_secs: u64) -> i64 {
        self.expires.unwrap_or_else(|| {
            let secs = self.duration_secs.unwrap_or(default_duration_secs);
            Utc::now().timestamp().saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))
        })
    }

    /// Build the signed URL against `service_url`
    pub fn build_url(
        &self,
        service_url: &str,
        default_duration_secs: u64,
    ) -> Result<String, TempUrlError> {
        if self.key.is_empty() {
            return Err(TempUrlError::MissingKey);
        }
        if self.container.is_empty() || self.remote.is_empty() {
            return Err(TempUrlError::MissingObject);
        }

        let service_url = service_url.trim_end_matches('/');
        let invalid = || TempUrlError::InvalidEndpoint(service_url.to_string());
        let mut url = reqwest::Url::parse(service_url).map_err(|_| invalid())?;

        // Swift verifies against the decoded path, so sign the names as given
        let path = format!(
            "{}/{}/{}",
            url.path().trim_end_matches('/'),
            self.container,
            self.remote
        );
        let expires = self.expires_at(default_duration_secs);
        let signature = sign(&self.method, expires, &path, &self.key)?;

        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(&self.container)
            .extend(self.remote.split('/'));
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("temp_url_sig", &signature)
                .append_pair("temp_url_expires", &expires.to_string());
            if let Some(filename) = &self.filename {
                query.append_pair("filename", filename);
            }
        }
        Ok(url.to_string())
    }
}
