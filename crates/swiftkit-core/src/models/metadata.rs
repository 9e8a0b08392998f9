use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG};

/// User metadata header prefixes, stripped by `Metadata::user_metadata`
const META_PREFIXES: [&str; 3] = ["x-account-meta-", "x-container-meta-", "x-object-meta-"];

/// Status and headers from a HEAD request against an account, container or object
#[derive(Debug, Clone)]
pub struct Metadata {
    pub status: u16,
    pub headers: HeaderMap,
}

impl Metadata {
    pub fn from_response(response: &reqwest::Response) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// `X-Account-Object-Count` or `X-Container-Object-Count`
    pub fn object_count(&self) -> Option<u64> {
        self.get_u64("x-account-object-count")
            .or_else(|| self.get_u64("x-container-object-count"))
    }

    /// `X-Account-Bytes-Used` or `X-Container-Bytes-Used`
    pub fn bytes_used(&self) -> Option<u64> {
        self.get_u64("x-account-bytes-used")
            .or_else(|| self.get_u64("x-container-bytes-used"))
    }

    pub fn container_count(&self) -> Option<u64> {
        self.get_u64("x-account-container-count")
    }

    /// Custom `X-*-Meta-*` headers keyed by the lower-cased suffix
    pub fn user_metadata(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                let name = name.as_str();
                let key = META_PREFIXES
                    .iter()
                    .find_map(|prefix| name.strip_prefix(prefix))?;
                let value = value.to_str().ok()?;
                Some((key.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Result of a PUT that creates or copies an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectWritten {
    pub status: u16,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct DownloadedObject {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl DownloadedObject {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn metadata(pairs: &[(&'static str, &'static str)]) -> Metadata {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        Metadata {
            status: 204,
            headers,
        }
    }

    #[test]
    fn test_account_counters() {
        let meta = metadata(&[
            ("x-account-object-count", "12"),
            ("x-account-bytes-used", "4096"),
            ("x-account-container-count", "2"),
        ]);
        assert_eq!(meta.object_count(), Some(12));
        assert_eq!(meta.bytes_used(), Some(4096));
        assert_eq!(meta.container_count(), Some(2));
    }

    #[test]
    fn test_container_counters() {
        let meta = metadata(&[("x-container-object-count", "3"), ("x-container-bytes-used", "x")]);
        assert_eq!(meta.object_count(), Some(3));
        assert_eq!(meta.bytes_used(), None);
    }

    #[test]
    fn test_user_metadata_strips_prefixes() {
        let meta = metadata(&[
            ("x-account-meta-temp-url-key", "secret"),
            ("x-container-meta-owner", "ops"),
            ("x-trans-id", "tx123"),
        ]);
        let user = meta.user_metadata();
        assert_eq!(user.len(), 2);
        assert_eq!(user.get("temp-url-key").map(String::as_str), Some("secret"));
        assert_eq!(user.get("owner").map(String::as_str), Some("ops"));
    }
}
