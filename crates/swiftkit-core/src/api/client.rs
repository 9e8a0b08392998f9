//! Swift operation layer.
//!
//! Each public method obtains a valid session from the `SessionManager`,
//! builds one request against the service endpoint and translates the
//! response. Nothing is retried here.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::auth::{SessionManager, ValidSession, AUTH_TOKEN_HEADER};
use crate::config::SwiftConfig;
use crate::models::{
    ContainerInfo, DownloadedObject, ListFormat, ListOptions, Listing, Metadata, ObjectEntry,
    ObjectWritten,
};
use crate::tempurl::TempUrlOptions;

use super::ApiError;

/// Maximum concurrent DELETE requests issued by `remove_all_files`.
/// Keeps a bulk delete from flooding the proxy with connections.
const MAX_CONCURRENT_DELETES: usize = 10;

const COPY_FROM_HEADER: &str = "x-copy-from";
const CONTAINER_READ_HEADER: &str = "x-container-read";
const VERSIONS_LOCATION_HEADER: &str = "x-versions-location";
const TEMP_URL_KEY_HEADER: &str = "x-account-meta-temp-url-key";

/// Source of an object body
#[derive(Debug)]
pub enum UploadBody {
    Bytes(Vec<u8>),
    /// Streamed from a local file when the upload is sent
    File(PathBuf),
    /// Streamed from an arbitrary body, sent with chunked transfer encoding
    Stream(Body),
}

#[derive(Debug)]
pub struct UploadRequest {
    /// Omit to address the object directly under the service endpoint
    pub container: Option<String>,
    pub remote: String,
    pub body: UploadBody,
    pub headers: HeaderMap,
}

impl UploadRequest {
    pub fn bytes(container: impl Into<String>, remote: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            container: Some(container.into()),
            remote: remote.into(),
            body: UploadBody::Bytes(data),
            headers: HeaderMap::new(),
        }
    }

    pub fn file(
        container: impl Into<String>,
        remote: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            container: Some(container.into()),
            remote: remote.into(),
            body: UploadBody::File(path.into()),
            headers: HeaderMap::new(),
        }
    }

    /// Stream the object from `reader` without buffering it
    pub fn reader<R>(container: impl Into<String>, remote: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self {
            container: Some(container.into()),
            remote: remote.into(),
            body: UploadBody::Stream(Body::wrap_stream(ReaderStream::new(reader))),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Outcome of `remove_all_files`
#[derive(Debug, Default)]
pub struct RemovedObjects {
    pub removed: Vec<String>,
    pub failed: Vec<(String, ApiError)>,
}

/// Client for one Swift account.
/// Clone is cheap - clones share the connection pool and the session.
#[derive(Clone)]
pub struct SwiftClient {
    http: Client,
    session: SessionManager,
    temp_url_duration_secs: u64,
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn single_header(name: &'static str, value: &str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(name), header_value(name, value)?);
    Ok(headers)
}

/// The service endpoint with `segments` appended, each percent-encoded
fn storage_url<'a>(
    service_url: &str,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, ApiError> {
    let invalid = || ApiError::InvalidEndpoint(service_url.to_string());
    let mut url = Url::parse(service_url).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn container_url(service_url: &str, container: &str) -> Result<Url, ApiError> {
    storage_url(service_url, [container])
}

/// Container URL with a trailing slash, as Swift expects for container POST/HEAD
fn container_dir_url(service_url: &str, container: &str) -> Result<Url, ApiError> {
    storage_url(service_url, [container, ""])
}

/// Object names keep `/` as a path separator; every other reserved
/// character (`#`, `?`, `%`, space) is encoded within its segment.
fn object_url(service_url: &str, container: Option<&str>, object: &str) -> Result<Url, ApiError> {
    storage_url(service_url, container.into_iter().chain(object.split('/')))
}

/// `/container/object`, encoded, as used by `X-Copy-From`
fn object_path(service_url: &str, container: &str, object: &str) -> Result<String, ApiError> {
    let endpoint = storage_url(service_url, [])?;
    let object = object_url(service_url, Some(container), object)?;
    let prefix = endpoint.path().trim_end_matches('/').len();
    Ok(object.path()[prefix..].to_string())
}

impl SwiftClient {
    /// Create a client without contacting the server
    pub fn new(config: SwiftConfig) -> Result<Self, ApiError> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        let session = SessionManager::new(
            http.clone(),
            config.credentials,
            config.validation,
            config.endpoint_interface,
        );

        Ok(Self {
            http,
            session,
            temp_url_duration_secs: config.temp_url_duration_secs,
        })
    }

    /// Create a client and authenticate immediately
    pub async fn connect(config: SwiftConfig) -> Result<Self, ApiError> {
        let client = Self::new(config)?;
        client.session.ensure_session().await?;
        Ok(client)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Cached service endpoint, if a session has been established
    pub async fn service_url(&self) -> Option<String> {
        self.session.current().await.map(|s| s.service_url.clone())
    }

    fn authorized(&self, builder: RequestBuilder, session: &ValidSession) -> RequestBuilder {
        builder.header(AUTH_TOKEN_HEADER, session.token())
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        session: &ValidSession,
    ) -> Result<Response, ApiError> {
        let response = self.authorized(builder, session).send().await?;
        debug!(url = %response.url(), status = response.status().as_u16(), "Swift response");
        Self::check_response(response).await
    }

    async fn send_for_status(
        &self,
        builder: RequestBuilder,
        session: &ValidSession,
    ) -> Result<u16, ApiError> {
        Ok(self.send(builder, session).await?.status().as_u16())
    }

    async fn head(&self, url: impl reqwest::IntoUrl, session: &ValidSession) -> Result<Metadata, ApiError> {
        let response = self.send(self.http.head(url), session).await?;
        Ok(Metadata::from_response(&response))
    }

    async fn fetch_listing<T: DeserializeOwned>(
        &self,
        url: impl reqwest::IntoUrl,
        query: Vec<(&'static str, String)>,
        format: ListFormat,
        session: &ValidSession,
    ) -> Result<Listing<T>, ApiError> {
        let response = self.send(self.http.get(url).query(&query), session).await?;
        let body = response.text().await?;
        Ok(Listing::parse(format, body)?)
    }

    // ===== Objects =====

    pub async fn upload(&self, request: UploadRequest) -> Result<ObjectWritten, ApiError> {
        let session = self.session.ensure_session().await?;
        let url = object_url(
            session.service_url(),
            request.container.as_deref(),
            &request.remote,
        )?;

        let (body, length) = match request.body {
            UploadBody::Bytes(data) => {
                let length = data.len() as u64;
                (Body::from(data), Some(length))
            }
            UploadBody::File(path) => {
                let file = match tokio::fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(source) => return Err(ApiError::Io { path, source }),
                };
                let length = match file.metadata().await {
                    Ok(metadata) => metadata.len(),
                    Err(source) => return Err(ApiError::Io { path, source }),
                };
                (Body::wrap_stream(ReaderStream::new(file)), Some(length))
            }
            UploadBody::Stream(body) => (body, None),
        };

        debug!(url = %url, bytes = ?length, "Uploading object");
        let mut builder = self.http.put(url.clone()).headers(request.headers);
        if let Some(length) = length {
            builder = builder.header(CONTENT_LENGTH, length);
        }
        let status = self.send_for_status(builder.body(body), &session).await?;
        Ok(ObjectWritten {
            status,
            url: url.to_string(),
        })
    }

    pub async fn download(&self, container: &str, remote: &str) -> Result<DownloadedObject, ApiError> {
        self.download_with_headers(container, remote, HeaderMap::new()).await
    }

    /// Download with extra request headers such as `Range` or `If-None-Match`
    pub async fn download_with_headers(
        &self,
        container: &str,
        remote: &str,
        headers: HeaderMap,
    ) -> Result<DownloadedObject, ApiError> {
        let session = self.session.ensure_session().await?;
        let url = object_url(session.service_url(), Some(container), remote)?;
        let response = self.send(self.http.get(url).headers(headers), &session).await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(DownloadedObject {
            status,
            headers,
            body,
        })
    }

    pub async fn get_object_metadata(&self, container: &str, remote: &str) -> Result<Metadata, ApiError> {
        let session = self.session.ensure_session().await?;
        let url = object_url(session.service_url(), Some(container), remote)?;
        self.head(url, &session).await
    }

    pub async fn remove_file(&self, container: &str, remote: &str) -> Result<u16, ApiError> {
        let session = self.session.ensure_session().await?;
        self.delete_object(&session, container, remote).await
    }

    async fn delete_object(
        &self,
        session: &ValidSession,
        container: &str,
        remote: &str,
    ) -> Result<u16, ApiError> {
        let url = object_url(session.service_url(), Some(container), remote)?;
        self.send_for_status(self.http.delete(url), session).await
    }

    /// Delete every object in `container` (one listing page), leaving the
    /// container itself. Individual failures are collected, not fatal.
    pub async fn remove_all_files(&self, container: &str) -> Result<RemovedObjects, ApiError> {
        let session = self.session.ensure_session().await?;
        let options = ListOptions::new().format(ListFormat::Plain);
        let listing: Listing<ObjectEntry> = self
            .fetch_listing(
                container_url(session.service_url(), container)?,
                options.query_pairs(true),
                options.format,
                &session,
            )
            .await?;

        let names: Vec<String> = listing.lines().into_iter().map(str::to_string).collect();
        debug!(container = container, objects = names.len(), "Removing all objects");

        let mut outcome = RemovedObjects::default();
        for chunk in names.chunks(MAX_CONCURRENT_DELETES) {
            let deletes = chunk.iter().map(|name| {
                let session = &session;
                async move { (name, self.delete_object(session, container, name).await) }
            });

            for (name, result) in futures::future::join_all(deletes).await {
                match result {
                    Ok(_) => outcome.removed.push(name.clone()),
                    Err(e) => {
                        warn!(container = container, object = %name, error = %e, "Failed to delete object");
                        outcome.failed.push((name.clone(), e));
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Server-side copy via `X-Copy-From`
    pub async fn copy_file(
        &self,
        src_container: &str,
        src_file: &str,
        dest_container: &str,
        dest_file: &str,
    ) -> Result<ObjectWritten, ApiError> {
        let session = self.session.ensure_session().await?;
        let url = object_url(session.service_url(), Some(dest_container), dest_file)?;
        let source = object_path(session.service_url(), src_container, src_file)?;

        let builder = self
            .http
            .put(url.clone())
            .headers(single_header(COPY_FROM_HEADER, &source)?)
            .header(CONTENT_LENGTH, 0);
        let status = self.send_for_status(builder, &session).await?;
        Ok(ObjectWritten {
            status,
            url: url.to_string(),
        })
    }

    // ===== Containers =====

    pub async fn create_container(&self, container: &str, headers: HeaderMap) -> Result<u16, ApiError> {
        let session = self.session.ensure_session().await?;
        let url = container_url(session.service_url(), container)?;
        let builder = self.http.put(url).headers(headers).header(CONTENT_LENGTH, 0);
        self.send_for_status(builder, &session).await
    }

    pub async fn list_containers(&self, options: ListOptions) -> Result<Listing<ContainerInfo>, ApiError> {
        let session = self.session.ensure_session().await?;
        self.fetch_listing(
            session.service_url(),
            options.query_pairs(false),
            options.format,
            &session,
        )
        .await
    }

    pub async fn list_files(
        &self,
        container: &str,
        options: ListOptions,
    ) -> Result<Listing<ObjectEntry>, ApiError> {
        let session = self.session.ensure_session().await?;
        self.fetch_listing(
            container_url(session.service_url(), container)?,
            options.query_pairs(true),
            options.format,
            &session,
        )
        .await
    }

    // ===== Metadata =====

    /// Account metadata. When the session was just verified by a probe, the
    /// probe's headers are returned without a second request.
    pub async fn get_account_metadata(&self) -> Result<Metadata, ApiError> {
        let session = self.session.ensure_session().await?;
        if let Some(probe) = session.probe.clone() {
            debug!("Reusing probe response as account metadata");
            return Ok(probe);
        }
        self.head(session.service_url(), &session).await
    }

    pub async fn set_account_metadata(&self, headers: HeaderMap) -> Result<u16, ApiError> {
        let session = self.session.ensure_session().await?;
        self.send_for_status(self.http.post(session.service_url()).headers(headers), &session)
            .await
    }

    pub async fn get_container_metadata(&self, container: &str) -> Result<Metadata, ApiError> {
        let session = self.session.ensure_session().await?;
        let url = container_dir_url(session.service_url(), container)?;
        self.head(url, &session).await
    }

    pub async fn set_container_metadata(
        &self,
        container: &str,
        headers: HeaderMap,
    ) -> Result<u16, ApiError> {
        let session = self.session.ensure_session().await?;
        let url = container_dir_url(session.service_url(), container)?;
        self.send_for_status(self.http.post(url).headers(headers), &session)
            .await
    }

    /// Set the container read ACL, e.g. `.r:*` for public read
    pub async fn set_meta_read_acl(&self, container: &str, acl: &str) -> Result<u16, ApiError> {
        self.set_container_metadata(container, single_header(CONTAINER_READ_HEADER, acl)?)
            .await
    }

    pub async fn set_meta_versions_location(
        &self,
        container: &str,
        versions_container: &str,
    ) -> Result<u16, ApiError> {
        self.set_container_metadata(
            container,
            single_header(VERSIONS_LOCATION_HEADER, versions_container)?,
        )
        .await
    }

    /// Set the account key used to sign temporary URLs
    pub async fn set_meta_temp_url_key(&self, key: &str) -> Result<u16, ApiError> {
        self.set_account_metadata(single_header(TEMP_URL_KEY_HEADER, key)?)
            .await
    }

    // ===== Temporary URLs =====

    /// Sign a temporary URL against the session's service endpoint.
    /// Uses the cached endpoint when there is one and only authenticates
    /// when no session exists yet.
    pub async fn create_temp_url(&self, options: &TempUrlOptions) -> Result<String, ApiError> {
        let service_url = match self.session.current().await {
            Some(session) => session.service_url.clone(),
            None => self
                .session
                .ensure_session()
                .await?
                .service_url()
                .to_string(),
        };
        Ok(options.build_url(&service_url, self.temp_url_duration_secs)?)
    }

    /// Default temp URL lifetime from the config
    pub fn temp_url_duration(&self) -> Duration {
        Duration::from_secs(self.temp_url_duration_secs)
    }
}
