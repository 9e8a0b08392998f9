//! In-process fake Keystone v2.0 + Swift server for integration tests.
//!
//! Bound to an ephemeral localhost port. Tokens are `tok-1`, `tok-2`, ...
//! and only tokens in `valid_tokens` are accepted by the storage routes.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, Response, StatusCode};
use axum::routing::{any, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use swiftkit_core::{Credentials, SwiftConfig};

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "secret";
pub const TENANT: &str = "demo";
pub const ACCOUNT_PATH: &str = "/v1/AUTH_test";

#[derive(Default)]
pub struct Container {
    pub objects: BTreeMap<String, Vec<u8>>,
    pub content_types: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

pub struct FakeState {
    pub base: String,
    pub auth_requests: usize,
    pub last_auth_body: Option<Value>,
    next_token: u64,
    pub valid_tokens: HashSet<String>,
    /// Name of the catalog entry returned by the token exchange
    pub service_name: String,
    /// (region, internalURL) pairs of the catalog entry. The publicURL of
    /// each is the same URL under `/public`.
    pub endpoints: Vec<(String, String)>,
    /// Answer token requests with 200 and this body instead of a token
    pub token_body_override: Option<String>,
    pub token_lifetime: chrono::Duration,
    pub auth_delay: Duration,
    /// Count of HEAD requests against the account root
    pub account_heads: usize,
    /// Count of authenticated storage requests of any kind
    pub storage_requests: usize,
    /// Status returned for account HEADs instead of the real answer
    pub account_head_override: Option<u16>,
    /// Return a non-JSON body for JSON listings
    pub garbage_listings: bool,
    pub account_headers: BTreeMap<String, String>,
    pub containers: BTreeMap<String, Container>,
    pub last_copy_from: Option<String>,
}

impl FakeState {
    fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            auth_requests: 0,
            last_auth_body: None,
            next_token: 0,
            valid_tokens: HashSet::new(),
            service_name: "swift".to_string(),
            endpoints: vec![
                ("RegionOne".to_string(), format!("{}{}", base, ACCOUNT_PATH)),
                ("RegionTwo".to_string(), format!("{}/v1/AUTH_two", base)),
            ],
            token_body_override: None,
            token_lifetime: chrono::Duration::hours(24),
            auth_delay: Duration::ZERO,
            account_heads: 0,
            storage_requests: 0,
            account_head_override: None,
            garbage_listings: false,
            account_headers: BTreeMap::new(),
            containers: BTreeMap::new(),
            last_copy_from: None,
        }
    }
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeSwift {
    pub base: String,
    pub state: Shared,
    handle: JoinHandle<()>,
}

impl Drop for FakeSwift {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeSwift {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind 127.0.0.1:0");
        let addr = listener.local_addr().expect("local addr");
        let base = format!("http://{}", addr);
        let state = Arc::new(Mutex::new(FakeState::new(&base)));

        let app = Router::new()
            .route("/v2.0/tokens", post(issue_token))
            .route(ACCOUNT_PATH, any(account_root))
            .route(&format!("{}/{{*rest}}", ACCOUNT_PATH), any(storage_path))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("fake swift server error: {e:?}");
            }
        });

        Self {
            base,
            state,
            handle,
        }
    }

    pub fn account_url(&self) -> String {
        format!("{}{}", self.base, ACCOUNT_PATH)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(format!("{}/v2.0", self.base), USERNAME, PASSWORD, TENANT)
    }

    pub fn config(&self) -> SwiftConfig {
        SwiftConfig::new(self.credentials())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().expect("fake state lock");
        f(&mut state)
    }

    pub fn auth_requests(&self) -> usize {
        self.with_state(|s| s.auth_requests)
    }

    pub fn account_heads(&self) -> usize {
        self.with_state(|s| s.account_heads)
    }

    /// Server-side revocation of every issued token
    pub fn revoke_all(&self) {
        self.with_state(|s| s.valid_tokens.clear());
    }
}

fn reply(status: StatusCode, headers: &[(&str, String)], body: impl Into<Body>) -> Response<Body> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder.body(body.into()).expect("build response")
}

fn empty(status: StatusCode) -> Response<Body> {
    reply(status, &[], Body::empty())
}

async fn issue_token(State(state): State<Shared>, Json(body): Json<Value>) -> Response<Body> {
    let delay = state.lock().expect("fake state lock").auth_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut s = state.lock().expect("fake state lock");
    s.auth_requests += 1;
    s.last_auth_body = Some(body.clone());

    let creds = &body["auth"]["passwordCredentials"];
    if creds["username"] != USERNAME || creds["password"] != PASSWORD {
        return reply(
            StatusCode::UNAUTHORIZED,
            &[],
            r#"{"error": {"message": "The request you have made requires authentication.", "code": 401}}"#,
        );
    }

    if let Some(body) = s.token_body_override.clone() {
        return reply(StatusCode::OK, &[("content-type", "application/json".to_string())], body);
    }

    s.next_token += 1;
    let token = format!("tok-{}", s.next_token);
    s.valid_tokens.insert(token.clone());

    let endpoints: Vec<Value> = s
        .endpoints
        .iter()
        .map(|(region, url)| {
            let public = url.replacen(&s.base, &format!("{}/public", s.base), 1);
            json!({"region": region, "internalURL": url, "publicURL": public})
        })
        .collect();
    let expires = (Utc::now() + s.token_lifetime).to_rfc3339();

    let response = json!({"access": {
        "token": {"id": token, "expires": expires},
        "serviceCatalog": [
            {"name": "keystone", "endpoints": [{"region": "RegionOne", "internalURL": format!("{}/v2.0", s.base)}]},
            {"name": s.service_name, "endpoints": endpoints}
        ]
    }});
    reply(StatusCode::OK, &[("content-type", "application/json".to_string())], response.to_string())
}

async fn account_root(
    State(state): State<Shared>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    storage(&state, method, "", query, headers, body)
}

/// Everything below the account. `rest` arrives percent-decoded.
async fn storage_path(
    State(state): State<Shared>,
    Path(rest): Path<String>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    storage(&state, method, &rest, query, headers, body)
}

fn storage(
    state: &Shared,
    method: Method,
    rest: &str,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let mut s = state.lock().expect("fake state lock");

    let token = headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !s.valid_tokens.contains(token) {
        if rest.is_empty() && method == Method::HEAD {
            s.account_heads += 1;
        }
        return empty(StatusCode::UNAUTHORIZED);
    }
    s.storage_requests += 1;

    let rest = rest.trim_start_matches('/');
    let (container, object) = match rest.split_once('/') {
        Some((c, o)) => (c.to_string(), o.to_string()),
        None => (rest.to_string(), String::new()),
    };

    if container.is_empty() {
        account(&mut s, &method, &query, &headers)
    } else if object.is_empty() {
        container_op(&mut s, &method, &container, &query, &headers)
    } else {
        object_op(&mut s, &method, &container, &object, &headers, body)
    }
}

/// X-Copy-From carries an encoded path that axum does not decode for us
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let hex = bytes
            .get(i + 1..i + 3)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        match (bytes[i], hex) {
            (b'%', Some(byte)) => {
                out.push(byte);
                i += 3;
            }
            (byte, _) => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn user_meta(headers: &HeaderMap, prefix: &str) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with(prefix))
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

fn listing_format(query: &HashMap<String, String>) -> String {
    query.get("format").cloned().unwrap_or_else(|| "plain".to_string())
}

fn account(
    s: &mut FakeState,
    method: &Method,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Response<Body> {
    match *method {
        Method::HEAD => {
            s.account_heads += 1;
            if let Some(code) = s.account_head_override {
                return empty(StatusCode::from_u16(code).expect("status code"));
            }
            let objects: usize = s.containers.values().map(|c| c.objects.len()).sum();
            let mut out = vec![
                ("x-account-container-count", s.containers.len().to_string()),
                ("x-account-object-count", objects.to_string()),
            ];
            let meta: Vec<(String, String)> = s.account_headers.clone().into_iter().collect();
            let mut owned: Vec<(&str, String)> = meta.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
            out.append(&mut owned);
            reply(StatusCode::NO_CONTENT, &out, Body::empty())
        }
        Method::POST => {
            for (name, value) in user_meta(headers, "x-account-meta-") {
                s.account_headers.insert(name, value);
            }
            empty(StatusCode::NO_CONTENT)
        }
        Method::GET => {
            let names: Vec<&String> = s.containers.keys().collect();
            if listing_format(query) == "json" {
                if s.garbage_listings {
                    return reply(StatusCode::OK, &[], "photos\nbackups\n");
                }
                let entries: Vec<Value> = s
                    .containers
                    .iter()
                    .map(|(name, c)| {
                        let bytes: usize = c.objects.values().map(Vec::len).sum();
                        json!({"name": name, "count": c.objects.len(), "bytes": bytes})
                    })
                    .collect();
                reply(StatusCode::OK, &[], Value::Array(entries).to_string())
            } else {
                let body: String = names.iter().map(|n| format!("{}\n", n)).collect();
                reply(StatusCode::OK, &[], body)
            }
        }
        _ => empty(StatusCode::METHOD_NOT_ALLOWED),
    }
}

fn container_op(
    s: &mut FakeState,
    method: &Method,
    name: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Response<Body> {
    match *method {
        Method::PUT => {
            let existed = s.containers.contains_key(name);
            s.containers.entry(name.to_string()).or_default();
            empty(if existed { StatusCode::ACCEPTED } else { StatusCode::CREATED })
        }
        Method::HEAD => match s.containers.get(name) {
            Some(c) => {
                let mut out = vec![("x-container-object-count", c.objects.len().to_string())];
                let mut meta: Vec<(&str, String)> =
                    c.headers.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
                out.append(&mut meta);
                reply(StatusCode::NO_CONTENT, &out, Body::empty())
            }
            None => empty(StatusCode::NOT_FOUND),
        },
        Method::POST => match s.containers.get_mut(name) {
            Some(c) => {
                for (header, value) in headers.iter() {
                    let header = header.as_str();
                    if header.starts_with("x-container-") || header == "x-versions-location" {
                        if let Ok(value) = value.to_str() {
                            c.headers.insert(header.to_string(), value.to_string());
                        }
                    }
                }
                empty(StatusCode::NO_CONTENT)
            }
            None => empty(StatusCode::NOT_FOUND),
        },
        Method::GET => {
            let garbage = s.garbage_listings;
            let Some(c) = s.containers.get(name) else {
                return empty(StatusCode::NOT_FOUND);
            };
            let prefix = query.get("prefix").cloned().unwrap_or_default();
            let delimiter = query.get("delimiter").cloned();
            let mut subdirs = Vec::new();
            let mut objects = Vec::new();
            for (key, data) in c.objects.iter().filter(|(k, _)| k.starts_with(&prefix)) {
                let tail = &key[prefix.len()..];
                match delimiter.as_deref().and_then(|d| tail.find(d).map(|i| i + d.len())) {
                    Some(end) => {
                        let dir = format!("{}{}", prefix, &tail[..end]);
                        if !subdirs.contains(&dir) {
                            subdirs.push(dir);
                        }
                    }
                    None => objects.push((key.clone(), data.len())),
                }
            }
            if objects.is_empty() && subdirs.is_empty() {
                return empty(StatusCode::NO_CONTENT);
            }
            if listing_format(query) == "json" {
                if garbage {
                    return reply(StatusCode::OK, &[], "<html>not json</html>");
                }
                let mut entries: Vec<Value> =
                    subdirs.iter().map(|d| json!({"subdir": d})).collect();
                entries.extend(objects.iter().map(|(k, len)| {
                    json!({"name": k, "bytes": len, "hash": "d41d8cd98f00b204e9800998ecf8427e",
                           "content_type": "application/octet-stream",
                           "last_modified": "2024-01-01T00:00:00.000000"})
                }));
                reply(StatusCode::OK, &[], Value::Array(entries).to_string())
            } else {
                let body: String = subdirs
                    .iter()
                    .cloned()
                    .chain(objects.iter().map(|(k, _)| k.clone()))
                    .map(|n| format!("{}\n", n))
                    .collect();
                reply(StatusCode::OK, &[], body)
            }
        }
        _ => empty(StatusCode::METHOD_NOT_ALLOWED),
    }
}

fn object_op(
    s: &mut FakeState,
    method: &Method,
    container: &str,
    object: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Body> {
    match *method {
        Method::PUT => {
            let data = match headers.get("x-copy-from").and_then(|v| v.to_str().ok()) {
                Some(source) => {
                    s.last_copy_from = Some(source.to_string());
                    let source = percent_decode(source.trim_start_matches('/'));
                    let Some((src_c, src_o)) = source.split_once('/') else {
                        return empty(StatusCode::PRECONDITION_FAILED);
                    };
                    match s.containers.get(src_c).and_then(|c| c.objects.get(src_o)) {
                        Some(data) => data.clone(),
                        None => return empty(StatusCode::NOT_FOUND),
                    }
                }
                None => body.to_vec(),
            };
            let content_type = headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            match s.containers.get_mut(container) {
                Some(c) => {
                    c.objects.insert(object.to_string(), data);
                    c.content_types.insert(object.to_string(), content_type);
                    empty(StatusCode::CREATED)
                }
                None => empty(StatusCode::NOT_FOUND),
            }
        }
        Method::GET | Method::HEAD => {
            let found = s.containers.get(container).and_then(|c| {
                let data = c.objects.get(object)?;
                Some((data, c.content_types.get(object).cloned().unwrap_or_default()))
            });
            match found {
                Some((data, content_type)) => reply(
                    StatusCode::OK,
                    &[
                        ("content-type", content_type),
                        ("etag", format!("\"{}\"", data.len())),
                    ],
                    if *method == Method::GET { data.clone() } else { Vec::new() },
                ),
                None => reply(StatusCode::NOT_FOUND, &[], "<html><h1>Not Found</h1></html>"),
            }
        }
        Method::DELETE => match s.containers.get_mut(container).and_then(|c| c.objects.remove(object)) {
            Some(_) => empty(StatusCode::NO_CONTENT),
            None => empty(StatusCode::NOT_FOUND),
        },
        _ => empty(StatusCode::METHOD_NOT_ALLOWED),
    }
}
