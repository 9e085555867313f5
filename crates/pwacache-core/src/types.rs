//! Request/response model used throughout pwacache

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use pwacache_common::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::{Origin, Url};

/// Deployment generation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Request mode, as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// What the request will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Style,
    Script,
    Font,
    Manifest,
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Style, script and font destinations are static assets.
    pub fn is_static_asset(&self) -> bool {
        matches!(self, Destination::Style | Destination::Script | Destination::Font)
    }
}

/// Credentials mode for requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsMode {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// Redirect handling for requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    #[default]
    Follow,
    Error,
    Manual,
}

/// HTTP cache interaction requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    #[default]
    Default,
    NoStore,
    /// Bypass every HTTP cache on the way out.
    Reload,
    NoCache,
}

/// An intercepted outgoing request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: HeaderMap,
    pub credentials: CredentialsMode,
    pub redirect: RedirectMode,
    pub cache: CacheMode,
}

impl Request {
    /// Create a plain GET request (subresource fetch).
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::default(),
            destination: Destination::default(),
            headers: HeaderMap::new(),
            credentials: CredentialsMode::default(),
            redirect: RedirectMode::default(),
            cache: CacheMode::default(),
        }
    }

    /// Create a top-level page navigation.
    pub fn navigate(url: Url) -> Self {
        let mut request = Self::get(url);
        request.mode = RequestMode::Navigate;
        request.destination = Destination::Document;
        request.headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        );
        request
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Whether the `Accept` header asks for HTML.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false)
    }

    pub fn is_same_origin(&self, origin: &Origin) -> bool {
        self.url.origin() == *origin
    }

    /// Cache key for this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Cache key: method plus URL without fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// A designated offline/home page served in place of the request.
    Fallback,
}

/// A response handed back to the caller
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(url: Url, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// A 200 response from the network.
    pub fn ok(url: Url, body: impl Into<Bytes>) -> Self {
        Self::new(url, StatusCode::OK, body)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Only a plain 200 is ever written to a cache.
    pub fn is_storable(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Persisted response snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub cached_at: u64,
}

impl CachedEntry {
    /// Snapshot a response for storage.
    pub fn snapshot(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(v) => Some((name.as_str().to_string(), v.to_string())),
                Err(_) => {
                    debug!(
                        url = %response.url,
                        header = %name,
                        "Dropping non-ASCII header from snapshot"
                    );
                    None
                }
            })
            .collect();

        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            status_text: response.status_text.clone(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response served from cache.
    pub fn to_response(&self) -> Result<Response> {
        let url = Url::parse(&self.url).storage_context("cached entry has an invalid url")?;
        let status =
            StatusCode::from_u16(self.status).storage_context("cached entry has an invalid status")?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .storage_context("cached entry has an invalid header name")?;
            let value = HeaderValue::from_str(value)
                .storage_context("cached entry has an invalid header value")?;
            headers.append(name, value);
        }

        Ok(Response {
            url,
            status,
            status_text: self.status_text.clone(),
            headers,
            body: Bytes::from(self.body.clone()),
            source: ResponseSource::Cache,
        })
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
