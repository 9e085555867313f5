//! Network boundary.

use async_trait::async_trait;
use http::{header, HeaderValue};
use pwacache_common::{CacheError, Result};
use pwacache_core::{CacheMode, RedirectMode, Request, Response, ResponseSource};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{debug, trace};

/// Performs real network requests on behalf of the engine.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a request from the network.
    ///
    /// Returns `Err(CacheError::Network)` only for transport failures; any
    /// HTTP status, including 4xx/5xx, is a successful fetch.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `Fetcher` backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    follow: Client,
    manual: Client,
}

impl HttpFetcher {
    /// Build a fetcher with default clients.
    pub fn new() -> Result<Self> {
        let follow = Client::builder()
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| CacheError::network_with_source("failed to build http client", e))?;
        let manual = Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| CacheError::network_with_source("failed to build http client", e))?;
        Ok(Self { follow, manual })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let client = match request.redirect {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Error | RedirectMode::Manual => &self.manual,
        };

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if matches!(request.cache, CacheMode::Reload | CacheMode::NoCache | CacheMode::NoStore) {
            builder = builder
                .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }

        trace!(method = %request.method, url = %request.url, "Network fetch");

        let response = builder
            .send()
            .await
            .map_err(|e| CacheError::network_with_source(format!("fetch {} failed", request.url), e))?;

        let status = response.status();
        if request.redirect == RedirectMode::Error && status.is_redirection() {
            return Err(CacheError::network(format!(
                "unexpected redirect fetching {}",
                request.url
            )));
        }

        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            CacheError::network_with_source(format!("reading body of {} failed", request.url), e)
        })?;

        debug!(url = %url, status = %status, bytes = body.len(), "Network response");

        Ok(Response {
            url,
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use url::Url;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dashboard/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Panel</h1>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/dashboard/", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "<h1>Panel</h1>");
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reload_bypasses_http_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dashboard/manifest.json"))
            .and(header_is("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/dashboard/manifest.json", server.uri())).unwrap();
        let response = fetcher
            .fetch(&Request::get(url).with_cache(CacheMode::Reload))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let err = fetcher.fetch(&Request::get(url)).await.unwrap_err();
        assert!(err.is_network());
    }
}
