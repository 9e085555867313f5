//! Shared test fakes.

use crate::fetch::Fetcher;
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use pwacache_common::{CacheError, Result};
use pwacache_core::{Request, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

pub(crate) const ORIGIN: &str = "https://app.example";

/// In-process network with canned routes.
///
/// Unknown URLs and the offline switch both produce transport failures.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, (StatusCode, Bytes)>>,
    requests: Mutex<Vec<Request>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(&self, path: &str, body: &str) {
        self.serve_url(&format!("{ORIGIN}{path}"), body);
    }

    pub(crate) fn serve_status(&self, path: &str, status: StatusCode) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{ORIGIN}{path}"), (status, Bytes::new()));
    }

    pub(crate) fn serve_url(&self, url: &str, body: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            (StatusCode::OK, Bytes::from(body.to_string())),
        );
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::network(format!("offline: {}", request.url)));
        }

        let mut url: Url = request.url.clone();
        url.set_fragment(None);
        let route = self.routes.lock().unwrap().get(url.as_str()).cloned();
        match route {
            Some((status, body)) => Ok(Response::new(url, status, body)),
            None => Err(CacheError::network(format!("no route to {}", url))),
        }
    }
}
