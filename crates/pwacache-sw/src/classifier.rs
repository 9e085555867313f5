//! Request classification.
//!
//! Maps an intercepted request to the category that decides its caching
//! strategy. Classification is pure: it only looks at the request and the
//! routing configuration.

use http::Method;
use pwacache_core::{CredentialsMode, Destination, RedirectMode, Request, RequestMode, RoutingConfig};

/// Category of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCategory {
    /// Top-level page load.
    Navigation,
    /// Image or media file.
    Image,
    /// Stylesheet, script, font or anything under a static prefix.
    StaticAsset,
    /// Sensitive path the engine must not touch.
    Bypassed,
    /// Anything else (API calls, JSON, ...).
    Other,
}

/// Result of classifying a request.
#[derive(Debug, Clone)]
pub struct RequestClassification {
    pub category: RequestCategory,
    /// The request to use for cache lookups and network fetches.
    pub request: Request,
}

impl RequestClassification {
    pub fn is_bypassed(&self) -> bool {
        self.category == RequestCategory::Bypassed
    }

    pub fn is_navigation(&self) -> bool {
        self.category == RequestCategory::Navigation
    }
}

/// Classify a request.
///
/// Rules are applied in priority order: bypass, navigation, image, static
/// asset, other. Navigations under `scope` are normalized so that query
/// variants of the same page share one cache key.
pub fn classify(request: &Request, routing: &RoutingConfig, scope: &str) -> RequestClassification {
    let path = request.url.path();

    let category = if matches_prefix(path, &routing.bypass_prefixes) {
        RequestCategory::Bypassed
    } else if is_navigation(request) {
        RequestCategory::Navigation
    } else if is_image(request, routing) {
        RequestCategory::Image
    } else if is_static_asset(request, routing) {
        RequestCategory::StaticAsset
    } else {
        RequestCategory::Other
    };

    let request = if category == RequestCategory::Navigation && path.starts_with(scope) {
        normalize_navigation(request)
    } else {
        request.clone()
    };

    RequestClassification { category, request }
}

/// Strip query and fragment and rebuild as a same-origin, redirect-following GET.
pub fn normalize_navigation(request: &Request) -> Request {
    let mut normalized = request.clone();
    normalized.url.set_query(None);
    normalized.url.set_fragment(None);
    normalized.method = Method::GET;
    normalized.credentials = CredentialsMode::SameOrigin;
    normalized.redirect = RedirectMode::Follow;
    normalized
}

fn is_navigation(request: &Request) -> bool {
    request.mode == RequestMode::Navigate || request.accepts_html()
}

fn is_image(request: &Request, routing: &RoutingConfig) -> bool {
    request.destination == Destination::Image
        || matches_prefix(request.url.path(), &routing.media_prefixes)
        || has_image_extension(request.url.path(), &routing.image_extensions)
}

fn is_static_asset(request: &Request, routing: &RoutingConfig) -> bool {
    matches_prefix(request.url.path(), &routing.static_prefixes)
        || request.destination.is_static_asset()
}

fn matches_prefix(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn has_image_extension(path: &str, extensions: &[String]) -> bool {
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
        Some((_, ext)) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
