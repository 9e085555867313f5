//! Strategy selection and execution.

use crate::classifier::{RequestCategory, RequestClassification};
use crate::fetch::Fetcher;
use crate::scope::resolve_url;
use crate::store::{CacheGeneration, CacheHandle, CacheKind, CacheStore};
use pwacache_common::{CacheError, Result};
use pwacache_core::{Request, Response, ResponseSource, RoutingConfig, StrategyKind};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Strategy and target cache for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub strategy: StrategyKind,
    pub cache: CacheKind,
}

/// Pick the route for a category. `Bypassed` has none.
pub fn select_route(category: RequestCategory, other_strategy: StrategyKind) -> Option<Route> {
    let route = match category {
        RequestCategory::Bypassed => return None,
        RequestCategory::Navigation => Route {
            strategy: StrategyKind::NetworkFirst,
            cache: CacheKind::Pages,
        },
        RequestCategory::Image => Route {
            strategy: StrategyKind::CacheFirst,
            cache: CacheKind::Images,
        },
        RequestCategory::StaticAsset => Route {
            strategy: StrategyKind::CacheFirst,
            cache: CacheKind::Static,
        },
        RequestCategory::Other => Route {
            strategy: other_strategy,
            cache: CacheKind::Pages,
        },
    };
    Some(route)
}

/// Executes caching strategies against the current generation.
#[derive(Clone)]
pub struct CacheStrategyRouter {
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    generation: CacheGeneration,
    fallback_pages: Vec<String>,
    other_strategy: StrategyKind,
}

impl CacheStrategyRouter {
    pub fn new(
        store: CacheStore,
        fetcher: Arc<dyn Fetcher>,
        generation: CacheGeneration,
        routing: &RoutingConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            generation,
            fallback_pages: routing.fallback_pages.clone(),
            other_strategy: routing.other_strategy,
        }
    }

    /// Serve a classified request.
    pub async fn route(&self, classification: &RequestClassification) -> Result<Response> {
        let route = select_route(classification.category, self.other_strategy).ok_or_else(|| {
            CacheError::InvalidArgument(format!(
                "bypassed request reached the router: {}",
                classification.request.url
            ))
        })?;

        let cache = self.cache(route.cache);
        let request = &classification.request;
        debug!(
            url = %request.url,
            category = ?classification.category,
            strategy = ?route.strategy,
            cache = cache.name(),
            "Routing request"
        );

        match route.strategy {
            StrategyKind::CacheFirst => self.cache_first(request, &cache).await,
            StrategyKind::NetworkFirst => {
                self.network_first(request, &cache, classification.is_navigation())
                    .await
            }
            StrategyKind::StaleWhileRevalidate => {
                self.stale_while_revalidate(request, &cache).await
            }
        }
    }

    fn cache(&self, kind: CacheKind) -> CacheHandle {
        self.store.handle(&self.generation.cache_name(kind))
    }

    /// Serve from cache when present; otherwise fetch and store.
    ///
    /// A hit is returned unchanged with no freshness check. A transport
    /// failure on miss is returned to the caller.
    pub async fn cache_first(&self, request: &Request, cache: &CacheHandle) -> Result<Response> {
        if let Some(hit) = self.store.lookup(cache, request).await {
            return Ok(hit);
        }

        let fresh = self.fetcher.fetch(request).await?;
        self.store.store(cache, request, &fresh).await;
        Ok(fresh)
    }

    /// Prefer the network; on transport failure fall back to the cached
    /// entry, then (navigations only) to the configured fallback pages.
    pub async fn network_first(
        &self,
        request: &Request,
        cache: &CacheHandle,
        navigation: bool,
    ) -> Result<Response> {
        let error = match self.fetcher.fetch(request).await {
            Ok(fresh) => {
                self.store.store(cache, request, &fresh).await;
                return Ok(fresh);
            }
            Err(e) if e.is_network() => e,
            Err(e) => return Err(e),
        };

        if let Some(hit) = self.store.lookup(cache, request).await {
            info!(url = %request.url, "Network failed, serving cached copy");
            return Ok(hit);
        }

        if navigation {
            if let Some(page) = self.fallback_page().await {
                info!(url = %request.url, fallback = %page.url, "Network failed, serving fallback page");
                return Ok(page);
            }
        }

        warn!(
            url = %request.url,
            category = error.category(),
            error = %error,
            "Network failed with nothing to fall back to"
        );
        Err(error)
    }

    /// Serve a cached copy immediately and refresh it in the background.
    pub async fn stale_while_revalidate(
        &self,
        request: &Request,
        cache: &CacheHandle,
    ) -> Result<Response> {
        if let Some(hit) = self.store.lookup(cache, request).await {
            let store = self.store.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let request = request.clone();
            let cache = cache.clone();
            tokio::spawn(async move {
                match fetcher.fetch(&request).await {
                    Ok(fresh) => {
                        store.store(&cache, &request, &fresh).await;
                    }
                    Err(e) => debug!(url = %request.url, error = %e, "Background revalidation failed"),
                }
            });
            return Ok(hit);
        }

        let fresh = self.fetcher.fetch(request).await?;
        self.store.store(cache, request, &fresh).await;
        Ok(fresh)
    }

    /// First configured fallback page found in any cache of the generation.
    async fn fallback_page(&self) -> Option<Response> {
        for page in &self.fallback_pages {
            let url = match resolve_url(self.store.origin(), page) {
                Ok(url) => url,
                Err(e) => {
                    warn!(page = %page, error = %e, "Skipping unresolvable fallback page");
                    continue;
                }
            };
            let request = Request::get(url);

            for kind in CacheKind::ALL {
                if let Some(hit) = self.store.lookup(&self.cache(kind), &request).await {
                    return Some(hit.with_source(ResponseSource::Fallback));
                }
            }
        }
        None
    }
}
