//! Versioned cache storage.
//!
//! ```text
//! CacheStore (origin-aware policy)
//!     │
//!     └── dyn CacheBackend
//!             ├── MemoryBackend
//!             └── SqliteBackend
//!
//! CacheGeneration "v1.2.3"
//!     ├── static-v1.2.3
//!     ├── pages-v1.2.3
//!     └── images-v1.2.3
//! ```

use async_trait::async_trait;
use hashbrown::HashMap;
use pwacache_common::Result;
use pwacache_core::{CachedEntry, Request, RequestKey, Response, VersionTag};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Origin;

// ==================== Generations ====================

/// One of the three caches in a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Static,
    Pages,
    Images,
}

impl CacheKind {
    /// All kinds, in fallback lookup order.
    pub const ALL: [CacheKind; 3] = [CacheKind::Static, CacheKind::Pages, CacheKind::Images];

    pub fn prefix(&self) -> &'static str {
        match self {
            CacheKind::Static => "static",
            CacheKind::Pages => "pages",
            CacheKind::Images => "images",
        }
    }
}

/// The set of caches belonging to one deployed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
    version: VersionTag,
}

impl CacheGeneration {
    pub fn new(version: VersionTag) -> Self {
        Self { version }
    }

    pub fn version(&self) -> &VersionTag {
        &self.version
    }

    /// Persisted name of one cache, e.g. `static-v1.2.3`.
    pub fn cache_name(&self, kind: CacheKind) -> String {
        format!("{}-{}", kind.prefix(), self.version)
    }

    /// Names that survive garbage collection.
    pub fn allow_set(&self) -> BTreeSet<String> {
        CacheKind::ALL.iter().map(|k| self.cache_name(*k)).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        CacheKind::ALL.iter().any(|k| self.cache_name(*k) == name)
    }
}

// ==================== Backend ====================

/// Persistent named key-value store of request/response snapshots.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Create the named cache if absent.
    async fn open(&self, name: &str) -> Result<()>;

    /// Read one entry.
    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

    /// Write one entry, replacing any previous value (last write wins).
    async fn put(&self, name: &str, key: RequestKey, entry: CachedEntry) -> Result<()>;

    /// Names of all persisted caches.
    async fn names(&self) -> Result<Vec<String>>;

    /// Remove a named cache and its entries.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Keys stored in a named cache.
    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>>;
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    caches: RwLock<HashMap<String, HashMap<RequestKey, CachedEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn open(&self, name: &str) -> Result<()> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .and_then(|cache| cache.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: RequestKey, entry: CachedEntry) -> Result<()> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key, entry);
        Ok(())
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>> {
        let caches = self.caches.read().await;
        let mut keys: Vec<RequestKey> = caches
            .get(name)
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}

// ==================== Store ====================

/// Handle to an opened cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    name: String,
}

impl CacheHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What happened to an opportunistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// Request targets another origin.
    SkippedCrossOrigin,
    /// Response status is not 200.
    SkippedStatus,
    /// The backend rejected the write; already logged.
    Failed,
}

/// Cache access with the engine's storage policy applied.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    origin: Origin,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, origin: Origin) -> Self {
        Self { backend, origin }
    }

    /// Origin whose requests may be cached.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Open (or create) a named cache.
    pub async fn open(&self, name: &str) -> Result<CacheHandle> {
        self.backend.open(name).await?;
        Ok(CacheHandle {
            name: name.to_string(),
        })
    }

    /// Handle for a cache without touching the backend; the cache is created
    /// on first write.
    pub fn handle(&self, name: &str) -> CacheHandle {
        CacheHandle {
            name: name.to_string(),
        }
    }

    /// Look up a stored snapshot. Read failures count as a miss.
    pub async fn lookup(&self, cache: &CacheHandle, request: &Request) -> Option<Response> {
        if !request.is_same_origin(&self.origin) {
            return None;
        }

        let key = request.key();
        match self.backend.get(&cache.name, &key).await {
            Ok(Some(entry)) => match entry.to_response() {
                Ok(response) => {
                    debug!(cache = %cache.name, key = %key, "Cache hit");
                    Some(response)
                }
                Err(e) => {
                    warn!(cache = %cache.name, key = %key, error = %e, "Discarding unreadable entry");
                    None
                }
            },
            Ok(None) => {
                debug!(cache = %cache.name, key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(cache = %cache.name, key = %key, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Store a response if it is eligible. Never fails.
    pub async fn store(
        &self,
        cache: &CacheHandle,
        request: &Request,
        response: &Response,
    ) -> StoreOutcome {
        if !request.is_same_origin(&self.origin) {
            return StoreOutcome::SkippedCrossOrigin;
        }
        if !response.is_storable() {
            debug!(cache = %cache.name, url = %request.url, status = %response.status, "Not caching non-200 response");
            return StoreOutcome::SkippedStatus;
        }

        let key = request.key();
        match self
            .backend
            .put(&cache.name, key.clone(), CachedEntry::snapshot(response))
            .await
        {
            Ok(()) => {
                debug!(cache = %cache.name, key = %key, "Stored response");
                StoreOutcome::Stored
            }
            Err(e) => {
                warn!(cache = %cache.name, key = %key, error = %e, "Cache write failed");
                StoreOutcome::Failed
            }
        }
    }

    /// All persisted cache names.
    pub async fn list_generations(&self) -> Result<BTreeSet<String>> {
        Ok(self.backend.names().await?.into_iter().collect())
    }

    /// Remove a named cache.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        self.backend.delete(name).await
    }

    /// Keys stored in a cache.
    pub async fn keys(&self, cache: &CacheHandle) -> Result<Vec<RequestKey>> {
        self.backend.keys(&cache.name).await
    }

    /// Delete every cache outside `generation`. Returns the deleted names.
    pub async fn collect_garbage(&self, generation: &CacheGeneration) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.list_generations().await? {
            if generation.contains(&name) {
                continue;
            }
            if self.backend.delete(&name).await? {
                debug!(cache = %name, "Deleted stale cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }
}
