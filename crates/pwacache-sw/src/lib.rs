//! # pwacache Service Worker
//!
//! Offline request-interception cache for the dashboard of a web app,
//! with service worker semantics.
//!
//! ## Features
//!
//! - **Classification**: navigation, image, static asset, bypassed, other
//! - **Strategies**: cache-first, network-first with offline fallback pages,
//!   stale-while-revalidate
//! - **Precache**: manifest loaded on install, tolerant of partial failure
//! - **Lifecycle**: install, activate with generation GC, skip-waiting
//! - **Scope guard**: a worker under the wrong scope unregisters itself
//! - **Backends**: in-memory and SQLite
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker (dispatch)
//!     │
//!     ├── ScopeGuard
//!     ├── LifecycleManager ── PrecacheLoader
//!     │                            │
//!     ├── classify ─▶ CacheStrategyRouter
//!     │                    │       │
//!     │                    │       └── Fetcher (network)
//!     │                    ▼
//!     │               CacheStore ── CacheBackend (memory | sqlite)
//!     │                    └── static-<tag>, pages-<tag>, images-<tag>
//!     │
//!     └── WorkerHost (skip-waiting, claim, unregister, clients)
//! ```

pub mod classifier;
pub mod clients;
pub mod fetch;
pub mod host;
pub mod lifecycle;
pub mod precache;
pub mod push;
pub mod router;
pub mod scope;
pub mod sqlite;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{classify, normalize_navigation, RequestCategory, RequestClassification};
pub use clients::{Client, Clients};
pub use fetch::{Fetcher, HttpFetcher};
pub use host::{InProcessHost, WorkerHost};
pub use lifecycle::{ActivateReport, InstallReport, LifecycleManager, LifecycleState};
pub use precache::{PrecacheFailure, PrecacheFailureReason, PrecacheLoader, PrecacheReport};
pub use push::{notification_click, Notification, PushPayload};
pub use router::{select_route, CacheStrategyRouter, Route};
pub use scope::{resolve_url, ScopeGuard};
pub use sqlite::SqliteBackend;
pub use store::{
    CacheBackend, CacheGeneration, CacheHandle, CacheKind, CacheStore, MemoryBackend,
    StoreOutcome,
};
pub use worker::{EventOutcome, FetchOutcome, PassthroughReason, ServiceWorker, WorkerEvent};
