//! Precache population.
//!
//! Loads a fixed manifest into the `static` cache of the current generation.
//! Every manifest entry is attempted independently; one broken asset never
//! blocks the others.

use crate::fetch::Fetcher;
use crate::scope::resolve_url;
use crate::store::{CacheHandle, CacheStore, StoreOutcome};
use futures::future::join_all;
use http::StatusCode;
use pwacache_common::{CacheError, Result};
use pwacache_core::{CacheMode, PrecachePolicy, Request};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Why a manifest entry could not be precached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrecacheFailureReason {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("response not stored ({0:?})")]
    NotStored(StoreOutcome),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// A manifest entry that is missing from the cache after precache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheFailure {
    pub url: String,
    pub reason: PrecacheFailureReason,
}

/// Outcome of a precache run, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheReport {
    pub stored: Vec<String>,
    pub failed: Vec<PrecacheFailure>,
}

impl PrecacheReport {
    pub fn total(&self) -> usize {
        self.stored.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_urls(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.url.as_str()).collect()
    }
}

/// Eagerly fills a cache from the precache manifest.
#[derive(Clone)]
pub struct PrecacheLoader {
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    policy: PrecachePolicy,
}

impl PrecacheLoader {
    pub fn new(store: CacheStore, fetcher: Arc<dyn Fetcher>, policy: PrecachePolicy) -> Self {
        Self {
            store,
            fetcher,
            policy,
        }
    }

    /// Precache every manifest entry into `target`.
    ///
    /// With the tolerant policy this never fails; the strict policy returns
    /// `CacheError::Precache` once the whole manifest has been processed.
    pub async fn run(&self, manifest: &[String], target: &CacheHandle) -> Result<PrecacheReport> {
        let attempts = manifest.iter().map(|entry| self.load_one(entry, target));
        let results = join_all(attempts).await;

        let mut report = PrecacheReport::default();
        for (entry, result) in manifest.iter().zip(results) {
            match result {
                Ok(()) => report.stored.push(entry.clone()),
                Err(reason) => {
                    warn!(url = %entry, reason = %reason, "Precache entry failed");
                    report.failed.push(PrecacheFailure {
                        url: entry.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            cache = target.name(),
            stored = report.stored.len(),
            failed = report.failed.len(),
            "Precache finished"
        );

        if self.policy == PrecachePolicy::Strict && !report.is_complete() {
            return Err(CacheError::Precache {
                failed: report.failed.len(),
                total: report.total(),
            });
        }

        Ok(report)
    }

    async fn load_one(
        &self,
        entry: &str,
        target: &CacheHandle,
    ) -> std::result::Result<(), PrecacheFailureReason> {
        let url = resolve_url(self.store.origin(), entry)
            .map_err(|e| PrecacheFailureReason::InvalidUrl(e.to_string()))?;
        let request = Request::get(url).with_cache(CacheMode::Reload);

        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| PrecacheFailureReason::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(PrecacheFailureReason::Status(response.status));
        }

        match self.store.store(target, &request, &response).await {
            StoreOutcome::Stored => Ok(()),
            outcome => Err(PrecacheFailureReason::NotStored(outcome)),
        }
    }
}
