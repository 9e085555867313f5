//! Worker lifecycle.
//!
//! ```text
//! Installing ──install──▶ Waiting ──activate──▶ Activating ──▶ Active
//!      │                                             │
//!      └──── strict precache failure ───▶ Redundant ◀┘ scope rejected
//! ```

use crate::fetch::Fetcher;
use crate::host::WorkerHost;
use crate::precache::{PrecacheLoader, PrecacheReport};
use crate::scope::ScopeGuard;
use crate::store::{CacheGeneration, CacheKind, CacheStore};
use pwacache_common::{CacheError, Result};
use pwacache_core::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Install event running.
    #[default]
    Installing,
    /// Installed, waiting for activation.
    Waiting,
    /// Activate event running.
    Activating,
    /// Intercepting requests.
    Active,
    /// Unregistered or failed install; terminal.
    Redundant,
}

/// Result of an install event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// `None` when precaching was skipped because the scope was rejected.
    pub precache: Option<PrecacheReport>,
}

/// Result of an activate event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Cache names removed by generation GC.
    pub deleted: Vec<String>,
    /// Clients taken over.
    pub claimed: usize,
    /// Whether the worker unregistered itself.
    pub unregistered: bool,
}

/// Drives install, activate and control messages.
pub struct LifecycleManager {
    state: RwLock<LifecycleState>,
    store: CacheStore,
    loader: PrecacheLoader,
    generation: CacheGeneration,
    manifest: Vec<String>,
    guard: ScopeGuard,
    host: Arc<dyn WorkerHost>,
    skip_waiting_message: String,
}

impl LifecycleManager {
    pub fn new(
        config: &WorkerConfig,
        store: CacheStore,
        fetcher: Arc<dyn Fetcher>,
        guard: ScopeGuard,
        host: Arc<dyn WorkerHost>,
    ) -> Self {
        Self {
            state: RwLock::new(LifecycleState::Installing),
            loader: PrecacheLoader::new(store.clone(), fetcher, config.precache.policy),
            store,
            generation: CacheGeneration::new(config.version.clone()),
            manifest: config.precache.manifest.clone(),
            guard,
            host,
            skip_waiting_message: config.skip_waiting_message.clone(),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == LifecycleState::Active
    }

    pub fn generation(&self) -> &CacheGeneration {
        &self.generation
    }

    /// Move to `to` if the current state is one of `from`.
    async fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<()> {
        let mut state = self.state.write().await;
        if !from.contains(&*state) {
            return Err(CacheError::state(format!(
                "cannot move from {:?} to {:?}",
                *state, to
            )));
        }
        debug!(from = ?*state, to = ?to, "Lifecycle transition");
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: LifecycleState) {
        *self.state.write().await = to;
    }

    /// Handle the install event.
    ///
    /// Precaches the manifest into the `static` cache unless the scope was
    /// rejected, then requests skip-waiting. A repeated install before
    /// activation re-runs precache; an active worker rejects it.
    pub async fn on_install(&self) -> Result<InstallReport> {
        self.transition(
            &[LifecycleState::Installing, LifecycleState::Waiting],
            LifecycleState::Installing,
        )
        .await?;

        let precache = if self.guard.is_controlled_scope() {
            for kind in CacheKind::ALL {
                self.open_cache(kind).await;
            }
            let target = self
                .store
                .handle(&self.generation.cache_name(CacheKind::Static));

            match self.loader.run(&self.manifest, &target).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Install failed");
                    self.set_state(LifecycleState::Redundant).await;
                    return Err(e);
                }
            }
        } else {
            info!(
                expected = self.guard.expected(),
                actual = self.guard.actual(),
                "Scope rejected, skipping precache"
            );
            None
        };

        self.host.skip_waiting().await?;
        self.set_state(LifecycleState::Waiting).await;
        info!(version = %self.generation.version(), "Installed");

        Ok(InstallReport { precache })
    }

    async fn open_cache(&self, kind: CacheKind) {
        let name = self.generation.cache_name(kind);
        if let Err(e) = self.store.open(&name).await {
            warn!(cache = %name, error = %e, "Failed to open cache");
        }
    }

    /// Handle the activate event.
    ///
    /// Deletes every cache outside the current generation, ensures the
    /// current generation exists and claims all clients. A rejected scope
    /// unregisters instead and the worker becomes redundant.
    pub async fn on_activate(&self) -> Result<ActivateReport> {
        self.transition(&[LifecycleState::Waiting], LifecycleState::Activating)
            .await?;

        if !self.guard.is_controlled_scope() {
            let unregistered = match self.host.unregister().await {
                Ok(unregistered) => unregistered,
                Err(e) => {
                    warn!(error = %e, "Unregister failed");
                    self.set_state(LifecycleState::Waiting).await;
                    return Err(e);
                }
            };
            self.set_state(LifecycleState::Redundant).await;
            warn!(
                expected = self.guard.expected(),
                actual = self.guard.actual(),
                unregistered,
                "Scope rejected, worker is redundant"
            );
            return Ok(ActivateReport {
                unregistered: true,
                ..ActivateReport::default()
            });
        }

        match self.collect_and_claim().await {
            Ok(report) => {
                self.set_state(LifecycleState::Active).await;
                info!(
                    version = %self.generation.version(),
                    deleted = report.deleted.len(),
                    claimed = report.claimed,
                    "Activated"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(LifecycleState::Waiting).await;
                Err(e)
            }
        }
    }

    async fn collect_and_claim(&self) -> Result<ActivateReport> {
        let deleted = self.store.collect_garbage(&self.generation).await?;

        for kind in CacheKind::ALL {
            self.store.open(&self.generation.cache_name(kind)).await?;
        }

        let claimed = self.host.claim_clients().await?;

        Ok(ActivateReport {
            deleted,
            claimed,
            unregistered: false,
        })
    }

    /// Handle a control message. Returns whether it requested skip-waiting.
    pub async fn on_message(&self, message: &str) -> Result<bool> {
        if !is_skip_waiting(message, &self.skip_waiting_message) {
            debug!(message, "Ignoring control message");
            return Ok(false);
        }
        info!("Skip-waiting requested by client");
        self.host.skip_waiting().await?;
        Ok(true)
    }
}

/// The sentinel either verbatim or as `{"type": sentinel}`.
fn is_skip_waiting(message: &str, sentinel: &str) -> bool {
    let message = message.trim();
    if message == sentinel {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(message)
        .ok()
        .and_then(|value| value.get("type")?.as_str().map(|t| t == sentinel))
        .unwrap_or(false)
}
