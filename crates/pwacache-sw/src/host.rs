//! Runtime boundary.
//!
//! The engine never talks to a browser directly; everything that would be
//! `self.skipWaiting()`, `clients.claim()` or `registration.unregister()`
//! goes through [`WorkerHost`].

use crate::clients::{Client, Clients};
use async_trait::async_trait;
use pwacache_common::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

/// Operations the hosting runtime provides to the worker.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Ask the runtime to activate this worker without waiting for old
    /// clients to close.
    async fn skip_waiting(&self) -> Result<()>;

    /// Take control of every open client. Returns how many were claimed.
    async fn claim_clients(&self) -> Result<usize>;

    /// Remove this worker's registration. Returns whether one existed.
    async fn unregister(&self) -> Result<bool>;

    /// Open window clients, controlled or not.
    async fn window_clients(&self) -> Result<Vec<Client>>;

    /// Focus an existing window client.
    async fn focus(&self, client_id: &str) -> Result<Client>;

    /// Open a new window at `url`.
    async fn open_window(&self, url: &Url) -> Result<Client>;
}

/// Host that keeps clients in memory and counts lifecycle requests.
#[derive(Debug, Default)]
pub struct InProcessHost {
    clients: RwLock<Clients>,
    skip_waiting_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    registered: AtomicBool,
}

impl InProcessHost {
    pub fn new() -> Self {
        Self {
            registered: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Register an already-open page.
    pub async fn add_client(&self, client: Client) {
        self.clients.write().await.add(client);
    }

    pub async fn client(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    pub fn skip_waiting_calls(&self) -> usize {
        self.skip_waiting_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerHost for InProcessHost {
    async fn skip_waiting(&self) -> Result<()> {
        self.skip_waiting_calls.fetch_add(1, Ordering::SeqCst);
        debug!("skip_waiting requested");
        Ok(())
    }

    async fn claim_clients(&self) -> Result<usize> {
        let claimed = self.clients.write().await.claim();
        debug!(claimed, "Clients claimed");
        Ok(claimed)
    }

    async fn unregister(&self) -> Result<bool> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        let was_registered = self.registered.swap(false, Ordering::SeqCst);
        info!(was_registered, "Worker unregistered");
        Ok(was_registered)
    }

    async fn window_clients(&self) -> Result<Vec<Client>> {
        Ok(self
            .clients
            .read()
            .await
            .windows(true)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn focus(&self, client_id: &str) -> Result<Client> {
        self.clients.write().await.focus(client_id)
    }

    async fn open_window(&self, url: &Url) -> Result<Client> {
        Ok(self.clients.write().await.open_window(url.clone()))
    }
}
