//! Controlled pages.

use hashbrown::HashMap;
use pwacache_common::{OptionExt, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// A window the host knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Current URL.
    pub url: Url,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls it.
    pub controlled: bool,
}

impl Client {
    /// An unfocused window, not yet controlled.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            focused: false,
            controlled: false,
        }
    }
}

/// Registry of windows, ordered by insertion.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    order: Vec<String>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Windows in insertion order; uncontrolled ones only when asked.
    pub fn windows(&self, include_uncontrolled: bool) -> Vec<&Client> {
        self.order
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|c| include_uncontrolled || c.controlled)
            .collect()
    }

    /// Open a focused window controlled by this worker.
    pub fn open_window(&mut self, url: Url) -> Client {
        for client in self.clients.values_mut() {
            client.focused = false;
        }

        let mut client = Client::window(url);
        client.focused = true;
        client.controlled = true;
        self.add(client.clone());
        client
    }

    /// Focus one window, unfocusing the rest.
    pub fn focus(&mut self, id: &str) -> Result<Client> {
        let client = self
            .clients
            .get_mut(id)
            .ok_or_not_found(format!("client {}", id))?;
        client.focused = true;
        let focused = client.clone();

        for client in self.clients.values_mut() {
            if client.id != id {
                client.focused = false;
            }
        }
        Ok(focused)
    }

    /// Take control of every uncontrolled client. Returns how many changed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    pub fn add(&mut self, client: Client) {
        if !self.clients.contains_key(&client.id) {
            self.order.push(client.id.clone());
        }
        self.clients.insert(client.id.clone(), client);
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
