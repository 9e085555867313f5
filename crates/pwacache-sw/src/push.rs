//! Push notifications.
//!
//! Only the boundary lives here: turning a delivered payload into the
//! notification to display, and resolving a click on it. Delivery and
//! rendering belong to the host.

use crate::clients::Client;
use crate::host::WorkerHost;
use crate::scope::resolve_url;
use pwacache_common::Result;
use pwacache_core::PushConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Origin;

/// Fields recognized in a push payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    /// Older senders use `message` instead of `body`.
    pub message: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
}

impl PushPayload {
    /// Parse a payload; anything that is not a JSON object becomes the body.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<PushPayload>(raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Push payload is not structured, using it as body");
                Self {
                    body: Some(raw.to_string()),
                    ..Self::default()
                }
            }
        }
    }
}

/// Notification ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// De-duplication tag; `None` when the payload had none or an empty one.
    pub tag: Option<String>,
    /// Alert again when replacing a notification with the same tag.
    pub renotify: bool,
    /// Click-through target, relative to the origin.
    pub url: String,
}

impl Notification {
    /// Build a notification from a payload, filling gaps from `defaults`.
    /// A missing `url` points at `scope`.
    pub fn from_payload(payload: PushPayload, defaults: &PushConfig, scope: &str) -> Self {
        let tag = payload.tag.filter(|tag| !tag.is_empty());
        Self {
            title: non_empty(payload.title).unwrap_or_else(|| defaults.default_title.clone()),
            body: payload.body.or(payload.message).unwrap_or_default(),
            icon: non_empty(payload.icon).unwrap_or_else(|| defaults.default_icon.clone()),
            badge: non_empty(payload.badge).unwrap_or_else(|| defaults.default_badge.clone()),
            renotify: tag.is_some(),
            tag,
            url: non_empty(payload.url).unwrap_or_else(|| scope.to_string()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Resolve a notification click: focus an open window already showing the
/// target URL, otherwise open a new one.
pub async fn notification_click(
    host: &dyn WorkerHost,
    origin: &Origin,
    notification: &Notification,
) -> Result<Client> {
    let target = resolve_url(origin, &notification.url)?;

    for client in host.window_clients().await? {
        if client.url == target {
            info!(client = %client.id, url = %target, "Focusing existing window");
            return host.focus(&client.id).await;
        }
    }

    info!(url = %target, "Opening new window");
    host.open_window(&target).await
}
