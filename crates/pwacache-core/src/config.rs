//! Worker configuration

use crate::types::VersionTag;
use pwacache_common::{CacheError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Worker configuration, computed once at startup and shared read-only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Deployment generation; changing it invalidates every older cache
    pub version: VersionTag,

    /// Path prefix the worker is expected to control
    pub scope: String,

    /// Precache settings
    pub precache: PrecacheConfig,

    /// Classification and fallback settings
    pub routing: RoutingConfig,

    /// Control message that forces skip-waiting
    pub skip_waiting_message: String,

    /// Push notification defaults
    pub push: PushConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecacheConfig {
    /// Absolute paths fetched into the static cache on install
    pub manifest: Vec<String>,

    /// What a missing manifest entry does to install
    pub policy: PrecachePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecachePolicy {
    /// Record failures and carry on.
    #[default]
    Tolerant,
    /// Fail install when any entry is missing.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path prefixes never intercepted (admin, login, logout)
    pub bypass_prefixes: Vec<String>,

    /// Path prefixes treated as images
    pub media_prefixes: Vec<String>,

    /// Path prefixes treated as static assets
    pub static_prefixes: Vec<String>,

    /// File extensions treated as images (lowercase, no dot)
    pub image_extensions: Vec<String>,

    /// Pages tried, in order, when a navigation fails offline
    pub fallback_pages: Vec<String>,

    /// Strategy for requests that match no other category
    pub other_strategy: StrategyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Title used when the payload has none
    pub default_title: String,

    /// Icon used when the payload has none
    pub default_icon: String,

    /// Badge used when the payload has none
    pub default_badge: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: VersionTag::new("v1.2.3"),
            scope: "/dashboard/".to_string(),
            precache: PrecacheConfig::default(),
            routing: RoutingConfig::default(),
            skip_waiting_message: "SKIP_WAITING".to_string(),
            push: PushConfig::default(),
        }
    }
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            manifest: [
                "/dashboard/",
                "/dashboard/home/",
                "/dashboard/offline/",
                "/dashboard/manifest.json",
                "/static/dashboard/icons/icon-192.png",
                "/static/dashboard/icons/icon-192-maskable.png",
                "/static/dashboard/icons/icon-512.png",
                "/static/dashboard/icons/icon-512-maskable.png",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            policy: PrecachePolicy::default(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            bypass_prefixes: strings(&["/admin/", "/login/", "/logout/"]),
            media_prefixes: strings(&["/media/"]),
            static_prefixes: strings(&["/static/"]),
            image_extensions: strings(&["png", "jpg", "jpeg", "gif", "webp", "svg"]),
            fallback_pages: strings(&["/dashboard/offline/", "/dashboard/home/"]),
            other_strategy: StrategyKind::NetworkFirst,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            default_title: "Notificación".to_string(),
            default_icon: "/static/dashboard/icons/icon-192.png".to_string(),
            default_badge: "/static/dashboard/icons/icon-192.png".to_string(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl WorkerConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).config_context("invalid worker config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading worker config");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).config_context("failed to serialize worker config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(CacheError::config("version tag must not be empty"));
        }
        if !self.scope.starts_with('/') || !self.scope.ends_with('/') {
            return Err(CacheError::config(format!(
                "scope must start and end with '/': {}",
                self.scope
            )));
        }
        if let Some(entry) = self
            .precache
            .manifest
            .iter()
            .find(|entry| !is_absolute_entry(entry))
        {
            return Err(CacheError::config(format!(
                "precache entry must be an absolute path or URL: {}",
                entry
            )));
        }
        if let Some(page) = self
            .routing
            .fallback_pages
            .iter()
            .find(|page| !page.starts_with('/'))
        {
            return Err(CacheError::config(format!(
                "fallback page must be an absolute path: {}",
                page
            )));
        }
        if self.skip_waiting_message.is_empty() {
            return Err(CacheError::config("skip-waiting message must not be empty"));
        }
        Ok(())
    }
}

fn is_absolute_entry(entry: &str) -> bool {
    entry.starts_with('/') || entry.starts_with("https://") || entry.starts_with("http://")
}
