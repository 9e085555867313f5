//! # pwacache Common
//!
//! Error types and logging configuration shared by the pwacache crates.
//!
//! ## Features
//!
//! - Unified error type with per-category reporting
//! - Logging configuration and setup
//! - Result extension traits

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for the offline engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Transport-level failure while talking to the network.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The persistent cache store rejected an operation.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The worker was activated under a scope it does not own.
    #[error("Scope mismatch: expected {expected}, activated under {actual}")]
    ScopeMismatch { expected: String, actual: String },

    /// Strict precache found missing manifest entries.
    #[error("Precache failed for {failed} of {total} manifest entries")]
    Precache { failed: usize, total: usize },

    /// A lifecycle event arrived in a state that cannot accept it.
    #[error("State error: {0}")]
    State(String),

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CacheError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with source.
    pub fn storage_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Check if this is a transport failure, the only kind the
    /// network-first fallback chain answers.
    pub fn is_network(&self) -> bool {
        matches!(self, CacheError::Network { .. })
    }

    /// Get the error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            CacheError::Network { .. } => "network",
            CacheError::Storage { .. } => "storage",
            CacheError::ScopeMismatch { .. } => "scope",
            CacheError::Precache { .. } => "precache",
            CacheError::State(_) => "state",
            CacheError::Config { .. } => "config",
            CacheError::Io(_) => "io",
            CacheError::NotFound(_) => "not_found",
            CacheError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for pwacache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Wrap any error as a storage error with context.
    fn storage_context(self, message: impl Into<String>) -> Result<T>;

    /// Wrap any error as a config error with context.
    fn config_context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn storage_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CacheError::storage_with_source(message, e))
    }

    fn config_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CacheError::config_with_source(message, e))
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| CacheError::NotFound(resource.into()))
    }
}
