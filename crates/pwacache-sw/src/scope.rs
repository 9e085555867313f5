//! Scope validation.
//!
//! A worker registered from the wrong location would take control of a URL
//! subtree it was never meant to serve. The guard is computed once at
//! startup; a rejected worker never caches, never intercepts, and
//! unregisters itself on activate.

use pwacache_common::{CacheError, Result};
use tracing::warn;
use url::{Origin, Url};

/// Startup decision on whether the activation scope is the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeGuard {
    expected: String,
    actual: String,
    controlled: bool,
}

impl ScopeGuard {
    /// Compare the actual registration scope with the expected path prefix.
    pub fn new(expected_prefix: &str, actual_scope: &Url) -> Self {
        let expected = with_trailing_slash(expected_prefix);
        let actual = with_trailing_slash(actual_scope.path());
        let controlled = expected == actual;

        if !controlled {
            warn!(expected = %expected, actual = %actual, "Worker activated under unexpected scope");
        }

        Self {
            expected,
            actual,
            controlled,
        }
    }

    pub fn is_controlled_scope(&self) -> bool {
        self.controlled
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn actual(&self) -> &str {
        &self.actual
    }

    /// `Err(ScopeMismatch)` when the scope was rejected.
    pub fn check(&self) -> Result<()> {
        if self.controlled {
            Ok(())
        } else {
            Err(CacheError::ScopeMismatch {
                expected: self.expected.clone(),
                actual: self.actual.clone(),
            })
        }
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Resolve a manifest path or page path against the worker origin.
pub fn resolve_url(origin: &Origin, entry: &str) -> Result<Url> {
    if !origin.is_tuple() {
        return Err(CacheError::InvalidArgument(format!(
            "cannot resolve {} against an opaque origin",
            entry
        )));
    }
    let base = Url::parse(&origin.ascii_serialization())
        .map_err(|e| CacheError::InvalidArgument(format!("bad origin: {}", e)))?;
    base.join(entry)
        .map_err(|e| CacheError::InvalidArgument(format!("bad url {}: {}", entry, e)))
}
