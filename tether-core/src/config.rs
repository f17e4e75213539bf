//! Configuration for the render host and for store factories.

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_max_passes() -> usize {
    64
}

/// Settings for a [`Host`](crate::host::Host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Upper bound on render passes per `flush` before the host gives up.
    ///
    /// Cross-store dependencies converge over a few passes; a producer that
    /// schedules itself on every render never does.
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
        }
    }
}

impl HostConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Options accepted by [`ScopedStore::with_options`](crate::store::ScopedStore::with_options).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Skip re-running the producer on parent-triggered provider renders
    /// when the provider arguments compare equal.
    pub memo: bool,

    /// Name used in diagnostics.
    pub name: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            memo: true,
            name: None,
        }
    }
}

impl StoreOptions {
    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable provider memoization.
    pub fn memo(mut self, memo: bool) -> Self {
        self.memo = memo;
        self
    }
}
