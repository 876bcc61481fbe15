//! Board configuration.
//!
//! Defines the canonical time-axis names, token length and watcher debounce.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::token::DEFAULT_TOKEN_LEN;
use crate::Result;

/// Configuration for a timeline handler and its watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Canonical names searched for when discovering the time axes.
    pub time_keys: TimeKeyNames,

    /// Length of session ids, state fingerprints and group ids.
    /// Default: 12
    pub token_len: usize,

    /// Debounce window for file change notifications in milliseconds.
    /// Default: 500
    pub debounce_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            time_keys: TimeKeyNames::default(),
            token_len: DEFAULT_TOKEN_LEN,
            debounce_ms: 500,
        }
    }
}

impl BoardConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Canonical names of the three time axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeKeyNames {
    pub epoch: String,
    pub iteration: String,
    pub elapsed_time: String,
}

impl Default for TimeKeyNames {
    fn default() -> Self {
        Self {
            epoch: "epoch".to_string(),
            iteration: "iteration".to_string(),
            elapsed_time: "elapsed_time".to_string(),
        }
    }
}
