//! Client configuration.
//!
//! Loaded from JSON; every field has a default, so `{}` is a valid config.
//!
//! ```json
//! {
//!   "schema": "hashpipe",
//!   "addressing": {
//!     "hostname_pattern": "(?P<hostname>.+)-\\d+g-(?P<instance_id>.+)",
//!     "dns": { "192.168.64.100": "cosmic-gpu-0-100g-1" }
//!   },
//!   "retry": { "tries": 5, "retry_period_ms": 250 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::addressing::{AddressingConfig, Schema};
use crate::error::Result;

/// Retry settings for [`get_or_retry_with`](crate::store::KeyValueStore::get_or_retry_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub tries: u32,
    pub retry_period_ms: u64,
}

impl RetryPolicy {
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            retry_period_ms: 1000,
        }
    }
}

/// Top-level client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub schema: Schema,
    pub addressing: AddressingConfig,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
