//! In-memory status backend.
//!
//! Holds hashes in a process-local map and publishes through [`PubSub`].
//! Nothing is durable; meant for tests and development.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::StatusBackend;
use crate::error::Result;
use crate::pubsub::{PubSub, Subscription};

type Hashes = BTreeMap<String, BTreeMap<String, String>>;

/// In-memory implementation of StatusBackend.
///
/// Clones share the same hashes and channels.
#[derive(Clone)]
pub struct MemoryBackend {
    hashes: Arc<RwLock<Hashes>>,
    pubsub: PubSub,
}

impl MemoryBackend {
    /// Create a backend with no hashes.
    pub fn new() -> Self {
        Self {
            hashes: Arc::new(RwLock::new(BTreeMap::new())),
            pubsub: PubSub::new(1024),
        }
    }

    /// Number of fields in a hash.
    pub fn hash_len(&self, hash: &str) -> usize {
        self.hashes.read().get(hash).map(BTreeMap::len).unwrap_or(0)
    }

    /// Names of all hashes, in order.
    pub fn hash_names(&self) -> Vec<String> {
        self.hashes.read().keys().cloned().collect()
    }

    /// Remove a field from a hash.
    pub fn remove_field(&self, hash: &str, field: &str) -> Option<String> {
        self.hashes.write().get_mut(hash)?.remove(field)
    }

    /// Drop all hashes.
    pub fn clear(&self) {
        self.hashes.write().clear();
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusBackend for MemoryBackend {
    async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .hashes
            .read()
            .get(hash)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    async fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.hashes.read().get(hash).cloned().unwrap_or_default())
    }

    async fn hash_set(&self, hash: &str, fields: &[(String, String)]) -> Result<u64> {
        let mut hashes = self.hashes.write();
        let entry = hashes.entry(hash.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        debug!(hash, fields = fields.len(), "hash updated");
        Ok(fields.len() as u64)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        let reached = self.pubsub.publish(channel, message);
        debug!(channel, reached, "published");
        Ok(reached)
    }

    fn subscribe(&self, channel: &str) -> Result<Subscription> {
        Ok(self.pubsub.subscribe(channel))
    }
}
