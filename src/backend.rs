//! StatusBackend trait - the hash and pub/sub operations stores are built on.
//!
//! A backend holds named hashes of text fields and named publish channels.
//! Errors are transport failures and pass through stores unchanged.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::pubsub::Subscription;

#[async_trait]
pub trait StatusBackend: Send + Sync {
    /// Read one field of a hash. `None` if the hash or field is missing.
    async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>>;

    /// Read every field of a hash. Empty if the hash is missing.
    async fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>>;

    /// Write fields into a hash, creating it if needed.
    ///
    /// Returns the number of fields written.
    async fn hash_set(&self, hash: &str, fields: &[(String, String)]) -> Result<u64>;

    /// Publish a message. Returns the number of subscribers reached.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64>;

    /// Subscribe to a channel.
    fn subscribe(&self, channel: &str) -> Result<Subscription>;
}
