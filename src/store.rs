//! KeyValueStore trait - the get/set contract shared by every status store.
//!
//! A store is bound to one instrument instance and knows its property
//! registry. Raw keys go through [`KeyValueStore::get`] and
//! [`KeyValueStore::set`]; named properties go through
//! [`PropertyAccess`](crate::registry::PropertyAccess).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::addressing::StoreIdentity;
use crate::config::RetryPolicy;
use crate::error::{KeyValueError, Result};
use crate::registry::PropertyRegistry;
use crate::value::{decode, Value};

/// What a write reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// Backend acknowledgement: subscriber count for published writes,
    /// fields written for direct hash writes and snapshots.
    pub ack: u64,
    /// The `KEY=value` message built for the write.
    pub message: String,
}

/// The core status-store trait.
///
/// Implemented by [`RemoteStore`](crate::remote::RemoteStore) and
/// [`SnapshotStore`](crate::snapshot::SnapshotStore). Code should depend on
/// this trait, not on either implementation.
///
/// Multi-key writes are not atomic. If the backend fails halfway through a
/// `set_many`, the store is left with whatever was written.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// The instance this store is bound to.
    fn identity(&self) -> &StoreIdentity;

    /// Properties available through this store.
    fn registry(&self) -> &PropertyRegistry;

    /// Read the undecoded text of a field.
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Read and decode a single field.
    ///
    /// Unknown keys and empty values return `fallback`.
    async fn get(&self, key: &str, fallback: Option<Value>) -> Result<Option<Value>> {
        let raw = self.get_raw(key).await?;
        Ok(decode(raw.as_deref(), fallback))
    }

    /// Read and decode several fields.
    ///
    /// Every requested key is present in the result; missing ones hold
    /// `fallback`.
    async fn get_many(
        &self,
        keys: &[&str],
        fallback: Option<Value>,
    ) -> Result<BTreeMap<String, Option<Value>>>;

    /// Read and decode every field of the instance.
    async fn get_all(&self, fallback: Option<Value>) -> Result<BTreeMap<String, Option<Value>>>;

    /// Write several fields with one message.
    async fn set_many(&self, assignments: &[(&str, Value)]) -> Result<SetOutcome>;

    /// Write a single field.
    async fn set(&self, key: &str, value: Value) -> Result<SetOutcome> {
        self.set_many(&[(key, value)]).await
    }

    /// Read a field, retrying until it holds a value.
    ///
    /// Makes at most `tries` attempts and sleeps `retry_period` between them.
    /// Fails with [`KeyValueError::ValueUnavailable`] once the attempts are
    /// used up. Backend errors end the loop immediately.
    async fn get_or_retry(&self, key: &str, tries: u32, retry_period: Duration) -> Result<Value> {
        for attempt in 1..=tries {
            if let Some(value) = self.get(key, None).await? {
                return Ok(value);
            }
            debug!(key, attempt, tries, "value not yet available");
            if attempt < tries {
                tokio::time::sleep(retry_period).await;
            }
        }
        Err(KeyValueError::ValueUnavailable {
            keys: vec![key.to_string()],
            attempts: tries,
        })
    }

    /// [`get_or_retry`](Self::get_or_retry) with a configured policy.
    async fn get_or_retry_with(&self, key: &str, policy: &RetryPolicy) -> Result<Value> {
        self.get_or_retry(key, policy.tries, policy.retry_period())
            .await
    }
}
