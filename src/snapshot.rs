//! Point-in-time copy of an instance's status hash.
//!
//! A snapshot answers the same get/set calls as a live store but never
//! touches a backend: writes only change the local copy.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::addressing::StoreIdentity;
use crate::error::Result;
use crate::message::encode_set_message;
use crate::property::Property;
use crate::registry::PropertyRegistry;
use crate::store::{KeyValueStore, SetOutcome};
use crate::value::{decode, Value};

/// Serializable form of a snapshot: identity plus raw field text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub hostname: String,
    pub instance_id: String,
    pub values: BTreeMap<String, String>,
}

/// In-memory implementation of KeyValueStore.
pub struct SnapshotStore {
    identity: StoreIdentity,
    registry: Arc<PropertyRegistry>,
    values: RwLock<BTreeMap<String, String>>,
}

impl SnapshotStore {
    /// Create a snapshot from raw field text.
    pub fn new(
        identity: StoreIdentity,
        values: BTreeMap<String, String>,
        registry: PropertyRegistry,
    ) -> Self {
        Self::with_shared_registry(identity, values, Arc::new(registry))
    }

    pub(crate) fn with_shared_registry(
        identity: StoreIdentity,
        values: BTreeMap<String, String>,
        registry: Arc<PropertyRegistry>,
    ) -> Self {
        Self {
            identity,
            registry,
            values: RwLock::new(values),
        }
    }

    /// Rebuild a snapshot from its serialized record.
    pub fn from_record(record: SnapshotRecord, registry: PropertyRegistry) -> Self {
        Self::new(
            StoreIdentity::new(record.hostname, record.instance_id),
            record.values,
            registry,
        )
    }

    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            hostname: self.identity.hostname().to_string(),
            instance_id: self.identity.instance_id().to_string(),
            values: self.values.read().clone(),
        }
    }

    pub fn from_json(json: &str, registry: PropertyRegistry) -> Result<Self> {
        let record: SnapshotRecord = serde_json::from_str(json)?;
        Ok(Self::from_record(record, registry))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_record())?)
    }

    /// Add properties to this snapshot's registry only.
    pub fn extend_properties(
        &mut self,
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<()> {
        Arc::make_mut(&mut self.registry).define_many(properties)
    }

    /// Copy of the raw field text.
    pub fn raw_values(&self) -> BTreeMap<String, String> {
        self.values.read().clone()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl fmt::Display for SnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:cache", self.identity)
    }
}

#[async_trait]
impl KeyValueStore for SnapshotStore {
    fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn get_many(
        &self,
        keys: &[&str],
        fallback: Option<Value>,
    ) -> Result<BTreeMap<String, Option<Value>>> {
        let values = self.values.read();
        Ok(keys
            .iter()
            .map(|key| {
                let value = decode(values.get(*key).map(String::as_str), fallback.clone());
                (key.to_string(), value)
            })
            .collect())
    }

    async fn get_all(&self, fallback: Option<Value>) -> Result<BTreeMap<String, Option<Value>>> {
        Ok(self
            .values
            .read()
            .iter()
            .map(|(key, raw)| (key.clone(), decode(Some(raw.as_str()), fallback.clone())))
            .collect())
    }

    async fn set_many(&self, assignments: &[(&str, Value)]) -> Result<SetOutcome> {
        let mut values = self.values.write();
        for (key, value) in assignments {
            values.insert(key.to_string(), value.encode());
        }
        Ok(SetOutcome {
            ack: assignments.len() as u64,
            message: encode_set_message(assignments),
        })
    }
}
