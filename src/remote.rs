//! Live status store backed by a [`StatusBackend`].
//!
//! Reads go to the instance's status hash. Writes are delivered according
//! to the schema: Hashpipe instances receive a published set-command and
//! apply it themselves; pypeline instances have their hash written directly.
//! Either way the write is fire-and-forget; read the field again if you
//! need confirmation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::addressing::{
    AddressingConfig, HostResolver, HostsFileResolver, Schema, StoreIdentity, WriteMode,
};
use crate::backend::StatusBackend;
use crate::error::Result;
use crate::message::encode_set_message;
use crate::property::Property;
use crate::registry::PropertyRegistry;
use crate::snapshot::SnapshotStore;
use crate::store::{KeyValueStore, SetOutcome};
use crate::value::{decode, Value};

/// Status store bound to one live instance.
#[derive(Clone)]
pub struct RemoteStore {
    identity: StoreIdentity,
    schema: Schema,
    backend: Arc<dyn StatusBackend>,
    registry: Arc<PropertyRegistry>,
    status_hash: String,
    set_channel: String,
}

impl RemoteStore {
    /// Bind to an instance using the schema's built-in properties.
    pub fn new(schema: Schema, identity: StoreIdentity, backend: Arc<dyn StatusBackend>) -> Self {
        Self::with_registry(schema, identity, backend, schema.registry())
    }

    /// Bind to an instance with a caller-supplied registry.
    pub fn with_registry(
        schema: Schema,
        identity: StoreIdentity,
        backend: Arc<dyn StatusBackend>,
        registry: PropertyRegistry,
    ) -> Self {
        let status_hash = schema.status_hash(&identity);
        let set_channel = schema.set_channel(&identity);
        Self {
            identity,
            schema,
            backend,
            registry: Arc::new(registry),
            status_hash,
            set_channel,
        }
    }

    /// Hashpipe instance with the standard property set.
    pub fn hashpipe(
        hostname: impl Into<String>,
        instance_id: impl ToString,
        backend: Arc<dyn StatusBackend>,
    ) -> Self {
        Self::new(Schema::Hashpipe, StoreIdentity::new(hostname, instance_id), backend)
    }

    /// Pypeline instance with the pypeline property set.
    pub fn pypeline(
        hostname: impl Into<String>,
        instance_id: impl ToString,
        backend: Arc<dyn StatusBackend>,
    ) -> Self {
        Self::new(Schema::Pypeline, StoreIdentity::new(hostname, instance_id), backend)
    }

    /// Bind to the instance serving at `address`.
    ///
    /// The address is looked up in `config.dns` first, then through
    /// `resolver`. The hostname found must match `config.hostname_pattern`.
    ///
    /// With no `resolver` only the system hosts file is consulted; there is
    /// no DNS PTR query. Deployments whose addresses are only known to DNS
    /// pass their own [`HostResolver`] or list the addresses in
    /// `config.dns`.
    pub async fn instance_at(
        address: &str,
        schema: Schema,
        backend: Arc<dyn StatusBackend>,
        config: &AddressingConfig,
        resolver: Option<&dyn HostResolver>,
    ) -> Result<Self> {
        let identity = match resolver {
            Some(resolver) => config.resolve_identity(address, resolver).await?,
            None => {
                config
                    .resolve_identity(address, &HostsFileResolver::default())
                    .await?
            }
        };
        Ok(Self::new(schema, identity, backend))
    }

    /// Same instance and backend viewed through another schema family.
    pub fn with_schema(&self, schema: Schema) -> Self {
        Self::new(schema, self.identity.clone(), self.backend.clone())
    }

    /// Add properties to this store's registry only.
    pub fn extend_properties(
        &mut self,
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<()> {
        Arc::make_mut(&mut self.registry).define_many(properties)
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn status_backend(&self) -> &Arc<dyn StatusBackend> {
        &self.backend
    }

    pub fn status_hash(&self) -> &str {
        &self.status_hash
    }

    pub fn set_channel(&self) -> &str {
        &self.set_channel
    }

    /// Capture the whole status hash as a snapshot sharing this registry.
    pub async fn snapshot(&self) -> Result<SnapshotStore> {
        let values = self.backend.hash_get_all(&self.status_hash).await?;
        Ok(SnapshotStore::with_shared_registry(
            self.identity.clone(),
            values,
            self.registry.clone(),
        ))
    }
}

impl fmt::Display for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity)
    }
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("identity", &self.identity)
            .field("schema", &self.schema)
            .field("properties", &self.registry.len())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for RemoteStore {
    fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.backend.hash_get(&self.status_hash, key).await
    }

    async fn get_many(
        &self,
        keys: &[&str],
        fallback: Option<Value>,
    ) -> Result<BTreeMap<String, Option<Value>>> {
        let all = self.backend.hash_get_all(&self.status_hash).await?;
        Ok(keys
            .iter()
            .map(|key| {
                let value = decode(all.get(*key).map(String::as_str), fallback.clone());
                (key.to_string(), value)
            })
            .collect())
    }

    async fn get_all(&self, fallback: Option<Value>) -> Result<BTreeMap<String, Option<Value>>> {
        let all = self.backend.hash_get_all(&self.status_hash).await?;
        Ok(all
            .iter()
            .map(|(key, raw)| (key.clone(), decode(Some(raw.as_str()), fallback.clone())))
            .collect())
    }

    async fn set_many(&self, assignments: &[(&str, Value)]) -> Result<SetOutcome> {
        let message = encode_set_message(assignments);
        let ack = match self.schema.write_mode() {
            WriteMode::Publish => {
                self.backend.publish(&self.set_channel, &message).await?
            }
            WriteMode::HashSet => {
                let fields: Vec<(String, String)> = assignments
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.encode()))
                    .collect();
                self.backend.hash_set(&self.status_hash, &fields).await?
            }
        };
        debug!(store = %self.identity, keys = assignments.len(), ack, "set");
        Ok(SetOutcome { ack, message })
    }
}

/// Publish assignments to every instance of a schema family.
pub async fn broadcast(
    backend: &dyn StatusBackend,
    schema: Schema,
    assignments: &[(&str, Value)],
) -> Result<SetOutcome> {
    let channel = schema.broadcast_channel();
    let message = encode_set_message(assignments);
    let ack = backend.publish(&channel, &message).await?;
    debug!(%channel, keys = assignments.len(), ack, "broadcast");
    Ok(SetOutcome { ack, message })
}
