//! # hashpipe-keyvalues
//!
//! Typed access to the key-value status buffers of running Hashpipe and
//! pypeline instances.
//!
//! Each instance publishes its state as a hash of text fields named
//! `{scheme}://{hostname}/{instance_id}/status`. This crate provides:
//!
//! - **Raw access**: `get`/`set` on any key, with numeric inference on read
//! - **Named properties**: a per-store registry mapping names like
//!   `channel_bandwidth` to keys, getters and setters
//! - **Derived properties**: reciprocal pairs, chunked lists, liveness
//! - **Snapshots**: an offline copy answering the same calls
//!
//! ## Backends
//!
//! Stores talk to a [`StatusBackend`]:
//!
//! - [`MemoryBackend`]: In-process hashes and channels (testing and development)
//! - [`SqliteBackend`]: Hashes persisted in SQLite, channels in-process
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hashpipe_keyvalues::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> hashpipe_keyvalues::Result<()> {
//!     let backend = Arc::new(MemoryBackend::new());
//!     let store = RemoteStore::hashpipe("cosmic-gpu-0", 1, backend);
//!
//!     // Raw keys
//!     let nants = store.get("NANTS", None).await?;
//!     println!("NANTS = {:?}", nants);
//!
//!     // Named properties
//!     store.set_channel_bandwidth(0.5).await?;
//!     println!("alive: {}", store.is_alive().await?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Snapshots
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hashpipe_keyvalues::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> hashpipe_keyvalues::Result<()> {
//!     let backend = Arc::new(MemoryBackend::new());
//!     let store = RemoteStore::hashpipe("cosmic-gpu-0", 1, backend);
//!
//!     let snapshot = store.snapshot().await?;
//!     println!("{} holds {} fields", snapshot, snapshot.len());
//!     println!("{}", snapshot.to_json()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Resolving an instance by address
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hashpipe_keyvalues::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> hashpipe_keyvalues::Result<()> {
//!     let config = ClientConfig::from_json_file("keyvalues.json")?;
//!     let backend = Arc::new(SqliteBackend::open("status.db").await?);
//!
//!     let store = RemoteStore::instance_at(
//!         "10.11.1.51",
//!         config.schema,
//!         backend,
//!         &config.addressing,
//!         None,
//!     )
//!     .await?;
//!     let source = store.get_or_retry_with("SRC_NAME", &config.retry).await?;
//!     println!("{} is observing {}", store, source);
//!
//!     Ok(())
//! }
//! ```

pub mod addressing;
pub mod backend;
pub mod config;
pub mod derived;
pub mod error;
pub mod memory;
pub mod message;
pub mod property;
pub mod pubsub;
pub mod pypeline;
pub mod registry;
pub mod remote;
pub mod responder;
pub mod snapshot;
pub mod sqlite;
pub mod standard;
pub mod store;
pub mod value;

// Re-export main types
pub use addressing::{
    AddressingConfig, HostResolver, HostnamePattern, HostsFileResolver, Schema, StaticResolver,
    StoreIdentity, WriteMode, DEFAULT_HOSTNAME_PATTERN,
};
pub use backend::StatusBackend;
pub use config::{ClientConfig, RetryPolicy};
pub use error::{KeyValueError, Result};
pub use memory::MemoryBackend;
pub use message::{encode_set_message, parse_set_message};
pub use property::{GetterFn, Property, Setter, SetterFn};
pub use pubsub::{PubSub, PublishedMessage, Subscription};
pub use pypeline::{pypeline_registry, PypelineStatus};
pub use registry::{PropertyAccess, PropertyRegistry};
pub use remote::{broadcast, RemoteStore};
pub use responder::SetCommandResponder;
pub use snapshot::{SnapshotRecord, SnapshotStore};
pub use sqlite::SqliteBackend;
pub use standard::{hashpipe_registry, HashpipeStatus};
pub use store::{KeyValueStore, SetOutcome};
pub use value::Value;

/// Prelude for convenient imports.
///
/// [`PypelineStatus`] is left out because its accessor names overlap with
/// [`HashpipeStatus`]; import it explicitly for pypeline stores.
pub mod prelude {
    pub use crate::addressing::{AddressingConfig, Schema, StoreIdentity};
    pub use crate::backend::StatusBackend;
    pub use crate::config::{ClientConfig, RetryPolicy};
    pub use crate::error::{KeyValueError, Result};
    pub use crate::memory::MemoryBackend;
    pub use crate::registry::PropertyAccess;
    pub use crate::remote::RemoteStore;
    pub use crate::snapshot::SnapshotStore;
    pub use crate::sqlite::SqliteBackend;
    pub use crate::standard::HashpipeStatus;
    pub use crate::store::KeyValueStore;
    pub use crate::value::Value;
}
