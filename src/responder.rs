//! Instance-side handling of set-commands.
//!
//! A running hashpipe instance listens on its own set channel and on the
//! family broadcast channel, and applies every `KEY=value` line it receives
//! to its status hash. [`SetCommandResponder`] does the same against any
//! [`StatusBackend`], which makes published writes observable without a
//! real pipeline.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::addressing::{Schema, StoreIdentity};
use crate::backend::StatusBackend;
use crate::error::Result;
use crate::message::parse_set_message;

/// Background task applying set-commands to one instance's status hash.
///
/// Dropping the responder stops it.
pub struct SetCommandResponder {
    identity: StoreIdentity,
    handle: JoinHandle<()>,
}

impl SetCommandResponder {
    /// Subscribe and start applying set-commands.
    ///
    /// Both subscriptions exist by the time this returns, so a command
    /// published afterwards is not missed. Must be called within a tokio
    /// runtime.
    pub fn spawn(
        backend: Arc<dyn StatusBackend>,
        schema: Schema,
        identity: StoreIdentity,
    ) -> Result<Self> {
        let status_hash = schema.status_hash(&identity);
        let set_channel = schema.set_channel(&identity);
        let direct = backend.subscribe(&set_channel)?;
        let everyone = backend.subscribe(&schema.broadcast_channel())?;
        let mut messages = direct.merge(everyone);

        info!(instance = %identity, %set_channel, "set-command responder started");

        let handle = tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                let fields = parse_set_message(&message.payload);
                if fields.is_empty() {
                    continue;
                }
                match backend.hash_set(&status_hash, &fields).await {
                    Ok(written) => {
                        debug!(channel = %message.channel, hash = %status_hash, written, "applied set-command")
                    }
                    Err(e) => {
                        warn!(channel = %message.channel, hash = %status_hash, error = %e, "failed to apply set-command")
                    }
                }
            }
            debug!(hash = %status_hash, "set-command channels closed");
        });

        Ok(Self { identity, handle })
    }

    pub fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to wind down.
    pub async fn shutdown(mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
        debug!(instance = %self.identity, "set-command responder stopped");
    }
}

impl Drop for SetCommandResponder {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
