//! Pypeline status keys.
//!
//! Pypeline (and postprocpype) instances keep their state in the same kind
//! of status hash as hashpipe, under the `pypeline://` scheme, and are
//! written directly instead of through a set-command.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::FutureExt;
use std::time::Duration;

use crate::derived::parse_pulse;
use crate::error::Result;
use crate::property::Property;
use crate::registry::{PropertyAccess, PropertyRegistry};
use crate::standard::alive;
use crate::store::SetOutcome;
use crate::value::{Value, TIME_FORMAT};

/// Heartbeat key written by pypeline.
pub const PYPELINE_PULSE_KEY: &str = "PULSE";

/// Pulse assumed when `PULSE` is absent.
pub const PYPELINE_DEFAULT_PULSE: &str = "1970/01/01 00:00:00";

/// Maximum heartbeat age of a live pypeline instance.
pub const PYPELINE_ALIVE_THRESHOLD: Duration = Duration::from_millis(1500);

/// The built-in pypeline property table.
pub fn pypeline_registry() -> PropertyRegistry {
    PropertyRegistry::from_table([
        Property::keyed("context", "#CONTEXT"),
        Property::keyed("stages", "#STAGES")
            .with_setter(|store, value| {
                async move {
                    let stages = match value {
                        Value::List(items) => items
                            .iter()
                            .map(Value::encode)
                            .collect::<Vec<_>>()
                            .join(" "),
                        other => other.encode(),
                    };
                    store.set("#STAGES", Value::Text(stages)).await
                }
                .boxed()
            })
            .with_doc("Space-separated stage names."),
        Property::keyed("pulse", PYPELINE_PULSE_KEY)
            .with_getter(|store| {
                async move {
                    let raw = store.get_raw(PYPELINE_PULSE_KEY).await?;
                    let text = match raw.as_deref().map(str::trim) {
                        Some(text) if !text.is_empty() => text.to_string(),
                        _ => PYPELINE_DEFAULT_PULSE.to_string(),
                    };
                    let pulse = parse_pulse(PYPELINE_PULSE_KEY, &text, TIME_FORMAT)?;
                    Ok(Some(Value::Time(pulse)))
                }
                .boxed()
            })
            .read_only(),
        Property::keyed("status", "STATUS").read_only(),
        Property::keyed("is_idle", "STATUS")
            .with_getter(|store| {
                async move {
                    let idle = store
                        .get_raw("STATUS")
                        .await?
                        .map(|status| status.starts_with('0'))
                        .unwrap_or(false);
                    Ok(Some(Value::Bool(idle)))
                }
                .boxed()
            })
            .read_only()
            .with_doc("STATUS starts with '0'."),
        Property::keyed("is_alive", PYPELINE_PULSE_KEY)
            .with_getter(|store| {
                async move { alive(store, PYPELINE_ALIVE_THRESHOLD).await }.boxed()
            })
            .read_only()
            .with_doc("Heartbeat is less than 1.5 seconds from now."),
    ])
}

/// Typed accessors for the pypeline properties.
#[async_trait]
pub trait PypelineStatus: PropertyAccess {
    async fn context(&self) -> Result<Option<String>> {
        self.property_text("context").await
    }

    async fn set_context(&self, context: &str) -> Result<SetOutcome> {
        self.set_property("context", Value::from(context)).await
    }

    async fn stages(&self) -> Result<Vec<String>> {
        Ok(self
            .property_text("stages")
            .await?
            .map(|stages| stages.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn set_stages(&self, stages: &[String]) -> Result<SetOutcome> {
        self.set_property("stages", Value::from(stages.to_vec())).await
    }

    async fn pulse(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self.property("pulse").await?.and_then(|v| v.as_time()))
    }

    async fn status(&self) -> Result<Option<String>> {
        self.property_text("status").await
    }

    async fn is_idle(&self) -> Result<bool> {
        Ok(self
            .property("is_idle")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn is_alive(&self) -> Result<bool> {
        Ok(self
            .property("is_alive")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

impl<T: PropertyAccess + ?Sized> PypelineStatus for T {}
