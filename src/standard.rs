//! Standard Hashpipe status keys.
//!
//! [`hashpipe_registry`] builds the built-in property table and
//! [`HashpipeStatus`] layers typed accessors over it. The accessors read
//! through the store's registry, so a store that overrides a property sees
//! its own definition.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::FutureExt;
use std::path::PathBuf;
use std::time::Duration;

use crate::derived::{
    gather_chunks, is_alive_at, local_now, parse_pulse, set_chunked_list, set_reciprocal_pair,
    CHUNK_SEPARATOR,
};
use crate::error::Result;
use crate::property::Property;
use crate::registry::{read_property, read_property_text, PropertyAccess, PropertyRegistry};
use crate::store::{KeyValueStore, SetOutcome};
use crate::value::{decode, Value};

/// Chunk prefix of the antenna name list.
pub const ANTENNA_NAMES_PREFIX: &str = "ANTNMS";

/// Chunk prefix of the antenna flag list.
pub const ANTENNA_FLAGS_PREFIX: &str = "ANTFLG";

/// Heartbeat key written by hashpipe's status thread.
pub const HASHPIPE_PULSE_KEY: &str = "DAQPULSE";

/// `ctime`-style format of [`HASHPIPE_PULSE_KEY`], e.g. `Sat Mar  9 07:05:00 2024`.
pub const HASHPIPE_PULSE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Maximum heartbeat age of a live hashpipe instance.
pub const HASHPIPE_ALIVE_THRESHOLD: Duration = Duration::from_secs(3);

/// Longest `PROJID`/`BACKEND` text returned by the properties.
pub const IDENTIFIER_MAX_CHARS: usize = 23;

const PLAIN_KEYS: &[(&str, &str)] = &[
    ("nof_pols", "NPOL"),
    ("nof_bits", "NBITS"),
    ("nof_beams", "NBEAM"),
    ("nof_antennas", "NANTS"),
    ("nof_channels", "NCHAN"),
    ("observation_nof_channels", "OBSNCHAN"),
    ("observation_frequency", "OBSFREQ"),
    ("observation_bandwidth", "OBSBW"),
    ("source", "SRC_NAME"),
    ("telescope", "TELESCOP"),
    ("directio", "DIRECTIO"),
    ("packet_index", "PKTIDX"),
    ("beam_id", "BEAM_ID"),
    ("sample_datatype", "DATATYPE"),
    ("rightascension_string", "RA_STR"),
    ("declination_string", "DEC_STR"),
    ("stt_mjd_day", "STT_IMJD"),
    ("stt_mjd_seconds", "STT_SMJD"),
    ("observation_id", "OBSID"),
];

/// The built-in Hashpipe property table.
pub fn hashpipe_registry() -> PropertyRegistry {
    let mut table = vec![
        Property::keyed("blocksize", "BLOCSIZE").read_only(),
        Property::keyed("data_directory", "DATADIR").read_only(),
        Property::keyed("observation_stem", "OBSSTEM").read_only(),
        reciprocal("channel_bandwidth", "CHAN_BW", "TBIN"),
        reciprocal("channel_timespan", "TBIN", "CHAN_BW"),
        truncated("project_id", "PROJID"),
        truncated("backend", "BACKEND"),
        Property::derived("observation_stempath")
            .with_getter(|store| {
                async move {
                    let mut parts = Vec::with_capacity(4);
                    for name in ["data_directory", "project_id", "backend", "observation_stem"] {
                        let part = read_property_text(store, name).await?;
                        parts.push(Value::Text(part.unwrap_or_default()));
                    }
                    Ok(Some(Value::List(parts)))
                }
                .boxed()
            })
            .read_only()
            .with_doc("[data_directory, project_id, backend, observation_stem]"),
        chunked("antenna_names", ANTENNA_NAMES_PREFIX, false),
        chunked("antenna_flags", ANTENNA_FLAGS_PREFIX, true),
        Property::keyed("pulse", HASHPIPE_PULSE_KEY)
            .with_getter(|store| {
                async move {
                    match store.get_raw(HASHPIPE_PULSE_KEY).await? {
                        Some(text) if !text.trim().is_empty() => {
                            let pulse =
                                parse_pulse(HASHPIPE_PULSE_KEY, &text, HASHPIPE_PULSE_FORMAT)?;
                            Ok(Some(Value::Time(pulse)))
                        }
                        _ => Ok(None),
                    }
                }
                .boxed()
            })
            .read_only(),
        Property::derived("is_alive")
            .with_getter(|store| {
                async move { alive(store, HASHPIPE_ALIVE_THRESHOLD).await }.boxed()
            })
            .read_only()
            .with_doc("Heartbeat is less than 3 seconds from now."),
    ];
    table.extend(
        PLAIN_KEYS
            .iter()
            .map(|(name, key)| Property::keyed(*name, *key)),
    );
    PropertyRegistry::from_table(table)
}

/// Liveness from the store's `pulse` property. A missing pulse is not alive.
pub(crate) async fn alive(store: &dyn KeyValueStore, threshold: Duration) -> Result<Option<Value>> {
    let alive = match read_property(store, "pulse").await? {
        Some(Value::Time(pulse)) => is_alive_at(pulse, local_now(), threshold),
        _ => false,
    };
    Ok(Some(Value::Bool(alive)))
}

fn reciprocal(name: &str, key: &'static str, partner: &'static str) -> Property {
    Property::keyed(name, key)
        .with_setter(move |store, value| {
            async move { set_reciprocal_pair(store, key, partner, &value).await }.boxed()
        })
        .with_doc(format!("Writing also sets {} to the reciprocal.", partner))
}

/// Identifier read as text and cut to [`IDENTIFIER_MAX_CHARS`] before any
/// other interpretation, so numeric-looking identifiers stay text.
fn truncated(name: &str, key: &'static str) -> Property {
    Property::keyed(name, key).with_getter(move |store| {
        async move {
            Ok(store
                .get_raw(key)
                .await?
                .filter(|raw| !raw.is_empty())
                .map(|raw| Value::Text(raw.chars().take(IDENTIFIER_MAX_CHARS).collect())))
        }
        .boxed()
    })
}

fn chunked(name: &str, prefix: &'static str, decode_items: bool) -> Property {
    Property::derived(name)
        .with_getter(move |store| {
            async move {
                let expected = read_property(store, "nof_antennas")
                    .await?
                    .and_then(|n| n.as_i64())
                    .map(|n| n.max(0) as usize)
                    .unwrap_or(0);
                let items = gather_chunks(store, prefix, expected, CHUNK_SEPARATOR).await?;
                let items = items
                    .into_iter()
                    .map(|item| {
                        if decode_items {
                            decode(Some(item.as_str()), None).unwrap_or(Value::Text(item))
                        } else {
                            Value::Text(item)
                        }
                    })
                    .collect();
                Ok(Some(Value::List(items)))
            }
            .boxed()
        })
        .with_setter(move |store, value| {
            async move { set_chunked_list(store, prefix, &value).await }.boxed()
        })
        .with_doc(format!("Comma-separated list over {}00, {}01, ...", prefix, prefix))
}

fn to_text(value: Option<Value>) -> Option<String> {
    value.map(|value| match value {
        Value::Text(text) => text,
        other => other.to_string(),
    })
}

fn to_f64(value: Option<Value>) -> Option<f64> {
    value.and_then(|value| value.as_f64())
}

fn to_i64(value: Option<Value>) -> Option<i64> {
    value.and_then(|value| value.as_i64())
}

fn to_strings(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items.into_iter().map(|item| item.to_string()).collect(),
        other => to_text(other).into_iter().collect(),
    }
}

/// Typed accessors for the standard Hashpipe properties.
#[async_trait]
pub trait HashpipeStatus: PropertyAccess {
    async fn blocksize(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("blocksize").await?))
    }

    async fn nof_pols(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("nof_pols").await?))
    }

    async fn nof_bits(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("nof_bits").await?))
    }

    async fn nof_beams(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("nof_beams").await?))
    }

    async fn nof_antennas(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("nof_antennas").await?))
    }

    async fn nof_channels(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("nof_channels").await?))
    }

    async fn observation_nof_channels(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("observation_nof_channels").await?))
    }

    async fn observation_frequency(&self) -> Result<Option<f64>> {
        Ok(to_f64(self.property("observation_frequency").await?))
    }

    async fn observation_bandwidth(&self) -> Result<Option<f64>> {
        Ok(to_f64(self.property("observation_bandwidth").await?))
    }

    /// Channel bandwidth in MHz.
    async fn channel_bandwidth(&self) -> Result<Option<f64>> {
        Ok(to_f64(self.property("channel_bandwidth").await?))
    }

    /// Sets `CHAN_BW` and `TBIN` together.
    async fn set_channel_bandwidth(&self, bandwidth: f64) -> Result<SetOutcome> {
        self.set_property("channel_bandwidth", Value::Float(bandwidth))
            .await
    }

    /// Sample time span in seconds.
    async fn channel_timespan(&self) -> Result<Option<f64>> {
        Ok(to_f64(self.property("channel_timespan").await?))
    }

    /// Sets `TBIN` and `CHAN_BW` together.
    async fn set_channel_timespan(&self, timespan: f64) -> Result<SetOutcome> {
        self.set_property("channel_timespan", Value::Float(timespan))
            .await
    }

    async fn source(&self) -> Result<Option<String>> {
        self.property_text("source").await
    }

    async fn set_source(&self, source: &str) -> Result<SetOutcome> {
        self.set_property("source", Value::from(source)).await
    }

    async fn telescope(&self) -> Result<Option<String>> {
        self.property_text("telescope").await
    }

    async fn data_directory(&self) -> Result<Option<String>> {
        self.property_text("data_directory").await
    }

    async fn project_id(&self) -> Result<Option<String>> {
        self.property_text("project_id").await
    }

    async fn backend(&self) -> Result<Option<String>> {
        self.property_text("backend").await
    }

    async fn observation_stem(&self) -> Result<Option<String>> {
        self.property_text("observation_stem").await
    }

    /// The stem path components joined into a path. Empty components are
    /// skipped.
    async fn observation_stempath(&self) -> Result<PathBuf> {
        Ok(to_strings(self.property("observation_stempath").await?)
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect())
    }

    async fn directio(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("directio").await?))
    }

    async fn packet_index(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("packet_index").await?))
    }

    async fn beam_id(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("beam_id").await?))
    }

    async fn sample_datatype(&self) -> Result<Option<String>> {
        self.property_text("sample_datatype").await
    }

    async fn rightascension_string(&self) -> Result<Option<String>> {
        self.property_text("rightascension_string").await
    }

    async fn declination_string(&self) -> Result<Option<String>> {
        self.property_text("declination_string").await
    }

    async fn stt_mjd_day(&self) -> Result<Option<i64>> {
        Ok(to_i64(self.property("stt_mjd_day").await?))
    }

    async fn stt_mjd_seconds(&self) -> Result<Option<f64>> {
        Ok(to_f64(self.property("stt_mjd_seconds").await?))
    }

    async fn observation_id(&self) -> Result<Option<String>> {
        self.property_text("observation_id").await
    }

    async fn set_observation_id(&self, observation_id: &str) -> Result<SetOutcome> {
        self.set_property("observation_id", Value::from(observation_id))
            .await
    }

    async fn antenna_names(&self) -> Result<Vec<String>> {
        Ok(to_strings(self.property("antenna_names").await?))
    }

    async fn set_antenna_names(&self, names: &[String]) -> Result<SetOutcome> {
        self.set_property("antenna_names", Value::from(names.to_vec()))
            .await
    }

    async fn antenna_flags(&self) -> Result<Vec<Value>> {
        Ok(match self.property("antenna_flags").await? {
            Some(Value::List(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        })
    }

    async fn set_antenna_flags(&self, flags: Vec<Value>) -> Result<SetOutcome> {
        self.set_property("antenna_flags", Value::List(flags)).await
    }

    /// Last heartbeat of the instance.
    async fn pulse(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self.property("pulse").await?.and_then(|v| v.as_time()))
    }

    async fn is_alive(&self) -> Result<bool> {
        Ok(self
            .property("is_alive")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

impl<T: PropertyAccess + ?Sized> HashpipeStatus for T {}
