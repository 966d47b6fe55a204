//! Properties spanning more than one raw key.
//!
//! - reciprocal pairs (`CHAN_BW` and `TBIN`), always written together
//! - lists chunked over numbered keys (`ANTNMS00`, `ANTNMS01`, ...)
//! - liveness derived from a heartbeat timestamp

use chrono::NaiveDateTime;
use std::time::Duration;
use tracing::warn;

use crate::error::{KeyValueError, Result};
use crate::store::{KeyValueStore, SetOutcome};
use crate::value::{decode, Value};

/// Maximum characters per chunk, separators included.
pub const CHUNK_CAPACITY: usize = 68;

/// Separator between list items inside a chunk.
pub const CHUNK_SEPARATOR: &str = ",";

/// Interpret a value as a number, accepting numeric text.
pub fn numeric(key: &str, value: &Value) -> Result<f64> {
    if let Some(number) = value.as_f64() {
        return Ok(number);
    }
    match value {
        Value::Text(text) => match decode(Some(text.as_str()), None) {
            Some(Value::Float(number)) => Ok(number),
            _ => Err(KeyValueError::invalid_value(key, format!("'{}' is not a number", text))),
        },
        other => Err(KeyValueError::invalid_value(
            key,
            format!("'{}' is not a number", other),
        )),
    }
}

/// Write `key = value` and `partner = 1 / value` in a single message.
///
/// Zero and non-finite values are rejected before anything is written. The
/// two fields are not updated atomically; a backend failure can leave them
/// inconsistent.
pub async fn set_reciprocal_pair(
    store: &dyn KeyValueStore,
    key: &str,
    partner: &str,
    value: &Value,
) -> Result<SetOutcome> {
    let value = numeric(key, value)?;
    if value == 0.0 || !value.is_finite() {
        return Err(KeyValueError::invalid_value(
            key,
            format!("{} has no finite reciprocal", value),
        ));
    }
    store
        .set_many(&[(key, Value::Float(value)), (partner, Value::Float(1.0 / value))])
        .await
}

/// Raw key of chunk `index`, e.g. `ANTNMS03`.
pub fn chunk_key(prefix: &str, index: usize) -> String {
    format!("{}{:02}", prefix, index)
}

/// Pack list items into numbered chunks of at most [`CHUNK_CAPACITY`]
/// characters.
///
/// An item longer than the capacity still gets a chunk of its own. An empty
/// list produces no chunks.
pub fn generate_chunks<S: AsRef<str>>(
    prefix: &str,
    items: &[S],
    separator: &str,
) -> Vec<(String, String)> {
    let Some((first, rest)) = items.split_first() else {
        return Vec::new();
    };

    let separator_chars = separator.chars().count();
    let mut chunks = Vec::new();
    let mut current = first.as_ref().to_string();
    let mut current_chars = current.chars().count();
    for item in rest {
        let item = item.as_ref();
        let item_chars = item.chars().count();
        if current_chars + separator_chars + item_chars > CHUNK_CAPACITY {
            chunks.push((chunk_key(prefix, chunks.len()), current));
            current = item.to_string();
            current_chars = item_chars;
        } else {
            current.push_str(separator);
            current.push_str(item);
            current_chars += separator_chars + item_chars;
        }
    }
    if !current.is_empty() {
        chunks.push((chunk_key(prefix, chunks.len()), current));
    }
    chunks
}

/// Read numbered chunks until at least `expected` items are collected.
///
/// An `expected` of zero reads exactly one chunk. A missing or empty chunk
/// ends the read early with whatever was collected.
pub async fn gather_chunks(
    store: &dyn KeyValueStore,
    prefix: &str,
    expected: usize,
    separator: &str,
) -> Result<Vec<String>> {
    let expected = expected.max(1);
    let mut items = Vec::new();
    let mut index = 0;

    while items.len() < expected {
        let key = chunk_key(prefix, index);
        match store.get_raw(&key).await? {
            Some(chunk) if !chunk.is_empty() => {
                items.extend(chunk.split(separator).map(str::to_string));
            }
            _ => {
                warn!(
                    store = %store.identity(),
                    %key,
                    collected = items.len(),
                    expected,
                    "chunk sequence ended early"
                );
                break;
            }
        }
        index += 1;
    }
    Ok(items)
}

/// Write a list as chunks. Items are encoded with their `Display` form.
pub async fn set_chunked_list(
    store: &dyn KeyValueStore,
    prefix: &str,
    value: &Value,
) -> Result<SetOutcome> {
    let items: Vec<String> = match value {
        Value::List(items) => items.iter().map(Value::encode).collect(),
        Value::Text(text) => text.split(CHUNK_SEPARATOR).map(str::to_string).collect(),
        other => vec![other.encode()],
    };
    let chunks = generate_chunks(prefix, &items, CHUNK_SEPARATOR);
    let assignments: Vec<(&str, Value)> = chunks
        .iter()
        .map(|(key, chunk)| (key.as_str(), Value::Text(chunk.clone())))
        .collect();
    store.set_many(&assignments).await
}

/// Parse a heartbeat timestamp.
pub fn parse_pulse(key: &str, text: &str, format: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), format).map_err(|e| {
        KeyValueError::invalid_value(key, format!("'{}' does not match '{}': {}", text, format, e))
    })
}

/// True when `pulse` is within `threshold` of `now`, in either direction.
pub fn is_alive_at(pulse: NaiveDateTime, now: NaiveDateTime, threshold: Duration) -> bool {
    let delta = (now - pulse).num_milliseconds().unsigned_abs();
    u128::from(delta) < threshold.as_millis()
}

/// Current local wall-clock time, matching how pipelines stamp heartbeats.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
