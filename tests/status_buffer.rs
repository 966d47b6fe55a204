//! End-to-end behaviour of stores against an in-process backend.
//!
//! Hashpipe writes are published set-commands, so these tests run a
//! [`SetCommandResponder`] in place of the pipeline that would normally
//! apply them.

use async_trait::async_trait;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hashpipe_keyvalues::derived::{gather_chunks, generate_chunks, CHUNK_CAPACITY};
use hashpipe_keyvalues::prelude::*;
use hashpipe_keyvalues::value::decode;
use hashpipe_keyvalues::{
    broadcast, HostnamePattern, Property, SetCommandResponder, StaticResolver, Subscription,
};

const INSTANCE_HASH: &str = "hashpipe://cosmic-gpu-0/1/status";

struct Harness {
    backend: MemoryBackend,
    store: RemoteStore,
    _responder: SetCommandResponder,
}

fn harness() -> Harness {
    let backend = MemoryBackend::new();
    let shared: Arc<dyn StatusBackend> = Arc::new(backend.clone());
    let identity = StoreIdentity::new("cosmic-gpu-0", "1");
    let responder =
        SetCommandResponder::spawn(shared.clone(), Schema::Hashpipe, identity.clone()).unwrap();
    Harness {
        backend,
        store: RemoteStore::new(Schema::Hashpipe, identity, shared),
        _responder: responder,
    }
}

/// Poll a property until it reads `expected` or a second passes.
async fn wait_for_property(store: &RemoteStore, name: &str, expected: &Value) -> Option<Value> {
    let mut last = None;
    for _ in 0..100 {
        last = store.property(name).await.unwrap();
        if last.as_ref() == Some(expected) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    last
}

#[tokio::test]
async fn test_property_round_trip() {
    let h = harness();

    for (name, value) in [
        ("source", Value::from("3C286")),
        ("observation_id", Value::from("obs-20240309")),
        ("nof_pols", Value::Integer(2)),
        ("observation_frequency", Value::Float(1420.405)),
    ] {
        h.store.set_property(name, value.clone()).await.unwrap();
        assert_eq!(
            wait_for_property(&h.store, name, &value).await,
            Some(value),
            "{}",
            name
        );
    }
}

#[test]
fn test_decode_fallback() {
    for fallback in [None, Some(Value::from("x")), Some(Value::Float(1.5))] {
        assert_eq!(decode(Some(""), fallback.clone()), fallback);
        assert_eq!(decode(None, fallback.clone()), fallback);
    }
}

#[tokio::test]
async fn test_numeric_inference() {
    assert_eq!(decode(Some("3.1414"), None), Some(Value::Float(3.1414)));
    assert_eq!(decode(Some("abc"), None), Some(Value::from("abc")));

    let h = harness();
    h.backend
        .hash_set(
            INSTANCE_HASH,
            &[
                ("OBSFREQ".to_string(), "3.1414".to_string()),
                ("TELESCOP".to_string(), "abc".to_string()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(
        h.store.get("OBSFREQ", None).await.unwrap(),
        Some(Value::Float(3.1414))
    );
    assert_eq!(
        h.store.get("TELESCOP", None).await.unwrap(),
        Some(Value::from("abc"))
    );
}

#[tokio::test]
async fn test_numeric_looking_text_round_trip() {
    let h = harness();
    h.store.set_observation_id("12345").await.unwrap();
    h.store.set_source("1937").await.unwrap();
    wait_for_property(&h.store, "source", &Value::Float(1937.0)).await;

    assert_eq!(
        h.store.observation_id().await.unwrap().as_deref(),
        Some("12345")
    );
    assert_eq!(h.store.source().await.unwrap().as_deref(), Some("1937"));
    assert_eq!(
        h.backend.hash_get(INSTANCE_HASH, "OBSID").await.unwrap().as_deref(),
        Some("12345")
    );
}

#[tokio::test]
async fn test_paired_invariant() {
    let h = harness();

    for bandwidth in [0.5, -0.25, 1.0 / 3.0, 187.5] {
        h.store.set_channel_bandwidth(bandwidth).await.unwrap();
        wait_for_property(&h.store, "channel_bandwidth", &Value::Float(bandwidth)).await;

        let bandwidth = h.store.channel_bandwidth().await.unwrap().unwrap();
        let timespan = h.store.channel_timespan().await.unwrap().unwrap();
        assert!((bandwidth * timespan - 1.0).abs() < 1e-9, "{} * {}", bandwidth, timespan);
    }
}

#[tokio::test]
async fn test_paired_rejects_zero() {
    let h = harness();
    let mut listener = h.backend.subscribe("hashpipe://cosmic-gpu-0/1/set").unwrap();

    let err = h.store.set_channel_bandwidth(0.0).await.unwrap_err();
    assert!(matches!(err, KeyValueError::InvalidValue { .. }));

    // Nothing was published.
    h.store.set("MARKER", Value::Integer(1)).await.unwrap();
    assert_eq!(listener.recv().await.unwrap().payload, "MARKER=1");
}

#[tokio::test]
async fn test_antenna_names_chunking() {
    let h = harness();
    let names: Vec<String> = (1..=28).map(|i| format!("ea{:02}", i)).collect();
    assert!(names.join(",").len() > CHUNK_CAPACITY);

    h.store.set("NANTS", Value::from(names.len())).await.unwrap();
    h.store.set_antenna_names(&names).await.unwrap();
    wait_for_property(&h.store, "nof_antennas", &Value::from(names.len())).await;

    let mut gathered = Vec::new();
    for _ in 0..100 {
        gathered = h.store.antenna_names().await.unwrap();
        if gathered.len() == names.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(gathered, names);

    let raw = gather_chunks(&h.store, "ANTNMS", names.len(), ",").await.unwrap();
    assert_eq!(raw, names);
}

#[test]
fn test_single_name_single_chunk() {
    let chunks = generate_chunks("ANTNMS", &["ea01"], ",");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].0, "ANTNMS00");
}

#[tokio::test]
async fn test_unknown_key_returns_fallback() {
    let h = harness();
    assert_eq!(h.store.get("NOT_A_KEY", None).await.unwrap(), None);
    assert_eq!(
        h.store
            .get("NOT_A_KEY", Some(Value::from("fallback")))
            .await
            .unwrap(),
        Some(Value::from("fallback"))
    );
}

#[tokio::test]
async fn test_registry_override_read_only() {
    let mut h = harness();
    h.store
        .extend_properties([Property::derived("bogus")
            .with_getter(|_| async { Ok(Some(Value::Bool(true))) }.boxed())
            .read_only()])
        .unwrap();

    assert_eq!(h.store.property("bogus").await.unwrap(), Some(Value::Bool(true)));
    let err = h
        .store
        .set_property("bogus", Value::Bool(false))
        .await
        .unwrap_err();
    assert!(matches!(err, KeyValueError::ReadOnly(_)));

    // The override stays with this store.
    let other = RemoteStore::hashpipe("cosmic-gpu-0", 2, Arc::new(h.backend.clone()));
    assert!(matches!(
        other.property("bogus").await,
        Err(KeyValueError::UnknownProperty(_))
    ));
}

/// Backend that counts field reads.
struct CountingBackend {
    inner: MemoryBackend,
    reads: AtomicU32,
}

#[async_trait]
impl StatusBackend for CountingBackend {
    async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.hash_get(hash, field).await
    }

    async fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>> {
        self.inner.hash_get_all(hash).await
    }

    async fn hash_set(&self, hash: &str, fields: &[(String, String)]) -> Result<u64> {
        self.inner.hash_set(hash, fields).await
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        self.inner.publish(channel, message).await
    }

    fn subscribe(&self, channel: &str) -> Result<Subscription> {
        self.inner.subscribe(channel)
    }
}

#[tokio::test]
async fn test_retry_exhaustion() {
    let backend = Arc::new(CountingBackend {
        inner: MemoryBackend::new(),
        reads: AtomicU32::new(0),
    });
    let store = RemoteStore::hashpipe("cosmic-gpu-0", 1, backend.clone());

    let err = store
        .get_or_retry("MISSING", 3, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeyValueError::ValueUnavailable { attempts: 3, ref keys } if keys == &["MISSING".to_string()]
    ));
    assert_eq!(backend.reads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_succeeds_when_value_arrives() {
    let backend = Arc::new(CountingBackend {
        inner: MemoryBackend::new(),
        reads: AtomicU32::new(0),
    });
    backend
        .inner
        .hash_set(INSTANCE_HASH, &[("SRC_NAME".to_string(), "3C286".to_string())])
        .await
        .unwrap();
    let store = RemoteStore::hashpipe("cosmic-gpu-0", 1, backend.clone());

    let value = store
        .get_or_retry_with("SRC_NAME", &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(value, Value::from("3C286"));
    assert_eq!(backend.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_addressing() {
    let mut resolver = StaticResolver::default();
    resolver.insert("10.0.0.1", "cosmic-gpu-0-100g-1");

    let store = RemoteStore::instance_at(
        "10.0.0.1",
        Schema::Hashpipe,
        Arc::new(MemoryBackend::new()),
        &AddressingConfig::default(),
        Some(&resolver),
    )
    .await
    .unwrap();
    assert_eq!(store.identity().hostname(), "cosmic-gpu-0");
    assert_eq!(store.identity().instance_id(), "1");
}

#[tokio::test]
async fn test_addressing_short_hostname_is_greedy() {
    let pattern = HostnamePattern::new(hashpipe_keyvalues::DEFAULT_HOSTNAME_PATTERN).unwrap();
    let identity = pattern.identity("cosmic-gpu-0g-1").unwrap();
    assert_eq!(identity, StoreIdentity::new("cosmic-gpu", "1"));
}

#[tokio::test]
async fn test_addressing_dns_table_wins() {
    let config = ClientConfig::from_json_str(
        r#"{"addressing": {"dns": {"10.0.0.7": "cosmic-gpu-3-40g-0"}}}"#,
    )
    .unwrap();

    let store = RemoteStore::instance_at(
        "10.0.0.7",
        config.schema,
        Arc::new(MemoryBackend::new()),
        &config.addressing,
        Some(&StaticResolver::default()),
    )
    .await
    .unwrap();
    assert_eq!(store.identity(), &StoreIdentity::new("cosmic-gpu-3", "0"));
}

#[tokio::test]
async fn test_broadcast_reaches_every_instance() {
    let backend = MemoryBackend::new();
    let shared: Arc<dyn StatusBackend> = Arc::new(backend.clone());
    let responders: Vec<SetCommandResponder> = (0..3)
        .map(|i| {
            SetCommandResponder::spawn(
                shared.clone(),
                Schema::Hashpipe,
                StoreIdentity::new("cosmic-gpu-0", i),
            )
            .unwrap()
        })
        .collect();

    let outcome = broadcast(shared.as_ref(), Schema::Hashpipe, &[("DIRECTIO", Value::Integer(1))])
        .await
        .unwrap();
    assert_eq!(outcome.ack, responders.len() as u64);

    for i in 0..3 {
        let store = RemoteStore::hashpipe("cosmic-gpu-0", i, shared.clone());
        assert_eq!(
            wait_for_property(&store, "directio", &Value::Integer(1)).await,
            Some(Value::Integer(1))
        );
    }
}

#[tokio::test]
async fn test_snapshot_matches_store() {
    let h = harness();
    h.store.set("SRC_NAME", Value::from("3C286")).await.unwrap();
    wait_for_property(&h.store, "source", &Value::from("3C286")).await;

    let snapshot = h.store.snapshot().await.unwrap();
    assert_eq!(
        snapshot.get_all(None).await.unwrap(),
        h.store.get_all(None).await.unwrap()
    );
    assert_eq!(snapshot.source().await.unwrap().as_deref(), Some("3C286"));
}

#[tokio::test]
async fn test_pypeline_store_writes_hash() {
    use hashpipe_keyvalues::PypelineStatus;

    let backend = SqliteBackend::in_memory().await.unwrap();
    let store = RemoteStore::pypeline("cosmic-gpu-0", 0, Arc::new(backend));

    store
        .set_stages(&["hpdaq".to_string(), "fil".to_string()])
        .await
        .unwrap();
    assert_eq!(PypelineStatus::stages(&store).await.unwrap(), vec!["hpdaq", "fil"]);
    assert!(!PypelineStatus::is_alive(&store).await.unwrap());
}
