// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end checks of the publisher -> connector -> subscriber pipeline.
//!
//! Separate `FileConnector` instances on one path stand in for the owning
//! process and a worker process.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use remote_config_pubsub::{
    ConfigMetadata, FileConnector, PollInterval, PubSub, PubSubBinding, PubSubMergeFirst,
    PubSubRegistry, RawConfig, RemoteConfigCallback, TargetUpdate,
};
use serde_json::{json, Value};

type Received = Arc<Mutex<Vec<(Option<ConfigMetadata>, Value)>>>;

fn recording_callback() -> (Received, Arc<dyn RemoteConfigCallback>) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let callback: Arc<dyn RemoteConfigCallback> =
        Arc::new(move |metadata: Option<&ConfigMetadata>, config: &RawConfig| {
            sink.lock()
                .expect("lock")
                .push((metadata.cloned(), config.clone()));
        });
    (received, callback)
}

fn noop_callback() -> Arc<dyn RemoteConfigCallback> {
    Arc::new(|_: Option<&ConfigMetadata>, _: &RawConfig| {})
}

fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn worker_process_receives_payload_published_by_owner() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("live_debugging.json");

    let owner = PubSub::new(
        "DI-owner",
        Arc::new(FileConnector::new(&path)),
        noop_callback(),
        PollInterval::default(),
    );
    let (received, callback) = recording_callback();
    let worker = PubSub::new(
        "DI-worker",
        Arc::new(FileConnector::new(&path)),
        callback,
        PollInterval::new(Duration::from_millis(5)),
    );
    worker.start_subscriber().expect("start");

    let metadata = ConfigMetadata::new("probe-cfg", "LIVE_DEBUGGING", 1);
    owner
        .publish(&metadata, json!({"id": "p1", "type": "LOG_PROBE"}))
        .expect("publish");

    assert!(wait_for(|| !received.lock().expect("lock").is_empty()));
    worker.stop();

    let received = received.lock().expect("lock");
    assert!(received
        .iter()
        .all(|(meta, config)| meta.as_ref() == Some(&metadata)
            && *config == json!({"id": "p1", "type": "LOG_PROBE"})));
}

#[test]
fn later_writes_replace_earlier_ones() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("slot.json");
    let (received, callback) = recording_callback();
    let pubsub = PubSub::new(
        "DI",
        Arc::new(FileConnector::new(&path)),
        callback,
        PollInterval::default(),
    );

    let first = ConfigMetadata::new("cfg", "LIVE_DEBUGGING", 1);
    let second = ConfigMetadata::new("cfg", "LIVE_DEBUGGING", 2);
    pubsub.publish(&first, json!({"v": 1})).expect("publish");
    pubsub.publish(&second, json!({"v": 2})).expect("publish");
    assert!(pubsub.poll_data().expect("poll"));

    let received = received.lock().expect("lock");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0.as_ref(), Some(&second));
    assert_eq!(received[0].1, json!({"v": 2}));
}

#[test]
fn restarted_worker_uses_updated_interval() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("slot.json");
    let (received, callback) = recording_callback();
    let interval = PollInterval::new(Duration::from_secs(3600));
    let pubsub = PubSub::new(
        "DI",
        Arc::new(FileConnector::new(&path)),
        callback,
        interval.clone(),
    );
    pubsub
        .publish(&ConfigMetadata::new("cfg", "LIVE_DEBUGGING", 1), json!({}))
        .expect("publish");

    // First poll happens right away, then the worker sleeps for an hour.
    pubsub.start_subscriber().expect("start");
    assert!(wait_for(|| received.lock().expect("lock").len() == 1));

    // The new interval is only picked up after the current sleep, so restart
    // the loop once and check that polls now come quickly.
    interval.set(Duration::from_millis(5));
    pubsub.restart_subscriber().expect("restart");
    assert!(wait_for(|| received.lock().expect("lock").len() >= 4));
    pubsub.stop();
}

#[test]
fn registry_routes_products_through_merge_first_binding() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("asm.json");
    let (received, callback) = recording_callback();
    let asm = Arc::new(PubSubMergeFirst::new(
        "ASM",
        Arc::new(FileConnector::new(&path)),
        None,
        callback,
        PollInterval::default(),
    ));

    let registry = PubSubRegistry::new();
    registry.register("ASM_DATA", asm.clone());
    registry.register("ASM", asm.clone());

    registry
        .dispatch(
            "ASM_DATA",
            vec![
                TargetUpdate {
                    target: "datadog/2/ASM_DATA/blocked_ips/config".into(),
                    metadata: ConfigMetadata::new("blocked_ips", "ASM_DATA", 1),
                    config: json!({"rules_data": [{"id": "blocked_ips"}]}),
                },
                TargetUpdate {
                    target: "datadog/2/ASM_DATA/blocked_users/config".into(),
                    metadata: ConfigMetadata::new("blocked_users", "ASM_DATA", 1),
                    config: json!({"rules_data": [{"id": "blocked_users"}]}),
                },
            ],
        )
        .expect("dispatch");
    registry
        .dispatch(
            "ASM",
            vec![TargetUpdate {
                target: "datadog/2/ASM/exclusions/config".into(),
                metadata: ConfigMetadata::new("exclusions", "ASM", 3),
                config: json!({"exclusions": [{"id": "e1"}]}),
            }],
        )
        .expect("dispatch");
    assert!(asm.poll_data().expect("poll"));

    let received = received.lock().expect("lock");
    assert_eq!(received.len(), 1);
    assert!(received[0].0.is_none());
    assert_eq!(
        received[0].1,
        json!({
            "exclusions": [{"id": "e1"}],
            "rules_data": [{"id": "blocked_ips"}, {"id": "blocked_users"}],
        })
    );
}

#[cfg(unix)]
#[test]
fn shared_memory_binding_delivers_through_its_worker() {
    use remote_config_pubsub::SharedMemoryConnector;

    let (received, callback) = recording_callback();
    let pubsub = PubSub::new(
        "DI-shm",
        Arc::new(SharedMemoryConnector::new().expect("mmap")),
        callback,
        PollInterval::new(Duration::from_millis(5)),
    );
    pubsub.start_subscriber().expect("start");

    let metadata = ConfigMetadata::new("cfg-1", "LIVE_DEBUGGING", 1);
    pubsub.publish(&metadata, json!({"id": "p1"})).expect("publish");
    assert!(wait_for(|| !received.lock().expect("lock").is_empty()));
    pubsub.stop();

    let received = received.lock().expect("lock");
    assert_eq!(received[0], (Some(metadata), json!({"id": "p1"})));
}
