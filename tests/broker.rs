//! End-to-end broker tests over the command/handle surface
//!
//! These drive the broker exactly the way socket tasks and REST routes do:
//! register connections, push frames, and observe what lands on the
//! per-connection outbound channels and in the key-value backend.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleet_relay::MonitorSnapshot;
use fleet_relay::broker::messages::{AUTH_ACK, InboundFrame, OutboundFrame, POLICY_VIOLATION, Role};
use fleet_relay::broker::{BrokerError, BrokerHandle, BrokerOptions};
use fleet_relay::config::NotifierConfig;
use fleet_relay::notify::Notifier;
use fleet_relay::storage::{KvBackend, MemoryBackend};

const SECRET: &str = "relay-secret";

fn options() -> BrokerOptions {
    BrokerOptions {
        secret: SECRET.to_string(),
        max_hosts: 8,
        sweep_interval: Duration::from_secs(3600),
        stale_after_secs: 60,
        retention_secs: 300,
    }
}

fn spawn_broker(options: BrokerOptions, backend: Arc<MemoryBackend>) -> BrokerHandle {
    BrokerHandle::spawn(options, backend, Notifier::new(None))
}

fn snapshot(name: &str, observed_at: i64) -> MonitorSnapshot {
    MonitorSnapshot {
        name: name.to_string(),
        observed_at,
        ..Default::default()
    }
}

fn gzip_json(snapshot: &MonitorSnapshot) -> Vec<u8> {
    let json = serde_json::to_vec(snapshot).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).unwrap();
    encoder.finish().unwrap()
}

async fn recv(rx: &mut mpsc::Receiver<OutboundFrame>) -> OutboundFrame {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for outbound frame")
        .expect("outbound channel closed")
}

/// Authenticate a fresh producer connection, asserting exactly one ack
async fn connect_producer(broker: &BrokerHandle) -> (u64, mpsc::Receiver<OutboundFrame>) {
    let id = broker.allocate_connection_id();
    let mut rx = broker.connect(id, Role::Producer).await;

    broker
        .inbound(id, InboundFrame::Text(SECRET.to_string()))
        .await;

    assert_matches!(recv(&mut rx).await, OutboundFrame::Text(text) if text == AUTH_ACK);
    (id, rx)
}

#[tokio::test]
async fn wrong_secret_closes_with_policy_violation() {
    let broker = spawn_broker(options(), Arc::new(MemoryBackend::new()));

    let id = broker.allocate_connection_id();
    let mut rx = broker.connect(id, Role::Producer).await;

    broker
        .inbound(id, InboundFrame::Text("not the secret".to_string()))
        .await;

    assert_matches!(
        recv(&mut rx).await,
        OutboundFrame::Close { code, .. } if code == POLICY_VIOLATION
    );

    // The connection is gone; a late correct secret is ignored
    broker
        .inbound(id, InboundFrame::Text(SECRET.to_string()))
        .await;
    let stats = broker.stats().await.unwrap();
    assert_eq!(stats.producers, 0);
}

#[tokio::test]
async fn correct_secret_yields_exactly_one_ack() {
    let broker = spawn_broker(options(), Arc::new(MemoryBackend::new()));
    let (id, mut rx) = connect_producer(&broker).await;

    // An authenticated producer frame must not produce another ack
    broker
        .inbound(id, InboundFrame::Binary(gzip_json(&snapshot("HK1", now()))))
        .await;
    let _ = broker.fetch_all().await; // barrier: the ingest has been processed

    assert!(rx.try_recv().is_err(), "unexpected extra frame to producer");
}

#[tokio::test]
async fn ingest_pushes_framed_payload_to_all_consumers() {
    let broker = spawn_broker(options(), Arc::new(MemoryBackend::new()));
    let (producer, _prx) = connect_producer(&broker).await;

    let viewer_a = broker.allocate_connection_id();
    let mut rx_a = broker.connect(viewer_a, Role::Consumer).await;
    let viewer_b = broker.allocate_connection_id();
    let mut rx_b = broker.connect(viewer_b, Role::Consumer).await;

    broker
        .inbound(producer, InboundFrame::Binary(gzip_json(&snapshot("HK1", now()))))
        .await;

    for rx in [&mut rx_a, &mut rx_b] {
        let frame = recv(rx).await;
        assert_matches!(frame, OutboundFrame::Text(text) => {
            assert!(text.starts_with("data: "), "missing frame prefix: {text}");
            assert!(text.contains("HK1"));
        });
    }
}

#[tokio::test]
async fn consumer_inbound_frame_requests_current_payload() {
    let broker = spawn_broker(options(), Arc::new(MemoryBackend::new()));

    let viewer = broker.allocate_connection_id();
    let mut rx = broker.connect(viewer, Role::Consumer).await;

    broker
        .inbound(viewer, InboundFrame::Text("hi".to_string()))
        .await;

    assert_matches!(recv(&mut rx).await, OutboundFrame::Text(text) if text == "data: []");
}

#[tokio::test]
async fn capacity_rejects_new_hosts_without_dropping_existing() {
    let mut opts = options();
    opts.max_hosts = 2;
    let broker = spawn_broker(opts, Arc::new(MemoryBackend::new()));
    let (producer, _rx) = connect_producer(&broker).await;

    for name in ["HK1", "HK2", "HK3"] {
        broker
            .inbound(producer, InboundFrame::Binary(gzip_json(&snapshot(name, now()))))
            .await;
    }

    let names: Vec<_> = broker.fetch_all().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["HK1", "HK2"]);
}

#[tokio::test]
async fn fetch_all_is_naturally_ordered() {
    let broker = spawn_broker(options(), Arc::new(MemoryBackend::new()));
    let (producer, _rx) = connect_producer(&broker).await;

    for name in ["HK10", "US1", "HK1", "HK2"] {
        broker
            .inbound(producer, InboundFrame::Binary(gzip_json(&snapshot(name, now()))))
            .await;
    }

    let names: Vec<_> = broker.fetch_all().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["HK1", "HK2", "HK10", "US1"]);
}

#[tokio::test]
async fn decode_failure_keeps_connection_open() {
    let broker = spawn_broker(options(), Arc::new(MemoryBackend::new()));
    let (producer, _rx) = connect_producer(&broker).await;

    broker
        .inbound(producer, InboundFrame::Binary(b"garbage".to_vec()))
        .await;

    // Connection survives and later frames still work
    broker
        .inbound(producer, InboundFrame::Binary(gzip_json(&snapshot("HK1", now()))))
        .await;

    assert_eq!(broker.fetch_all().await.len(), 1);
    assert_eq!(broker.stats().await.unwrap().producers, 1);
}

#[tokio::test]
async fn delete_host_semantics() {
    let backend = Arc::new(MemoryBackend::new());
    let mut opts = options();
    opts.sweep_interval = Duration::from_millis(50);
    let broker = spawn_broker(opts, backend.clone());
    let (producer, _rx) = connect_producer(&broker).await;

    assert_matches!(broker.delete_host("ghost").await, Err(BrokerError::NotFound));

    broker
        .inbound(producer, InboundFrame::Binary(gzip_json(&snapshot("HK1", now()))))
        .await;

    // The sweep tick persists the snapshot durably
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.get("monitor:HK1").await.unwrap().is_some());

    broker.delete_host("HK1").await.unwrap();

    assert!(broker.fetch_all().await.is_empty());
    assert_eq!(backend.get("monitor:HK1").await.unwrap(), None);
}

#[tokio::test]
async fn restore_honors_retention_window() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .put_batch(vec![
            (
                "monitor:old".to_string(),
                serde_json::to_string(&snapshot("old", now() - 400)).unwrap(),
            ),
            (
                "monitor:fresh".to_string(),
                serde_json::to_string(&snapshot("fresh", now() - 100)).unwrap(),
            ),
        ])
        .await
        .unwrap();

    let broker = spawn_broker(options(), backend.clone());

    let names: Vec<_> = broker.fetch_all().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["fresh"]);

    // The expired key was removed from durable storage during restore
    assert_eq!(backend.get("monitor:old").await.unwrap(), None);
}

#[tokio::test]
async fn sweep_notifies_offline_transition_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let mut opts = options();
    opts.sweep_interval = Duration::from_millis(50);
    let notifier = Notifier::new(Some(NotifierConfig {
        url: server.uri(),
        mention: None,
    }));
    let broker = BrokerHandle::spawn(opts, backend, notifier);
    let (producer, _rx) = connect_producer(&broker).await;

    // Already stale on arrival: one offline notification, then silence
    broker
        .inbound(
            producer,
            InboundFrame::Binary(gzip_json(&snapshot("HK1", now() - 120))),
        )
        .await;

    // Several sweep intervals pass; the mock's expect(1) verifies debounce
    tokio::time::sleep(Duration::from_millis(400)).await;
}

#[tokio::test]
async fn metadata_roundtrip_is_independent_of_snapshots() {
    let broker = spawn_broker(options(), Arc::new(MemoryBackend::new()));

    let record = fleet_relay::HostMetadataRecord {
        name: "HK1".to_string(),
        due_time: "2026-12-31".to_string(),
        buy_url: "https://example.com/hk1".to_string(),
        seller: "ACME".to_string(),
        price: "$5/mo".to_string(),
    };

    broker.upsert_host_metadata(record.clone()).await.unwrap();

    // Overwrite is idempotent
    broker.upsert_host_metadata(record.clone()).await.unwrap();

    let records = broker.get_host_metadata().await.unwrap();
    assert_eq!(records, vec![record]);

    // Deleting the (absent) monitor entry fails without touching metadata
    assert_matches!(broker.delete_host("HK1").await, Err(BrokerError::NotFound));
    assert_eq!(broker.get_host_metadata().await.unwrap().len(), 1);
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
