//! Whole-pipeline scenarios: the sensor node's real wire output is fed
//! into the gateway's real request handler, and the batch travels
//! through the queue and processor to the backend (or to flash and the
//! retry loop when the backend is down).

use crate::mock_ports::{
    MemSlotStorage, MockBackend, MockClock, MockConnection, MockLink, MockWall,
    ScriptedGatewaySocket,
};

use coldtrace::adapters::storage::LittleFsAdapter;
use coldtrace::config::SystemConfig;
use coldtrace::gateway::ingest::IngestQueue;
use coldtrace::gateway::processor::{BatchProcessor, ProcessOutcome};
use coldtrace::gateway::retry::{RetryOutcome, RetryScheduler};
use coldtrace::gateway::server::{GatewayServer, ServedRequest};
use coldtrace::gateway::store::FlashStore;
use coldtrace::sensor::mock::MockSensor;
use coldtrace::sensor::node::SensorNode;
use coldtrace::sensor::uplink::SendOutcome;
use coldtrace::timefmt;

const NOW: u32 = 1_700_000_000;

/// Drive the sensor node through one full batch window and return the
/// wire payload it posted.
fn sensor_window_payload(clock: &MockClock) -> Vec<u8> {
    let config = SystemConfig::default();
    let mut storage = MemSlotStorage::new();
    let mut node = SensorNode::new(config.clone(), &storage);
    let mut sensor = MockSensor::reliable(99);
    let mut link = MockLink::up();
    let mut socket = ScriptedGatewaySocket::new(NOW);

    let mut outcome = None;
    let ticks = config.batch_window_ms / config.sample_interval_ms;
    for i in 0..=ticks {
        clock.set(i * config.sample_interval_ms);
        outcome = node.tick(clock, &mut sensor, &mut link, &mut socket, &mut storage);
    }
    assert_eq!(outcome, Some(SendOutcome::Sent));

    let payloads = socket.posted_payloads();
    assert_eq!(payloads.len(), 1);
    payloads.into_iter().next().unwrap()
}

fn http_post(payload: &[u8]) -> Vec<u8> {
    let mut req = format!(
        "POST /data HTTP/1.1\r\nHost: coldtrace-gateway\r\n\
         Content-Type: application/octet-stream\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    req.extend_from_slice(payload);
    req
}

#[test]
fn sensor_batch_reaches_backend_with_absolute_timestamps() {
    let clock = MockClock::new();
    let payload = sensor_window_payload(&clock);

    // Gateway side: the exact bytes the sensor sent, over HTTP.
    let queue = IngestQueue::new();
    let server = GatewayServer::new();
    let wall = MockWall(Some(NOW));
    let mut conn = MockConnection::new(http_post(&payload));
    assert_eq!(
        server.handle_connection(&mut conn, &clock, &wall, &queue),
        ServedRequest::DataAccepted
    );

    let mut store = FlashStore::new(LittleFsAdapter::new().unwrap(), 20);
    let mut backend = MockBackend::accepting();
    let outcome = BatchProcessor::new().process_next(&queue, &mut store, &mut backend, &wall);
    assert_eq!(outcome, ProcessOutcome::Relayed);

    let body: serde_json::Value = serde_json::from_str(&backend.bodies.borrow()[0]).unwrap();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 16);

    // The sensor sampled every 2 s and sent immediately after the last
    // sample; reconstruction pins the newest reading at "now" and walks
    // the rest backward.
    assert_eq!(entries[15]["SensorTimeStamp"], timefmt::format_epoch(NOW));
    assert_eq!(entries[0]["SensorTimeStamp"], timefmt::format_epoch(NOW - 30));
    for entry in entries {
        let t = entry["Temperature"].as_f64().unwrap();
        assert!((22.0..28.0).contains(&t));
    }
}

#[test]
fn backend_outage_end_to_end_recovers_via_flash() {
    let clock = MockClock::new();
    let payload = sensor_window_payload(&clock);

    let queue = IngestQueue::new();
    let server = GatewayServer::new();
    let wall = MockWall(Some(NOW));
    let mut conn = MockConnection::new(http_post(&payload));
    server.handle_connection(&mut conn, &clock, &wall, &queue);

    let mut store = FlashStore::new(LittleFsAdapter::new().unwrap(), 20);
    let mut backend = MockBackend::refusing(1);
    let outcome = BatchProcessor::new().process_next(&queue, &mut store, &mut backend, &wall);
    assert!(matches!(outcome, ProcessOutcome::Persisted(_)));

    // The batch waits on flash until the backend comes back.
    let mut retry = RetryScheduler::new(&SystemConfig::default());
    clock.set(100_000);
    let outcome = retry.tick(&clock, &mut store, &mut backend, &wall);
    assert!(matches!(outcome, RetryOutcome::Resent(_)));
    assert!(store.batch_indices().is_empty());

    // Same readings in the final delivery as in the refused one.
    let bodies = backend.bodies.borrow();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
}
