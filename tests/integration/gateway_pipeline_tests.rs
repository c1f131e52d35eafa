//! Gateway pipeline: server → ingest queue → processor → backend,
//! with the flash store and retry scheduler closing the loop on
//! backend failures.

use crate::mock_ports::{MockBackend, MockClock, MockConnection, MockWall};

use coldtrace::adapters::storage::LittleFsAdapter;
use coldtrace::config::SystemConfig;
use coldtrace::gateway::ingest::IngestQueue;
use coldtrace::gateway::processor::{BatchProcessor, ProcessOutcome, SilenceWatch};
use coldtrace::gateway::retry::{RetryOutcome, RetryScheduler};
use coldtrace::gateway::server::{GatewayServer, ServedRequest};
use coldtrace::gateway::store::FlashStore;
use coldtrace::reading::Reading;
use coldtrace::wire;

const NOW: u32 = 1_700_000_000;

fn store() -> FlashStore<LittleFsAdapter> {
    FlashStore::new(LittleFsAdapter::new().unwrap(), 20)
}

fn post_request(payload: &[u8]) -> Vec<u8> {
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

fn sample_payload() -> Vec<u8> {
    let readings = vec![
        Reading::ok(1, 1_000, 20.0, 40.0),
        Reading::ok(1, 3_000, 22.0, 50.0),
        Reading::ok(1, 5_000, 24.0, 60.0),
    ];
    wire::encode_batch(6_000, &readings)
}

#[test]
fn request_flows_through_queue_to_backend() {
    let queue = IngestQueue::new();
    let server = GatewayServer::new();
    let clock = MockClock::new();

    let mut conn = MockConnection::new(post_request(&sample_payload()));
    let served = server.handle_connection(&mut conn, &clock, &MockWall(Some(NOW)), &queue);
    assert_eq!(served, ServedRequest::DataAccepted);
    assert_eq!(queue.len(), 1);

    let mut store = store();
    let mut backend = MockBackend::accepting();
    let outcome = BatchProcessor::new().process_next(
        &queue,
        &mut store,
        &mut backend,
        &MockWall(Some(NOW)),
    );

    assert_eq!(outcome, ProcessOutcome::Relayed);
    assert!(queue.is_empty());
    assert_eq!(backend.post_count(), 1);

    // Timestamps were reconstructed before relay: the newest reading
    // was taken 1 s before the batch was sent "now".
    let body: serde_json::Value = serde_json::from_str(&backend.bodies.borrow()[0]).unwrap();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries[2]["SensorTimeStamp"],
        coldtrace::timefmt::format_epoch(NOW - 1)
    );
    assert_eq!(
        entries[0]["SensorTimeStamp"],
        coldtrace::timefmt::format_epoch(NOW - 5)
    );
}

#[test]
fn backend_outage_persists_then_retry_delivers() {
    let queue = IngestQueue::new();
    let server = GatewayServer::new();
    let clock = MockClock::new();
    let wall = MockWall(Some(NOW));

    let mut conn = MockConnection::new(post_request(&sample_payload()));
    server.handle_connection(&mut conn, &clock, &wall, &queue);

    let mut store = store();
    // Backend refuses the live relay and the first stored retry.
    let mut backend = MockBackend::refusing(2);

    let outcome = BatchProcessor::new().process_next(&queue, &mut store, &mut backend, &wall);
    let ProcessOutcome::Persisted(index) = outcome else {
        panic!("expected Persisted, got {outcome:?}");
    };
    assert_eq!(store.batch_indices(), vec![index]);

    let mut retry = RetryScheduler::new(&SystemConfig::default());

    clock.set(10_000);
    assert_eq!(
        retry.tick(&clock, &mut store, &mut backend, &wall),
        RetryOutcome::Failed(index)
    );

    clock.set(20_000);
    assert_eq!(
        retry.tick(&clock, &mut store, &mut backend, &wall),
        RetryOutcome::Resent(index)
    );
    assert!(store.batch_indices().is_empty(), "delivered file removed");

    // Status log shows the failed live send and the final success.
    let statuses = store.read_send_statuses();
    assert!(!statuses.first().unwrap().success);
    assert!(statuses.last().unwrap().success);

    // The retried body is identical data to the live attempt.
    let bodies = backend.bodies.borrow();
    assert_eq!(bodies[1], bodies[2]);
}

#[test]
fn queue_backpressure_rejects_16th_upload() {
    let queue = IngestQueue::new();
    let server = GatewayServer::new();
    let clock = MockClock::new();
    let wall = MockWall(Some(NOW));

    for _ in 0..15 {
        let mut conn = MockConnection::new(post_request(&sample_payload()));
        assert_eq!(
            server.handle_connection(&mut conn, &clock, &wall, &queue),
            ServedRequest::DataAccepted
        );
    }

    let mut conn = MockConnection::new(post_request(&sample_payload()));
    let served = server.handle_connection(&mut conn, &clock, &wall, &queue);
    assert_eq!(served, ServedRequest::QueueFull);
    assert!(conn.reply_text().starts_with("HTTP/1.1 503"));
    assert_eq!(queue.len(), 15);
}

#[test]
fn malformed_upload_never_stalls_the_pipeline() {
    let queue = IngestQueue::new();
    let server = GatewayServer::new();
    let clock = MockClock::new();
    let wall = MockWall(Some(NOW));

    // A payload with a trailing partial record passes HTTP framing
    // (Content-Length matches) but fails batch decoding.
    let mut bad = sample_payload();
    bad.truncate(bad.len() - 4);
    let mut conn = MockConnection::new(post_request(&bad));
    assert_eq!(
        server.handle_connection(&mut conn, &clock, &wall, &queue),
        ServedRequest::DataAccepted
    );

    let mut conn = MockConnection::new(post_request(&sample_payload()));
    server.handle_connection(&mut conn, &clock, &wall, &queue);

    let mut store = store();
    let mut backend = MockBackend::accepting();
    let mut proc = BatchProcessor::new();

    assert_eq!(
        proc.process_next(&queue, &mut store, &mut backend, &wall),
        ProcessOutcome::Discarded
    );
    assert_eq!(
        proc.process_next(&queue, &mut store, &mut backend, &wall),
        ProcessOutcome::Relayed
    );
}

#[test]
fn silence_alarm_lands_in_error_log() {
    let mut store = store();
    let wall = MockWall(Some(NOW));
    let mut silence = SilenceWatch::new(60_000, 0);

    assert!(!silence.tick(59_000));
    if silence.tick(61_000) {
        store.log_error("No data received from sensor node", &wall);
    }

    let errors = store.read_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("No data received"));
}

#[test]
fn degraded_flash_still_relays() {
    // Mount failure at boot: the store exists but every filesystem
    // operation fails. Live relaying must keep working.
    let queue = IngestQueue::new();
    let server = GatewayServer::new();
    let clock = MockClock::new();
    let wall = MockWall(Some(NOW));

    let mut conn = MockConnection::new(post_request(&sample_payload()));
    server.handle_connection(&mut conn, &clock, &wall, &queue);

    let mut store = FlashStore::new(LittleFsAdapter::unavailable(), 20);
    let mut backend = MockBackend::accepting();
    let outcome = BatchProcessor::new().process_next(&queue, &mut store, &mut backend, &wall);
    assert_eq!(outcome, ProcessOutcome::Relayed);

    // And a refused batch is dropped (with a diagnostic), not fatal.
    let mut conn = MockConnection::new(post_request(&sample_payload()));
    server.handle_connection(&mut conn, &clock, &wall, &queue);
    let mut backend = MockBackend::refusing(1);
    let outcome = BatchProcessor::new().process_next(&queue, &mut store, &mut backend, &wall);
    assert_eq!(outcome, ProcessOutcome::Discarded);
}
