//! Sensor node pipeline: sample → classify → batch window → uplink,
//! including the degrade-to-flash-log path, driven tick by tick
//! through `SensorNode` with mock ports.

use crate::mock_ports::{MemSlotStorage, MockClock, MockLink, ScriptedGatewaySocket};

use coldtrace::config::SystemConfig;
use coldtrace::reading::ErrorKind;
use coldtrace::sensor::mock::MockSensor;
use coldtrace::sensor::node::SensorNode;
use coldtrace::sensor::uplink::{ConnectionState, SendOutcome};
use coldtrace::wire;

fn run_until_window(
    node: &mut SensorNode,
    clock: &MockClock,
    sensor: &mut MockSensor,
    link: &mut MockLink,
    socket: &mut ScriptedGatewaySocket,
    storage: &mut MemSlotStorage,
) -> Option<SendOutcome> {
    let config = SystemConfig::default();
    let mut last = None;
    let ticks = config.batch_window_ms / config.sample_interval_ms;
    for i in 0..=ticks {
        clock.set(i * config.sample_interval_ms);
        last = node.tick(clock, sensor, link, socket, storage);
    }
    last
}

#[test]
fn full_window_is_sent_as_one_wire_batch() {
    let clock = MockClock::new();
    let mut storage = MemSlotStorage::new();
    let mut node = SensorNode::new(SystemConfig::default(), &storage);
    let mut sensor = MockSensor::reliable(11);
    let mut link = MockLink::up();
    let mut socket = ScriptedGatewaySocket::new(1_700_000_000);

    let outcome = run_until_window(
        &mut node,
        &clock,
        &mut sensor,
        &mut link,
        &mut socket,
        &mut storage,
    );

    assert_eq!(outcome, Some(SendOutcome::Sent));
    assert_eq!(node.connection_state(), ConnectionState::Connected);
    assert_eq!(node.batch_len(), 0, "batch drained after send");
    assert_eq!(node.flash_log().len(), 0, "no degradation on success");

    // 16 samples at 2 s spacing fill the 30 s window; the wire payload
    // carries all of them behind the 4-byte send-millis header.
    let payloads = socket.posted_payloads();
    assert_eq!(payloads.len(), 1);
    let (send_millis, readings) = wire::decode_batch(&payloads[0]).unwrap();
    assert_eq!(send_millis, 30_000);
    assert_eq!(readings.len(), 16);
    assert_eq!(readings[0].timestamp, 0);
    assert_eq!(readings[15].timestamp, 30_000);
    assert!(readings.iter().all(|r| !r.is_error));
}

#[test]
fn unreachable_gateway_degrades_to_flash_log() {
    let clock = MockClock::new();
    let mut storage = MemSlotStorage::new();
    let config = SystemConfig::default();
    let mut node = SensorNode::new(config.clone(), &storage);
    let mut sensor = MockSensor::reliable(7);
    let mut link = MockLink::up();
    let mut socket = ScriptedGatewaySocket::unreachable();

    let first_attempt = run_until_window(
        &mut node,
        &clock,
        &mut sensor,
        &mut link,
        &mut socket,
        &mut storage,
    );
    assert_eq!(first_attempt, Some(SendOutcome::Retrying));

    // Two more spaced attempts exhaust the retry budget.
    clock.set(32_000);
    node.tick(&clock, &mut sensor, &mut link, &mut socket, &mut storage);
    clock.set(34_000);
    let last = node.tick(&clock, &mut sensor, &mut link, &mut socket, &mut storage);

    assert_eq!(last, Some(SendOutcome::Degraded));
    assert_eq!(node.batch_len(), 0, "batch drained, never silently kept");
    assert_eq!(node.flash_log().len(), 1, "one reduced reading preserved");

    let preserved = node.flash_log().read_at(&storage, 0).unwrap();
    assert_eq!(preserved.error_kind, ErrorKind::UplinkFailure);
    assert!(preserved.is_error);
    // The preserved value is a real median of the window's samples.
    assert!((22.0..28.0).contains(&preserved.temperature));
    assert!((40.0..60.0).contains(&preserved.humidity));
}

#[test]
fn gateway_refusal_retries_then_recovers() {
    let clock = MockClock::new();
    let mut storage = MemSlotStorage::new();
    let mut node = SensorNode::new(SystemConfig::default(), &storage);
    let mut sensor = MockSensor::reliable(23);
    let mut link = MockLink::up();
    let mut socket = ScriptedGatewaySocket::new(1_700_000_000);
    socket.accept_data = false;

    let outcome = run_until_window(
        &mut node,
        &clock,
        &mut sensor,
        &mut link,
        &mut socket,
        &mut storage,
    );
    assert_eq!(outcome, Some(SendOutcome::Retrying));

    // Gateway recovers before the retry budget runs out.
    socket.accept_data = true;
    clock.set(32_000);
    let outcome = node.tick(&clock, &mut sensor, &mut link, &mut socket, &mut storage);
    assert_eq!(outcome, Some(SendOutcome::Sent));
    assert_eq!(node.flash_log().len(), 0);
}

#[test]
fn link_down_keeps_accumulating_without_connecting() {
    let clock = MockClock::new();
    let mut storage = MemSlotStorage::new();
    let mut node = SensorNode::new(SystemConfig::default(), &storage);
    let mut sensor = MockSensor::reliable(5);
    let mut link = MockLink::down();
    let mut socket = ScriptedGatewaySocket::new(0);

    for i in 0..4 {
        clock.set(i * 2_000);
        node.tick(&clock, &mut sensor, &mut link, &mut socket, &mut storage);
    }

    assert_ne!(node.connection_state(), ConnectionState::Connected);
    assert_eq!(node.batch_len(), 4, "sampling continues while offline");
    assert!(socket.posted_payloads().is_empty());
}

#[test]
fn flash_log_survives_node_restart() {
    let clock = MockClock::new();
    let mut storage = MemSlotStorage::new();
    let mut sensor = MockSensor::reliable(3);
    let mut link = MockLink::up();
    let mut socket = ScriptedGatewaySocket::unreachable();

    {
        let mut node = SensorNode::new(SystemConfig::default(), &storage);
        run_until_window(
            &mut node,
            &clock,
            &mut sensor,
            &mut link,
            &mut socket,
            &mut storage,
        );
        clock.set(32_000);
        node.tick(&clock, &mut sensor, &mut link, &mut socket, &mut storage);
        clock.set(34_000);
        let outcome = node.tick(&clock, &mut sensor, &mut link, &mut socket, &mut storage);
        assert_eq!(outcome, Some(SendOutcome::Degraded));
    }

    // "Reboot": a fresh node over the same storage region finds the
    // preserved reading via the persisted metadata.
    let node = SensorNode::new(SystemConfig::default(), &storage);
    assert_eq!(node.flash_log().len(), 1);
    assert_eq!(
        node.flash_log().read_at(&storage, 0).unwrap().error_kind,
        ErrorKind::UplinkFailure
    );
}
