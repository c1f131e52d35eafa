//! Sensor node firmware — entry point.
//!
//! Cooperative single-threaded loop: sample the DHT, classify against
//! the operating-mode thresholds, accumulate a 30 s batch, uplink it to
//! the gateway, and degrade to the EEPROM-backed flash log when the
//! gateway stays unreachable.
//!
//! ```text
//!  ReadingSource ──▶ ┌─────────────────────────┐ ──▶ UplinkSocket
//!                    │        SensorNode        │
//!  ConnectivityPort ─│  thresholds · batch ·    │──▶ SlotStorage
//!                    │  uplink · flash log      │
//!                    └─────────────────────────┘
//! ```

use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};

use coldtrace::adapters::eeprom::EepromAdapter;
use coldtrace::adapters::net::TcpSocketAdapter;
use coldtrace::adapters::time::TimeAdapter;
use coldtrace::adapters::wifi::WifiAdapter;
use coldtrace::ports::ConfigPort;
use coldtrace::sensor::mock::MockSensor;
use coldtrace::sensor::node::SensorNode;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;

/// Gateway access point credentials; injected at build time.
const AP_SSID: &str = match option_env!("COLDTRACE_AP_SSID") {
    Some(s) => s,
    None => "coldtrace-gw",
};
const AP_PASSWORD: &str = match option_env!("COLDTRACE_AP_PASSWORD") {
    Some(s) => s,
    None => "coldtrace",
};

/// Gateway data endpoint on its soft-AP network.
const GATEWAY_ADDR: &str = "192.168.4.1:80";

/// Main-loop pacing; sampling and retries gate themselves on the
/// monotonic clock, this just yields the CPU between ticks.
const LOOP_YIELD: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init().map_err(|e| anyhow!("logger init: {e:?}"))?;

    info!("Coldtrace sensor node v{}", env!("CARGO_PKG_VERSION"));

    // ── Persistent storage + config ───────────────────────────
    let mut storage = EepromAdapter::new().map_err(|e| anyhow!("eeprom init: {e}"))?;
    let config = match storage.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({e}), using defaults");
            coldtrace::config::SystemConfig::default()
        }
    };

    // ── Radio ─────────────────────────────────────────────────
    let peripherals = Peripherals::take().map_err(|e| anyhow!("peripherals: {e}"))?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    let mut wifi = WifiAdapter::new(esp_wifi, AP_SSID, AP_PASSWORD)
        .map_err(|e| anyhow!("wifi init: {e}"))?;

    // ── Node core ─────────────────────────────────────────────
    let clock = TimeAdapter::new();
    let mut node = SensorNode::new(config, &storage);
    // Readings preserved across the last outage, for the boot log.
    node.flash_log().dump(&storage);
    let mut socket = TcpSocketAdapter::new(GATEWAY_ADDR);

    // The DHT driver slots in behind ReadingSource; benches and boards
    // without the probe run on the deterministic mock.
    let mut sensor = MockSensor::new(0x5EED_0001);

    info!("Sensor node entering main loop (gateway {GATEWAY_ADDR})");
    loop {
        node.tick(&clock, &mut sensor, &mut wifi, &mut socket, &mut storage);
        std::thread::sleep(LOOP_YIELD);
    }
}
