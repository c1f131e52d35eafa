//! Gateway node firmware — entry point.
//!
//! Two tasks, exactly:
//! - the main loop accepts sensor connections (`POST /data`,
//!   `GET /time`) and feeds the bounded ingest queue;
//! - one background task drains the queue, relays batches to the
//!   backend, persists refusals to LittleFS, and drives the stored-
//!   batch retry cycle plus the data-silence watch.
//!
//! All flash access happens on the background task — the two tasks
//! share nothing but the mutex-guarded queue.

use std::net::TcpListener;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{error, info, warn};

use coldtrace::adapters::backend::HttpBackendAdapter;
use coldtrace::adapters::eeprom::EepromAdapter;
use coldtrace::adapters::net::TcpSocketAdapter;
use coldtrace::adapters::storage::LittleFsAdapter;
use coldtrace::adapters::time::TimeAdapter;
use coldtrace::config::SystemConfig;
use coldtrace::gateway::ingest::IngestQueue;
use coldtrace::gateway::processor::{BatchProcessor, ProcessOutcome, SilenceWatch, IDLE_POLL_MS};
use coldtrace::gateway::retry::RetryScheduler;
use coldtrace::gateway::server::{GatewayServer, ServedRequest};
use coldtrace::gateway::store::FlashStore;
use coldtrace::ports::{ConfigPort, MonotonicClock};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::EspSntp;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};

const STA_SSID: &str = match option_env!("COLDTRACE_STA_SSID") {
    Some(s) => s,
    None => "upstream-wifi",
};
const STA_PASSWORD: &str = match option_env!("COLDTRACE_STA_PASSWORD") {
    Some(s) => s,
    None => "upstream-pass",
};
const AP_SSID: &str = match option_env!("COLDTRACE_AP_SSID") {
    Some(s) => s,
    None => "coldtrace-gw",
};
const AP_PASSWORD: &str = match option_env!("COLDTRACE_AP_PASSWORD") {
    Some(s) => s,
    None => "coldtrace",
};

const BACKEND_URL: &str = match option_env!("COLDTRACE_BACKEND_URL") {
    Some(s) => s,
    None => "http://backend.example/api/batches",
};

/// Sensor-facing listen address on the soft-AP interface.
const LISTEN_ADDR: &str = "0.0.0.0:80";

/// The ingest queue is shared between the acceptor loop and the
/// processor task; a static is the no-allocation way to do that.
static INGEST: IngestQueue = IngestQueue::new();

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init().map_err(|e| anyhow!("logger init: {e:?}"))?;

    info!("Coldtrace gateway v{}", env!("CARGO_PKG_VERSION"));

    // ── Config ────────────────────────────────────────────────
    let mut eeprom = EepromAdapter::new().map_err(|e| anyhow!("nvs init: {e}"))?;
    let config = match eeprom.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({e}), using defaults");
            SystemConfig::default()
        }
    };

    // ── WiFi: STA to the backend network + soft-AP for sensors ─
    let peripherals = Peripherals::take().map_err(|e| anyhow!("peripherals: {e}"))?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let mut wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    wifi.set_configuration(&Configuration::Mixed(
        ClientConfiguration {
            ssid: STA_SSID.try_into().map_err(|()| anyhow!("STA ssid too long"))?,
            password: STA_PASSWORD
                .try_into()
                .map_err(|()| anyhow!("STA password too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        },
        AccessPointConfiguration {
            ssid: AP_SSID.try_into().map_err(|()| anyhow!("AP ssid too long"))?,
            password: AP_PASSWORD
                .try_into()
                .map_err(|()| anyhow!("AP password too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        },
    ))?;
    wifi.start()?;
    wifi.connect()?;

    // NTP sync runs in the background; WallClock reports None until the
    // clock looks sane.
    let _sntp = EspSntp::new_default()?;

    // ── Flash store (background task owns it) ─────────────────
    mount_littlefs();
    let fs = LittleFsAdapter::new().unwrap_or_else(|e| {
        // Degraded no-persistence mode: relaying still works, but
        // batches the backend refuses are lost.
        error!("Flash mount failed ({e}) — running without persistence");
        LittleFsAdapter::unavailable()
    });
    let store = FlashStore::new(fs, usize::from(config.max_stored_batches));

    // ── Background processor task ─────────────────────────────
    let processor_config = config.clone();
    std::thread::Builder::new()
        .name("batch-proc".into())
        .stack_size(12 * 1024)
        .spawn(move || processor_task(store, &processor_config))
        .map_err(|e| anyhow!("spawn processor task: {e}"))?;

    // ── Acceptor loop ─────────────────────────────────────────
    let listener = TcpListener::bind(LISTEN_ADDR)?;
    listener.set_nonblocking(true)?;
    info!("Gateway listening on {LISTEN_ADDR}");

    let clock = TimeAdapter::new();
    let server = GatewayServer::new();

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let mut conn = TcpSocketAdapter::from_stream(stream);
                let served = server.handle_connection(&mut conn, &clock, &clock, &INGEST);
                if served == ServedRequest::DataAccepted {
                    info!("Accepted batch from {peer}");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                warn!("Accept failed: {e}");
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

/// Background task: decode, relay, persist, retry, and watch for
/// ingest silence. Owns every flash handle — the acceptor never
/// touches storage.
fn processor_task(mut store: FlashStore<LittleFsAdapter>, config: &SystemConfig) {
    let clock = TimeAdapter::new();
    let mut processor = BatchProcessor::new();
    let mut retry = RetryScheduler::new(config);
    let mut backend = HttpBackendAdapter::new(BACKEND_URL);
    let mut silence = SilenceWatch::new(config.data_silence_threshold_ms, clock.millis());

    info!("Batch processor task running");
    store.dump_batches();
    store.dump_send_statuses();
    loop {
        let outcome = processor.process_next(&INGEST, &mut store, &mut backend, &clock);
        match outcome {
            ProcessOutcome::Idle => {
                std::thread::sleep(Duration::from_millis(u64::from(IDLE_POLL_MS)));
            }
            ProcessOutcome::Relayed | ProcessOutcome::Persisted(_) | ProcessOutcome::Discarded => {
                silence.mark_received(clock.millis());
            }
        }

        retry.tick(&clock, &mut store, &mut backend, &clock);

        if silence.tick(clock.millis()) {
            store.log_error("No data received from sensor node", &clock);
        }
    }
}

/// Register the LittleFS partition at `/littlefs` (the `storage`
/// partition from the partition table). Formats on first boot.
fn mount_littlefs() {
    use esp_idf_svc::sys::*;

    let base_path = c"/littlefs";
    let partition = c"storage";

    // SAFETY: one-shot registration from the main task before any file
    // access; the conf struct is only read during the call.
    unsafe {
        let mut conf: esp_vfs_littlefs_conf_t = core::mem::zeroed();
        conf.base_path = base_path.as_ptr();
        conf.partition_label = partition.as_ptr();
        conf.set_format_if_mount_failed(1);

        let ret = esp_vfs_littlefs_register(&conf);
        if ret == ESP_OK {
            info!("LittleFS mounted successfully");
        } else {
            error!("LittleFS mount failed ({ret})");
        }
    }
}
