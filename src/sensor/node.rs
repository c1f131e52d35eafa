//! Sensor-node orchestration: one cooperative tick runs
//! sample → classify → accumulate → (window elapsed) → uplink,
//! with the flash log as the uplink's degradation path.

use log::{error, info, warn};

use crate::config::SystemConfig;
use crate::ports::{
    ConnectivityPort, MonotonicClock, ReadingSource, SlotStorage, UplinkSocket,
};
use crate::reading::{ErrorKind, Reading};
use crate::sensor::batch::BatchAccumulator;
use crate::sensor::flash_log::FlashLog;
use crate::sensor::uplink::{ConnectionState, SendOutcome, UplinkClient};
use crate::thresholds::{self, Thresholds};

/// Re-sync the gateway time once an hour.
const TIME_SYNC_INTERVAL_MS: u32 = 3_600_000;

/// Anchor between the device-local millis clock and gateway epoch time,
/// refreshed by `GET /time`. Used only for operator-facing log lines —
/// wire timestamps stay device-relative, the gateway reconstructs them.
#[derive(Debug, Clone, Copy)]
struct TimeReference {
    epoch_at_sync: u32,
    millis_at_sync: u32,
}

impl TimeReference {
    fn now_epoch(&self, now_ms: u32) -> u32 {
        self.epoch_at_sync + now_ms.wrapping_sub(self.millis_at_sync) / 1000
    }
}

/// The sensor node's application core. All I/O flows through the port
/// parameters of [`tick`](Self::tick), so the whole node runs against
/// mocks on the host.
pub struct SensorNode {
    config: SystemConfig,
    thresholds: Thresholds,
    batch: BatchAccumulator,
    uplink: UplinkClient,
    flash_log: FlashLog,
    time_ref: Option<TimeReference>,
    last_sample_ms: Option<u32>,
    last_sync_ms: Option<u32>,
    send_pending: bool,
}

impl SensorNode {
    /// Construct the node; loads the flash log (storage is only
    /// borrowed — the caller keeps ownership for the whole run).
    pub fn new(config: SystemConfig, storage: &impl SlotStorage) -> Self {
        let thresholds = thresholds::thresholds_for_mode(config.operating_mode);
        let flash_log = FlashLog::load_on_init(storage);
        let batch = BatchAccumulator::new(config.batch_window_ms);
        let uplink = UplinkClient::new(&config);
        info!(
            "SensorNode: id={} mode={:?}, {} preserved readings in flash log",
            config.sensor_id,
            config.operating_mode,
            flash_log.len()
        );
        Self {
            config,
            thresholds,
            batch,
            uplink,
            flash_log,
            time_ref: None,
            last_sample_ms: None,
            last_sync_ms: None,
            send_pending: false,
        }
    }

    /// Run one main-loop tick. Never blocks beyond the bounded socket
    /// exchange inside the uplink.
    ///
    /// Returns the uplink outcome if a send was attempted this tick.
    pub fn tick(
        &mut self,
        clock: &impl MonotonicClock,
        source: &mut impl ReadingSource,
        link: &mut impl ConnectivityPort,
        socket: &mut impl UplinkSocket,
        storage: &mut impl SlotStorage,
    ) -> Option<SendOutcome> {
        let now = clock.millis();

        self.uplink.maintain_connection(link, clock);
        self.maybe_sync_time(socket, clock, now);

        if self.sample_due(now) {
            self.last_sample_ms = Some(now);
            let mut reading = source.sample(self.config.sensor_id, now);
            if !reading.is_error {
                thresholds::evaluate_thresholds(&mut reading, &self.thresholds);
            }
            self.log_reading(&reading, now);
            if self.batch.append(reading, now) {
                self.send_pending = true;
            }
        }

        if self.send_pending {
            let outcome = self.uplink.try_send_batch(
                &mut self.batch,
                socket,
                clock,
                storage,
                &mut self.flash_log,
            );
            if matches!(outcome, SendOutcome::Sent | SendOutcome::Degraded) {
                self.send_pending = false;
            }
            return Some(outcome);
        }
        None
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.uplink.state()
    }

    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    pub fn flash_log(&self) -> &FlashLog {
        &self.flash_log
    }

    // ── Internal ──────────────────────────────────────────────

    fn sample_due(&self, now: u32) -> bool {
        self.last_sample_ms
            .is_none_or(|last| now.wrapping_sub(last) >= self.config.sample_interval_ms)
    }

    fn maybe_sync_time(
        &mut self,
        socket: &mut impl UplinkSocket,
        clock: &impl MonotonicClock,
        now: u32,
    ) {
        if self.uplink.state() != ConnectionState::Connected {
            return;
        }
        let due = self
            .last_sync_ms
            .is_none_or(|last| now.wrapping_sub(last) >= TIME_SYNC_INTERVAL_MS);
        if !due {
            return;
        }
        self.last_sync_ms = Some(now);
        if let Some(epoch) = self.uplink.sync_time(socket, clock) {
            self.time_ref = Some(TimeReference {
                epoch_at_sync: epoch,
                millis_at_sync: now,
            });
        }
    }

    fn log_reading(&self, reading: &Reading, now: u32) {
        // Prefer gateway-synced wall time for the operator log; the
        // reading itself keeps its device-relative timestamp.
        let stamp = self
            .time_ref
            .map_or_else(|| format!("+{now}ms"), |t| crate::timefmt::format_epoch(t.now_epoch(now)));
        match reading.error_kind {
            ErrorKind::None => info!(
                "{stamp} Temp={:.1} Hum={:.1} OK",
                reading.temperature, reading.humidity
            ),
            ErrorKind::TooLow => warn!(
                "{stamp} Temp={:.1} Hum={:.1} below threshold",
                reading.temperature, reading.humidity
            ),
            ErrorKind::TooHigh => warn!(
                "{stamp} Temp={:.1} Hum={:.1} above threshold",
                reading.temperature, reading.humidity
            ),
            ErrorKind::SensorFailure => error!("{stamp} sensor failure, no data"),
            ErrorKind::UplinkFailure => warn!("{stamp} reading preserved after uplink failure"),
        }
    }
}
