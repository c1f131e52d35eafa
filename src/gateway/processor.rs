//! Background batch processing: decode queued frames, reconstruct
//! absolute timestamps, relay to the backend, and persist what the
//! backend refuses.
//!
//! Nothing in here is fatal to the task loop — malformed frames are
//! dropped whole, relay failures degrade to flash, and the loop always
//! moves on to the next queued item.

use log::{error, info, warn};

use crate::gateway::backend;
use crate::gateway::ingest::IngestQueue;
use crate::gateway::store::FlashStore;
use crate::ports::{BackendPort, FlashFs, WallClock};
use crate::reading::{ErrorKind, Reading};
use crate::timefmt;
use crate::wire;

/// How long the processor task idles when the queue is empty.
pub const IDLE_POLL_MS: u32 = 100;

/// What one `process_next` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Queue empty — idle briefly and re-poll.
    Idle,
    /// Batch relayed to the backend.
    Relayed,
    /// Backend refused; batch persisted under the given index.
    Persisted(u16),
    /// Frame was malformed (or unpersistable) and has been dropped.
    Discarded,
}

/// Queue consumer. Stateless between items; all I/O goes through the
/// injected ports so the whole path runs against mocks.
pub struct BatchProcessor;

impl BatchProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Pop and fully handle one queued frame.
    pub fn process_next<F: FlashFs>(
        &mut self,
        queue: &IngestQueue,
        store: &mut FlashStore<F>,
        backend_port: &mut impl BackendPort,
        wall: &impl WallClock,
    ) -> ProcessOutcome {
        let Some(frame) = queue.pop() else {
            return ProcessOutcome::Idle;
        };

        let (send_millis, mut readings) = match wire::decode_batch(&frame.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Processor: invalid batch received ({e}) - discarded");
                return ProcessOutcome::Discarded;
            }
        };
        if readings.is_empty() {
            warn!("Processor: batch contains no readings - discarded");
            return ProcessOutcome::Discarded;
        }
        info!("Processor: received batch with {} entries", readings.len());

        let now_epoch = match wall.epoch_seconds() {
            Some(epoch) => epoch,
            None => {
                warn!("Processor: wall clock unsynced, timestamps stay relative");
                0
            }
        };
        assign_absolute_timestamps(send_millis, now_epoch, &mut readings);

        for r in &readings {
            log_reading(r);
        }

        match backend::post_batch(backend_port, &readings) {
            Ok(()) => {
                info!("Processor: batch relayed to backend");
                ProcessOutcome::Relayed
            }
            Err(e) => {
                warn!("Processor: backend relay failed ({e}) - saving to flash");
                match store.save_batch(&readings) {
                    Ok(index) => {
                        store.record_send_status(i32::from(index), false, "Failed send", wall);
                        ProcessOutcome::Persisted(index)
                    }
                    Err(save_err) => {
                        error!("Processor: could not persist batch ({save_err})");
                        store.log_error("Failed to persist undelivered batch", wall);
                        ProcessOutcome::Discarded
                    }
                }
            }
        }
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite device-relative millis timestamps as absolute epoch seconds.
///
/// The sensor's clock and ours only meet at one point: the batch was
/// sent `send_millis` on the device clock and arrives "now" on ours
/// (link latency ignored — best effort). The newest reading's age
/// follows from `send_millis`; older readings walk backward using their
/// millis deltas.
///
/// Deltas saturate at zero: if the device clock reset mid-batch, the
/// affected readings collapse onto the reference instant instead of
/// landing in the future.
pub fn assign_absolute_timestamps(send_millis: u32, now_epoch: u32, readings: &mut [Reading]) {
    let Some(last) = readings.last() else { return };

    let last_millis = last.timestamp;
    let delay_ms = send_millis.saturating_sub(last_millis);
    let last_epoch = now_epoch.saturating_sub(delay_ms / 1000);

    for r in readings.iter_mut() {
        let delta_ms = last_millis.saturating_sub(r.timestamp);
        r.timestamp = last_epoch.saturating_sub(delta_ms / 1000);
    }
}

fn log_reading(r: &Reading) {
    let stamp = timefmt::format_epoch(r.timestamp);
    match r.error_kind {
        ErrorKind::None => info!("{stamp} INFO Temp={:.1} Hum={:.1} OK", r.temperature, r.humidity),
        ErrorKind::TooLow => warn!(
            "{stamp} WARNING sensor data too low Temp={:.1} Hum={:.1} CHECK",
            r.temperature, r.humidity
        ),
        ErrorKind::TooHigh => warn!(
            "{stamp} WARNING sensor data too high Temp={:.1} Hum={:.1} CHECK",
            r.temperature, r.humidity
        ),
        ErrorKind::SensorFailure => error!("{stamp} ERROR sensor failure FAIL"),
        ErrorKind::UplinkFailure => warn!("{stamp} WARNING reading recovered after uplink outage"),
    }
}

/// Raises one diagnostic when no data has arrived for the configured
/// window, then re-arms — a prolonged outage logs once per window, not
/// once per tick.
pub struct SilenceWatch {
    last_data_ms: u32,
    threshold_ms: u32,
}

impl SilenceWatch {
    pub fn new(threshold_ms: u32, now_ms: u32) -> Self {
        Self {
            last_data_ms: now_ms,
            threshold_ms,
        }
    }

    /// Note a frame arrival.
    pub fn mark_received(&mut self, now_ms: u32) {
        self.last_data_ms = now_ms;
    }

    /// Returns `true` when the silence alarm fires this tick.
    pub fn tick(&mut self, now_ms: u32) -> bool {
        if now_ms.wrapping_sub(self.last_data_ms) > self.threshold_ms {
            error!(
                "No data received for {} seconds",
                self.threshold_ms / 1000
            );
            self.last_data_ms = now_ms;
            true
        } else {
            false
        }
    }
}
