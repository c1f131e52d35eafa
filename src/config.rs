//! System configuration parameters
//!
//! All tunable parameters for both Coldtrace node roles. Values can be
//! overridden via persistent storage (see the config port in
//! [`crate::ports`]); the defaults match the deployed fleet.

use serde::{Deserialize, Serialize};

use crate::thresholds::OperatingMode;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Identity ---
    /// Sensor id stamped on every reading from this node
    pub sensor_id: u8,
    /// Operating mode selecting the threshold table
    pub operating_mode: OperatingMode,

    // --- Sampling & batching (sensor node) ---
    /// Sensor sampling interval (milliseconds)
    pub sample_interval_ms: u32,
    /// Batch accumulation window (milliseconds)
    pub batch_window_ms: u32,

    // --- Uplink (sensor node) ---
    /// Consecutive send failures before degrading to the local flash log
    pub uplink_max_retries: u8,
    /// Spacing between send attempts (milliseconds)
    pub uplink_retry_spacing_ms: u32,
    /// Link association timeout: Connecting reverts to Idle after this
    pub connect_timeout_ms: u32,
    /// How long to poll for the gateway's status line (milliseconds)
    pub response_timeout_ms: u32,

    // --- Gateway ---
    /// Batch files kept on flash before oldest-eviction
    pub max_stored_batches: u16,
    /// Spacing between stored-batch resend attempts (milliseconds)
    pub retry_backoff_ms: u32,
    /// Resend attempts per retry cycle before abandoning until next cycle
    pub retry_max_attempts: u8,
    /// Silence on the ingest path longer than this raises an error log
    pub data_silence_threshold_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Identity
            sensor_id: 1,
            operating_mode: OperatingMode::Room,

            // Sampling & batching
            sample_interval_ms: 2_000, // DHT22 minimum cycle
            batch_window_ms: 30_000,

            // Uplink
            uplink_max_retries: 3,
            uplink_retry_spacing_ms: 2_000,
            connect_timeout_ms: 10_000,
            response_timeout_ms: 2_000,

            // Gateway
            max_stored_batches: 20,
            retry_backoff_ms: 10_000,
            retry_max_attempts: 3,
            data_silence_threshold_ms: 60_000,
        }
    }
}
