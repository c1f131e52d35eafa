//! Outbound batch formatting for the backend relay.
//!
//! The backend accepts a JSON array of readings with human-readable
//! timestamps; by the time a batch reaches this point its timestamps
//! are absolute epoch seconds (see the processor's reconstruction).
//! The HTTP call itself stays behind [`BackendPort`] — success iff the
//! backend answers 201.

use serde::Serialize;

use crate::ports::{BackendError, BackendPort};
use crate::reading::Reading;
use crate::timefmt;

#[derive(Serialize)]
struct BackendEntry<'a> {
    #[serde(rename = "SensorId")]
    sensor_id: u8,
    #[serde(rename = "SensorTimeStamp")]
    timestamp: &'a str,
    #[serde(rename = "Temperature")]
    temperature: f32,
    #[serde(rename = "Humidity")]
    humidity: f32,
}

/// Serialize a batch into the backend's JSON array body.
pub fn batch_to_json(readings: &[Reading]) -> String {
    let stamps: Vec<String> = readings
        .iter()
        .map(|r| timefmt::format_epoch(r.timestamp))
        .collect();
    let entries: Vec<BackendEntry<'_>> = readings
        .iter()
        .zip(&stamps)
        .map(|(r, stamp)| BackendEntry {
            sensor_id: r.sensor_id,
            timestamp: stamp,
            temperature: r.temperature,
            humidity: r.humidity,
        })
        .collect();
    // An array of flat structs with no map keys cannot fail to
    // serialize; fall back to an empty array regardless.
    serde_json::to_string(&entries).unwrap_or_else(|_| String::from("[]"))
}

/// Convert and relay one batch. Empty batches are not sent.
pub fn post_batch(
    backend: &mut impl BackendPort,
    readings: &[Reading],
) -> Result<(), BackendError> {
    if readings.is_empty() {
        return Err(BackendError::ConnectionFailed);
    }
    backend.post_json(&batch_to_json(readings))
}
