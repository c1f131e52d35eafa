//! Operating-mode thresholds and the out-of-range evaluator.

use serde::{Deserialize, Serialize};

use crate::reading::{ErrorKind, Reading};

/// Where the monitored compartment sits, thermally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingMode {
    Room,
    Cooler,
    Freezer,
}

/// Acceptable ranges for one operating mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub min_humidity: f32,
    pub max_humidity: f32,
}

const ROOM: Thresholds = Thresholds {
    min_temperature: 18.0,
    max_temperature: 25.0,
    min_humidity: 30.0,
    max_humidity: 70.0,
};

const COOLER: Thresholds = Thresholds {
    min_temperature: 2.0,
    max_temperature: 6.0,
    min_humidity: 30.0,
    max_humidity: 70.0,
};

const FREEZER: Thresholds = Thresholds {
    min_temperature: -30.0,
    max_temperature: -18.0,
    min_humidity: 30.0,
    max_humidity: 70.0,
};

/// Static lookup of the threshold table for a mode.
pub fn thresholds_for_mode(mode: OperatingMode) -> Thresholds {
    match mode {
        OperatingMode::Room => ROOM,
        OperatingMode::Cooler => COOLER,
        OperatingMode::Freezer => FREEZER,
    }
}

/// Classify a reading against the thresholds, tagging it in place.
///
/// Returns `true` when any range was exceeded. Temperature is checked
/// first, humidity second; when both are out of range the humidity
/// classification wins (`error_kind` is a scalar — see DESIGN.md for
/// why this stays last-write-wins rather than a bitmask).
///
/// Pure and total: never fails, touches nothing but the passed reading.
pub fn evaluate_thresholds(reading: &mut Reading, thresholds: &Thresholds) -> bool {
    let mut exceeded = false;

    if reading.temperature < thresholds.min_temperature
        || reading.temperature > thresholds.max_temperature
    {
        exceeded = true;
        reading.mark_error(if reading.temperature < thresholds.min_temperature {
            ErrorKind::TooLow
        } else {
            ErrorKind::TooHigh
        });
    }
    if reading.humidity < thresholds.min_humidity || reading.humidity > thresholds.max_humidity {
        exceeded = true;
        reading.mark_error(if reading.humidity < thresholds.min_humidity {
            ErrorKind::TooLow
        } else {
            ErrorKind::TooHigh
        });
    }

    exceeded
}
