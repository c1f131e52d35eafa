//! Core data model: one sensor sample and its error classification.
//!
//! A [`Reading`] travels the whole pipeline unchanged: sensor sample →
//! threshold check → batch → wire → gateway → backend / flash. Its
//! packed 15-byte layout (see [`crate::wire`]) is both the wire format
//! and the on-flash format, so the field set and order here must never
//! change without a format revision.

use serde::{Deserialize, Serialize};

/// Error classification carried inside every reading.
///
/// Discriminants are the historical power-of-two codes and are written
/// verbatim to the one-byte `error_kind` wire/flash field. Only one
/// kind is stored at a time (last check wins); the spacing keeps a
/// future bitmask revision possible without renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorKind {
    /// No error — the reading is usable as-is.
    None = 0,
    /// Temperature or humidity below the operating-mode minimum.
    TooLow = 1,
    /// Temperature or humidity above the operating-mode maximum.
    TooHigh = 2,
    /// The sensor itself failed to produce data (NaN read).
    SensorFailure = 4,
    /// The batch containing this reading could not be uplinked.
    UplinkFailure = 8,
}

impl ErrorKind {
    /// Wire/flash byte code for this kind.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire/flash byte code. Unknown codes are rejected so a
    /// corrupt record never round-trips as a healthy one.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::TooLow),
            2 => Some(Self::TooHigh),
            4 => Some(Self::SensorFailure),
            8 => Some(Self::UplinkFailure),
            _ => None,
        }
    }
}

/// One temperature/humidity sample.
///
/// `timestamp` is device-local milliseconds-since-boot on the sensor
/// node and absolute epoch seconds after the gateway reconstructs it —
/// the same 32-bit field serves both stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: u8,
    pub timestamp: u32,
    pub temperature: f32,
    pub humidity: f32,
    pub is_error: bool,
    pub error_kind: ErrorKind,
}

impl Reading {
    /// A healthy sample.
    pub fn ok(sensor_id: u8, timestamp: u32, temperature: f32, humidity: f32) -> Self {
        Self {
            sensor_id,
            timestamp,
            temperature,
            humidity,
            is_error: false,
            error_kind: ErrorKind::None,
        }
    }

    /// A sample that carries no data — numeric fields are NaN so a
    /// failed read can never be mistaken for "0.0 degrees".
    pub fn failed(sensor_id: u8, timestamp: u32, kind: ErrorKind) -> Self {
        Self {
            sensor_id,
            timestamp,
            temperature: f32::NAN,
            humidity: f32::NAN,
            is_error: true,
            error_kind: kind,
        }
    }

    /// Flag this reading with an error kind, upholding the
    /// `is_error == (error_kind != None)` invariant.
    pub fn mark_error(&mut self, kind: ErrorKind) {
        self.is_error = kind != ErrorKind::None;
        self.error_kind = kind;
    }
}
