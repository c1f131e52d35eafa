//! Fixed-layout binary codecs for wire and flash records.
//!
//! Batch payload (sensor → gateway, also the flash batch-file body):
//! ```text
//! ┌───────────────────┬──────────────┬──────────────┬─────┐
//! │ send_millis (4B)  │ Reading (15B)│ Reading (15B)│ ... │
//! │ LE u32            │              │              │     │
//! └───────────────────┴──────────────┴──────────────┴─────┘
//! ```
//!
//! Reading record, 15 bytes, no padding:
//! ```text
//! offset  0: sensor_id    u8
//! offset  1: timestamp    u32 LE
//! offset  5: temperature  f32 LE
//! offset  9: humidity     f32 LE
//! offset 13: is_error     u8 (0 = false, nonzero = true)
//! offset 14: error_kind   u8 (ErrorKind code)
//! ```
//!
//! Every field is read and written individually, in this order — never
//! by reinterpreting struct memory — so the format is independent of
//! compiler layout and byte order. Previously persisted data depends on
//! these offsets; do not reorder or extend without a format revision.

use crate::reading::{ErrorKind, Reading};

/// Size of one encoded [`Reading`].
pub const READING_WIRE_LEN: usize = 15;

/// Size of the batch payload header (`send_millis`).
pub const BATCH_HEADER_LEN: usize = 4;

/// Fixed-length message field of a send-status record.
pub const SEND_STATUS_MSG_LEN: usize = 40;

/// Size of one encoded [`SendStatus`].
pub const SEND_STATUS_LEN: usize = 4 + 4 + 1 + SEND_STATUS_MSG_LEN;

/// Decode failures. Malformed input is discarded whole by callers —
/// there is no partial-record salvage anywhere in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Buffer shorter than the fixed record size.
    Truncated,
    /// Payload length is not `header + n * record`.
    BadLength,
    /// `error_kind` byte is not a known code.
    BadErrorCode,
}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "buffer truncated"),
            Self::BadLength => write!(f, "payload size is not a whole number of records"),
            Self::BadErrorCode => write!(f, "unknown error-kind code"),
        }
    }
}

// ── Reading record ────────────────────────────────────────────

/// Encode one reading into its 15-byte record.
pub fn encode_reading(r: &Reading) -> [u8; READING_WIRE_LEN] {
    let mut out = [0u8; READING_WIRE_LEN];
    out[0] = r.sensor_id;
    out[1..5].copy_from_slice(&r.timestamp.to_le_bytes());
    out[5..9].copy_from_slice(&r.temperature.to_le_bytes());
    out[9..13].copy_from_slice(&r.humidity.to_le_bytes());
    out[13] = u8::from(r.is_error);
    out[14] = r.error_kind.code();
    out
}

/// Decode one reading from the first 15 bytes of `buf`.
pub fn decode_reading(buf: &[u8]) -> Result<Reading, WireError> {
    if buf.len() < READING_WIRE_LEN {
        return Err(WireError::Truncated);
    }
    let error_kind = ErrorKind::from_code(buf[14]).ok_or(WireError::BadErrorCode)?;
    Ok(Reading {
        sensor_id: buf[0],
        timestamp: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
        temperature: f32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
        humidity: f32::from_le_bytes([buf[9], buf[10], buf[11], buf[12]]),
        is_error: buf[13] != 0,
        error_kind,
    })
}

// ── Batch payload ─────────────────────────────────────────────

/// Encode a batch payload: `[send_millis][Reading × n]`.
pub fn encode_batch(send_millis: u32, readings: &[Reading]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BATCH_HEADER_LEN + readings.len() * READING_WIRE_LEN);
    out.extend_from_slice(&send_millis.to_le_bytes());
    for r in readings {
        out.extend_from_slice(&encode_reading(r));
    }
    out
}

/// Decode a batch payload.
///
/// The byte count after the header must be an exact multiple of the
/// record size; a trailing partial record condemns the whole payload.
pub fn decode_batch(buf: &[u8]) -> Result<(u32, Vec<Reading>), WireError> {
    if buf.len() < BATCH_HEADER_LEN {
        return Err(WireError::Truncated);
    }
    let send_millis = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let body = &buf[BATCH_HEADER_LEN..];
    if body.len() % READING_WIRE_LEN != 0 {
        return Err(WireError::BadLength);
    }

    let mut readings = Vec::with_capacity(body.len() / READING_WIRE_LEN);
    for chunk in body.chunks_exact(READING_WIRE_LEN) {
        readings.push(decode_reading(chunk)?);
    }
    Ok((send_millis, readings))
}

// ── Send-status record ────────────────────────────────────────

/// One append-only delivery-attempt record, fixed 49 bytes:
/// `[timestamp u32][batch_id i32][success u8][message 40B, NUL-padded]`.
/// Diagnostic only — written on every relay attempt, read back solely
/// for operator inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendStatus {
    pub timestamp: u32,
    pub batch_id: i32,
    pub success: bool,
    pub message: heapless::String<SEND_STATUS_MSG_LEN>,
}

impl SendStatus {
    pub fn new(timestamp: u32, batch_id: i32, success: bool, message: &str) -> Self {
        let mut m = heapless::String::new();
        // Truncate on a char boundary to fit the fixed field.
        for c in message.chars() {
            if m.push(c).is_err() {
                break;
            }
        }
        Self {
            timestamp,
            batch_id,
            success,
            message: m,
        }
    }
}

/// Encode a send-status record.
pub fn encode_send_status(s: &SendStatus) -> [u8; SEND_STATUS_LEN] {
    let mut out = [0u8; SEND_STATUS_LEN];
    out[0..4].copy_from_slice(&s.timestamp.to_le_bytes());
    out[4..8].copy_from_slice(&s.batch_id.to_le_bytes());
    out[8] = u8::from(s.success);
    let msg = s.message.as_bytes();
    out[9..9 + msg.len()].copy_from_slice(msg);
    out
}

/// Decode a send-status record from the first 49 bytes of `buf`.
pub fn decode_send_status(buf: &[u8]) -> Result<SendStatus, WireError> {
    if buf.len() < SEND_STATUS_LEN {
        return Err(WireError::Truncated);
    }
    let raw_msg = &buf[9..SEND_STATUS_LEN];
    let end = raw_msg.iter().position(|&b| b == 0).unwrap_or(raw_msg.len());
    let text = core::str::from_utf8(&raw_msg[..end]).unwrap_or("");
    Ok(SendStatus::new(
        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        buf[8] != 0,
        text,
    ))
}
