//! Epoch-seconds ⇄ `YYYY-MM-DD HH:MM:SS` conversions.
//!
//! The backend JSON and the operator-facing logs both carry the
//! human-readable form; everything persisted or sent on the wire stays
//! a `u32` epoch.

use chrono::{DateTime, NaiveDateTime};

const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder emitted when the wall clock is unavailable or an epoch
/// value cannot be rendered. Operator-facing only.
pub const TIME_ERROR: &str = "TIME_ERROR";

/// Render epoch seconds as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_epoch(epoch: u32) -> String {
    match DateTime::from_timestamp(i64::from(epoch), 0) {
        Some(dt) => dt.format(FORMAT).to_string(),
        None => String::from(TIME_ERROR),
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp back to epoch seconds.
/// Returns `None` for malformed input or pre-1970 dates.
pub fn parse_timestamp(s: &str) -> Option<u32> {
    let dt = NaiveDateTime::parse_from_str(s, FORMAT).ok()?;
    u32::try_from(dt.and_utc().timestamp()).ok()
}
