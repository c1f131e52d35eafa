//! Gateway flash store: CRC-checked batch files, the send-status log,
//! and the persistent error log.
//!
//! Batch file layout (`/batch_<index>.bin`, index strictly increasing):
//! ```text
//! ┌────────────┬──────────────────────┬────────────┐
//! │ count (2B) │ Reading × count      │ crc32 (4B) │
//! │ LE u16     │ 15 B each            │ LE u32     │
//! └────────────┴──────────────────────┴────────────┘
//! ```
//! The CRC covers the encoded reading bytes. A record is valid iff the
//! stored CRC matches a recomputation; invalid files are deleted on
//! read, never repaired. Stored batches are never mutated in place.

use core::fmt;

use crc::{Crc, CRC_32_ISO_HDLC};
use log::{error, info, warn};

use crate::ports::{FlashFs, FsError, WallClock};
use crate::reading::Reading;
use crate::timefmt;
use crate::wire::{self, SendStatus, READING_WIRE_LEN, SEND_STATUS_LEN};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Persistent error log, line-oriented text.
pub const ERROR_FILE: &str = "/errors.txt";

/// Append-only binary send-status log.
pub const SEND_STATUS_FILE: &str = "/send_status.bin";

const BATCH_PREFIX: &str = "/batch_";
const BATCH_SUFFIX: &str = ".bin";

/// Send-status log size cap; the file is cleared wholesale past this —
/// no rotation, no compaction.
const MAX_SEND_STATUS_BYTES: usize = 10 * 1024;

/// Sanity cap on the entry count of a batch file being read.
const MAX_ENTRIES_PER_FILE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// An empty batch is never persisted.
    EmptyBatch,
    Fs(FsError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBatch => write!(f, "empty batch not persisted"),
            Self::Fs(e) => write!(f, "{e}"),
        }
    }
}

impl From<FsError> for StoreError {
    fn from(e: FsError) -> Self {
        Self::Fs(e)
    }
}

/// Indexed collection of persisted batches plus the two diagnostic
/// logs, owning the flash filesystem.
pub struct FlashStore<F: FlashFs> {
    fs: F,
    max_batches: usize,
}

impl<F: FlashFs> FlashStore<F> {
    pub fn new(fs: F, max_batches: usize) -> Self {
        Self { fs, max_batches }
    }

    /// Direct filesystem access (diagnostics and tests).
    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    // ── Batch files ───────────────────────────────────────────

    /// Canonical filename for a batch index, e.g. 3 → `/batch_3.bin`.
    pub fn batch_filename(index: u16) -> String {
        format!("{BATCH_PREFIX}{index}{BATCH_SUFFIX}")
    }

    /// Indices of all stored batch files, ascending.
    pub fn batch_indices(&self) -> Vec<u16> {
        let mut indices: Vec<u16> = self
            .fs
            .list_root()
            .iter()
            .filter_map(|name| {
                name.strip_prefix(BATCH_PREFIX)?
                    .strip_suffix(BATCH_SUFFIX)?
                    .parse()
                    .ok()
            })
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Persist a batch under the next monotonic index, evicting the
    /// oldest file first when at capacity.
    pub fn save_batch(&mut self, readings: &[Reading]) -> Result<u16, StoreError> {
        if readings.is_empty() {
            warn!("FlashStore: empty batch, not persisting");
            return Err(StoreError::EmptyBatch);
        }

        let indices = self.batch_indices();
        let next_index = indices.last().map_or(0, |last| last.wrapping_add(1));
        if indices.len() >= self.max_batches {
            warn!("FlashStore: at capacity, evicting oldest batch");
            self.remove_oldest();
        }

        let mut body = Vec::with_capacity(readings.len() * READING_WIRE_LEN);
        for r in readings {
            body.extend_from_slice(&wire::encode_reading(r));
        }
        let crc = CRC32.checksum(&body);

        let mut file = Vec::with_capacity(2 + body.len() + 4);
        file.extend_from_slice(&(readings.len() as u16).to_le_bytes());
        file.extend_from_slice(&body);
        file.extend_from_slice(&crc.to_le_bytes());

        let fname = Self::batch_filename(next_index);
        if let Err(e) = self.fs.write_file(&fname, &file) {
            error!("FlashStore: failed to create {fname} ({e})");
            self.append_error_line("Failed to create batch file", None);
            return Err(e.into());
        }

        info!(
            "FlashStore: batch {next_index} persisted ({} entries, {} bytes)",
            readings.len(),
            file.len()
        );
        Ok(next_index)
    }

    /// Oldest stored batch, CRC-verified. A corrupt oldest file is
    /// deleted and `None` returned — self-healing by deletion.
    pub fn load_oldest(&mut self) -> Option<(Vec<Reading>, u16)> {
        let index = *self.batch_indices().first()?;
        self.load_checked(index)
    }

    /// Newest stored batch, CRC-verified; corrupt file deleted.
    pub fn load_newest(&mut self) -> Option<(Vec<Reading>, u16)> {
        let index = *self.batch_indices().last()?;
        self.load_checked(index)
    }

    /// Delete the file for a given index (after a successful resend).
    pub fn remove_batch(&mut self, index: u16) {
        let fname = Self::batch_filename(index);
        if self.fs.remove_file(&fname).is_err() {
            warn!("FlashStore: could not remove {fname}");
        }
    }

    /// Delete every stored batch file.
    pub fn clear_batches(&mut self) {
        for index in self.batch_indices() {
            self.remove_batch(index);
        }
    }

    /// Render all stored batches to the diagnostic log, skipping (but
    /// keeping) corrupt files.
    pub fn dump_batches(&self) {
        let indices = self.batch_indices();
        if indices.is_empty() {
            info!("FlashStore: no stored batches");
            return;
        }
        info!("---- Batch log start ----");
        for index in indices {
            match self.read_batch_file(&Self::batch_filename(index)) {
                Some(readings) => {
                    info!("Batch {index} ({} entries):", readings.len());
                    for r in &readings {
                        info!(
                            "  {} temp={:.2} hum={:.2} err={:?}",
                            timefmt::format_epoch(r.timestamp),
                            r.temperature,
                            r.humidity,
                            r.error_kind
                        );
                    }
                }
                None => warn!("Corrupt batch {index} skipped"),
            }
        }
        info!("---- Batch log end ----");
    }

    // ── Send-status log ───────────────────────────────────────

    /// Append a delivery-attempt record. Negative batch ids mark
    /// transient (not-from-flash) sends and are not logged. The file is
    /// cleared wholesale once it outgrows its cap.
    pub fn record_send_status(
        &mut self,
        batch_id: i32,
        success: bool,
        message: &str,
        wall: &impl WallClock,
    ) {
        if batch_id < 0 {
            return;
        }
        if self
            .fs
            .file_size(SEND_STATUS_FILE)
            .is_some_and(|size| size > MAX_SEND_STATUS_BYTES)
        {
            warn!("FlashStore: send-status log too large, clearing");
            let _ = self.fs.remove_file(SEND_STATUS_FILE);
        }

        let status = SendStatus::new(
            wall.epoch_seconds().unwrap_or(0),
            batch_id,
            success,
            message,
        );
        if self
            .fs
            .append_file(SEND_STATUS_FILE, &wire::encode_send_status(&status))
            .is_err()
        {
            error!("FlashStore: failed to append send status");
        }
    }

    /// Read back every send-status record (operator inspection only).
    pub fn read_send_statuses(&self) -> Vec<SendStatus> {
        let Ok(bytes) = self.fs.read_file(SEND_STATUS_FILE) else {
            return Vec::new();
        };
        bytes
            .chunks_exact(SEND_STATUS_LEN)
            .filter_map(|chunk| wire::decode_send_status(chunk).ok())
            .collect()
    }

    pub fn clear_send_statuses(&mut self) {
        let _ = self.fs.remove_file(SEND_STATUS_FILE);
    }

    /// Render the send-status log to the diagnostic channel.
    pub fn dump_send_statuses(&self) {
        info!("---- Send status log start ----");
        for s in self.read_send_statuses() {
            info!(
                "Time:{} | Batch:{} | Status:{} | {}",
                timefmt::format_epoch(s.timestamp),
                s.batch_id,
                if s.success { "OK" } else { "FAIL" },
                s.message
            );
        }
        info!("---- Send status log end ----");
    }

    // ── Error log ─────────────────────────────────────────────

    /// Append a timestamped line to the persistent error log.
    pub fn log_error(&mut self, message: &str, wall: &impl WallClock) {
        let stamp = wall.epoch_seconds().map(timefmt::format_epoch);
        self.append_error_line(message, stamp.as_deref());
    }

    /// Error log contents as lines (empty when no log exists).
    pub fn read_errors(&self) -> Vec<String> {
        let Ok(bytes) = self.fs.read_file(ERROR_FILE) else {
            return Vec::new();
        };
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_owned)
            .collect()
    }

    pub fn clear_errors(&mut self) {
        let _ = self.fs.remove_file(ERROR_FILE);
    }

    // ── Internal ──────────────────────────────────────────────

    fn append_error_line(&mut self, message: &str, stamp: Option<&str>) {
        let line = format!("{} | {message}\n", stamp.unwrap_or(timefmt::TIME_ERROR));
        if self.fs.append_file(ERROR_FILE, line.as_bytes()).is_err() {
            error!("FlashStore: failed to open error log");
        }
    }

    fn remove_oldest(&mut self) {
        if let Some(&oldest) = self.batch_indices().first() {
            self.remove_batch(oldest);
        }
    }

    fn load_checked(&mut self, index: u16) -> Option<(Vec<Reading>, u16)> {
        let fname = Self::batch_filename(index);
        match self.read_batch_file(&fname) {
            Some(readings) => Some((readings, index)),
            None => {
                warn!("FlashStore: batch {index} is corrupted, removing file");
                let _ = self.fs.remove_file(&fname);
                None
            }
        }
    }

    /// Read and CRC-validate one batch file. Any size, count, CRC, or
    /// decode mismatch yields `None` — no partial recovery.
    fn read_batch_file(&self, fname: &str) -> Option<Vec<Reading>> {
        let bytes = self.fs.read_file(fname).ok()?;
        if bytes.len() < 2 + 4 {
            return None;
        }

        let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if count == 0 || count > MAX_ENTRIES_PER_FILE {
            return None;
        }
        let body_len = count * READING_WIRE_LEN;
        if bytes.len() != 2 + body_len + 4 {
            return None;
        }

        let body = &bytes[2..2 + body_len];
        let stored_crc = u32::from_le_bytes([
            bytes[2 + body_len],
            bytes[3 + body_len],
            bytes[4 + body_len],
            bytes[5 + body_len],
        ]);
        if CRC32.checksum(body) != stored_crc {
            return None;
        }

        let mut readings = Vec::with_capacity(count);
        for chunk in body.chunks_exact(READING_WIRE_LEN) {
            readings.push(wire::decode_reading(chunk).ok()?);
        }
        Some(readings)
    }
}
