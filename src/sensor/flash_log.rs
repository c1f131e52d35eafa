//! Circular, persistent reading log on the sensor node.
//!
//! Used only while the uplink is down: each batch the uplink gives up
//! on is reduced to one median reading and preserved here. The log is
//! wear-bounded — every append persists exactly the written slot plus
//! two metadata bytes, through a storage port whose `update` skips
//! unchanged bytes.
//!
//! On-storage layout (byte offsets are a compatibility contract —
//! firmware updates must keep them or historic logs become unreadable):
//! ```text
//! offset 0:  count (u8)    — entries currently stored, 0..=CAPACITY
//! offset 1:  head  (u8)    — next slot to write, 0..CAPACITY
//! offset 2:  reserved (8 bytes)
//! offset 10: slot 0  (32 bytes; 15-byte reading record, zero-padded)
//! offset 42: slot 1
//! ...
//! ```

use log::{error, info, warn};

use crate::ports::SlotStorage;
use crate::reading::Reading;
use crate::wire::{self, READING_WIRE_LEN};

/// Number of entry slots.
pub const LOG_CAPACITY: usize = 64;

/// Bytes per slot.
pub const SLOT_LEN: usize = 32;

const META_COUNT_OFFSET: usize = 0;
const META_HEAD_OFFSET: usize = 1;
const DATA_OFFSET: usize = 10;

/// Total storage region the log needs.
pub const REGION_LEN: usize = DATA_OFFSET + LOG_CAPACITY * SLOT_LEN;

/// Circular flash log. Metadata lives in RAM and is mirrored to the
/// first bytes of the storage region on every mutation.
pub struct FlashLog {
    head: usize,
    count: usize,
    /// Cleared when the storage layer fails; the log then degrades to
    /// a no-op rather than taking the node down.
    available: bool,
}

impl FlashLog {
    /// Load persisted metadata. Out-of-range values mean the metadata
    /// region is corrupt; the log is then treated as empty rather than
    /// trusting either field.
    pub fn load_on_init(storage: &impl SlotStorage) -> Self {
        if storage.capacity() < REGION_LEN {
            error!(
                "FlashLog: storage region too small ({} < {REGION_LEN}), log unavailable",
                storage.capacity()
            );
            return Self::unavailable();
        }

        let mut meta = [0u8; 2];
        if storage.read(META_COUNT_OFFSET, &mut meta).is_err() {
            error!("FlashLog: metadata read failed, log unavailable");
            return Self::unavailable();
        }

        let (count, head) = (meta[0] as usize, meta[1] as usize);
        if count > LOG_CAPACITY || head >= LOG_CAPACITY {
            warn!("FlashLog: corrupt metadata (count={count} head={head}), starting empty");
            return Self {
                head: 0,
                count: 0,
                available: true,
            };
        }

        info!("FlashLog: loaded {count} entries (head={head})");
        Self {
            head,
            count,
            available: true,
        }
    }

    fn unavailable() -> Self {
        Self {
            head: 0,
            count: 0,
            available: false,
        }
    }

    /// Append one reading, overwriting the oldest once full.
    ///
    /// Persists only the written slot and the two metadata bytes. A
    /// storage failure marks the log unavailable; callers tolerate the
    /// resulting no-op (degraded mode, not a crash).
    pub fn append(&mut self, storage: &mut impl SlotStorage, reading: &Reading) {
        if !self.available {
            return;
        }

        let mut slot = [0u8; SLOT_LEN];
        slot[..READING_WIRE_LEN].copy_from_slice(&wire::encode_reading(reading));

        let offset = DATA_OFFSET + self.head * SLOT_LEN;
        let head = (self.head + 1) % LOG_CAPACITY;
        let count = (self.count + 1).min(LOG_CAPACITY);

        let wrote = storage
            .update(offset, &slot)
            .and_then(|()| storage.update(META_COUNT_OFFSET, &[count as u8]))
            .and_then(|()| storage.update(META_HEAD_OFFSET, &[head as u8]));

        match wrote {
            Ok(()) => {
                self.head = head;
                self.count = count;
            }
            Err(e) => {
                error!("FlashLog: append failed ({e}), log unavailable");
                self.available = false;
            }
        }
    }

    /// Read the entry at logical `index` (0 = oldest surviving entry).
    /// Returns `None` past the end or for an undecodable slot.
    pub fn read_at(&self, storage: &impl SlotStorage, index: usize) -> Option<Reading> {
        if !self.available || index >= self.count {
            return None;
        }
        let physical = (self.head + LOG_CAPACITY - self.count + index) % LOG_CAPACITY;
        let mut slot = [0u8; SLOT_LEN];
        storage.read(DATA_OFFSET + physical * SLOT_LEN, &mut slot).ok()?;
        wire::decode_reading(&slot).ok()
    }

    /// Zero every slot and the metadata. The port's only-if-changed
    /// write semantics keep this cheap on an already-clear log.
    pub fn clear(&mut self, storage: &mut impl SlotStorage) {
        if !self.available {
            return;
        }
        let zero_slot = [0u8; SLOT_LEN];
        for i in 0..LOG_CAPACITY {
            if storage.update(DATA_OFFSET + i * SLOT_LEN, &zero_slot).is_err() {
                error!("FlashLog: clear failed, log unavailable");
                self.available = false;
                return;
            }
        }
        let _ = storage.update(META_COUNT_OFFSET, &[0]);
        let _ = storage.update(META_HEAD_OFFSET, &[0]);
        self.head = 0;
        self.count = 0;
    }

    /// Render all entries oldest→newest to the diagnostic log.
    pub fn dump(&self, storage: &impl SlotStorage) {
        info!("---- Flash log start ({} entries) ----", self.count);
        for i in 0..self.count {
            match self.read_at(storage, i) {
                Some(r) => info!(
                    "  [{i}] sensor={} ts={} temp={:.1} hum={:.1} err={:?}",
                    r.sensor_id, r.timestamp, r.temperature, r.humidity, r.error_kind
                ),
                None => warn!("  [{i}] unreadable slot"),
            }
        }
        info!("---- Flash log end ----");
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether the storage layer is still healthy.
    pub fn is_available(&self) -> bool {
        self.available
    }
}
