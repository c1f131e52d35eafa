//! Bounded ingest queue between the connection acceptor and the batch
//! processor task.
//!
//! The acceptor and the processor are the only two tasks on the
//! gateway; everything they share goes through this one mutex — no
//! nested locks anywhere. Draining is cooperative polling (the
//! processor idles briefly on empty), not condition-variable blocking,
//! to fit the single-core scheduling model of the network stack.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

/// Queue capacity. When full, `push` refuses and the server answers
/// 503 — backpressure instead of unbounded memory growth.
pub const INGEST_QUEUE_DEPTH: usize = 15;

/// One raw frame as received from the sensor link, before decoding.
#[derive(Debug)]
pub struct IncomingFrame {
    pub payload: Vec<u8>,
    /// Gateway millis at arrival (drives the data-silence watch).
    pub arrival_ms: u32,
}

/// Mutex-guarded FIFO of raw frames.
pub struct IngestQueue {
    frames: Mutex<CriticalSectionRawMutex, RefCell<Deque<IncomingFrame, INGEST_QUEUE_DEPTH>>>,
}

impl IngestQueue {
    pub const fn new() -> Self {
        Self {
            frames: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Enqueue a frame. Returns `false` (frame refused) at capacity;
    /// queued frames are never displaced.
    pub fn push(&self, frame: IncomingFrame) -> bool {
        self.frames
            .lock(|q| q.borrow_mut().push_back(frame).is_ok())
    }

    /// Dequeue the oldest frame. Non-blocking; `None` means the
    /// consumer should idle briefly before re-checking.
    pub fn pop(&self) -> Option<IncomingFrame> {
        self.frames.lock(|q| q.borrow_mut().pop_front())
    }

    pub fn len(&self) -> usize {
        self.frames.lock(|q| q.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == INGEST_QUEUE_DEPTH
    }
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::new()
    }
}
