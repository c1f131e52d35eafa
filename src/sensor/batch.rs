//! Windowed batch accumulation.

use crate::reading::Reading;

/// Collects readings for a fixed time window and signals when the
/// window has elapsed.
///
/// The accumulator never drains itself: on a `true` return the caller
/// must hand the batch to the uplink (which takes and resets it). If
/// the caller ignores the signal, subsequent appends keep growing the
/// same batch and keep signalling — a documented constraint of the
/// design, not something this type papers over.
pub struct BatchAccumulator {
    readings: Vec<Reading>,
    window_start_ms: Option<u32>,
    window_ms: u32,
}

impl BatchAccumulator {
    pub fn new(window_ms: u32) -> Self {
        Self {
            readings: Vec::new(),
            window_start_ms: None,
            window_ms,
        }
    }

    /// Append a reading. Returns `true` once the window has elapsed and
    /// the batch is ready to send.
    ///
    /// The window timer starts on the first append after the batch was
    /// last emptied, so an idle sensor never produces empty batches.
    pub fn append(&mut self, reading: Reading, now_ms: u32) -> bool {
        self.readings.push(reading);
        let start = *self.window_start_ms.get_or_insert(now_ms);
        now_ms.wrapping_sub(start) >= self.window_ms
    }

    /// Restart the window at `now_ms`. Called after a successful send
    /// or a degrade-to-flash-log, alongside [`take`](Self::take).
    pub fn reset_window(&mut self, now_ms: u32) {
        self.window_start_ms = Some(now_ms);
    }

    /// Drain the accumulated batch. The returned batch is immutable
    /// from the pipeline's point of view — it is encoded or reduced,
    /// never appended to again.
    pub fn take(&mut self) -> Vec<Reading> {
        self.window_start_ms = None;
        core::mem::take(&mut self.readings)
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(ts: u32) -> Reading {
        Reading::ok(1, ts, 20.0, 50.0)
    }

    #[test]
    fn not_ready_before_window() {
        let mut acc = BatchAccumulator::new(30_000);
        assert!(!acc.append(r(0), 0));
        assert!(!acc.append(r(2_000), 2_000));
        assert!(!acc.append(r(29_999), 29_999));
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn ready_once_window_elapses() {
        let mut acc = BatchAccumulator::new(30_000);
        assert!(!acc.append(r(0), 0));
        assert!(acc.append(r(30_000), 30_000));
    }

    #[test]
    fn window_starts_at_first_append() {
        let mut acc = BatchAccumulator::new(30_000);
        // First sample arrives late — the window is measured from it,
        // not from construction time.
        assert!(!acc.append(r(100_000), 100_000));
        assert!(!acc.append(r(120_000), 120_000));
        assert!(acc.append(r(130_000), 130_000));
    }

    #[test]
    fn take_drains_and_rearms() {
        let mut acc = BatchAccumulator::new(30_000);
        acc.append(r(0), 0);
        assert!(acc.append(r(30_000), 30_000));

        let batch = acc.take();
        acc.reset_window(30_000);
        assert_eq!(batch.len(), 2);
        assert!(acc.is_empty());

        // Next window measured from the reset point.
        assert!(!acc.append(r(40_000), 40_000));
        assert!(acc.append(r(60_000), 60_000));
    }

    #[test]
    fn keeps_signalling_until_drained() {
        let mut acc = BatchAccumulator::new(10_000);
        acc.append(r(0), 0);
        assert!(acc.append(r(10_000), 10_000));
        assert!(acc.append(r(12_000), 12_000));
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn survives_millis_wraparound() {
        let mut acc = BatchAccumulator::new(30_000);
        let start = u32::MAX - 10_000;
        assert!(!acc.append(r(start), start));
        // 20_001 ms after the wrap point.
        assert!(!acc.append(r(10_000), 10_000));
        assert!(acc.append(r(20_000), 20_000));
    }
}
