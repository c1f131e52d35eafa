//! Stored-batch retry scheduling.
//!
//! Two-level backoff, one batch in flight at a time: inside a cycle the
//! oldest stored batch gets up to `retry_max_attempts` sends spaced
//! `retry_backoff_ms` apart; an exhausted cycle abandons the batch
//! *without deleting it*, so the next idle tick picks it up again as
//! "oldest". Fast bounded attempts inside, soft infinite retry outside.

use log::{info, warn};

use crate::config::SystemConfig;
use crate::gateway::backend;
use crate::gateway::store::FlashStore;
use crate::ports::{BackendPort, FlashFs, MonotonicClock, WallClock};
use crate::reading::Reading;

/// What one scheduler tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Nothing stored, nothing to do.
    Idle,
    /// In a cycle but inside the backoff window.
    Waiting,
    /// Resent successfully; the stored file was removed.
    Resent(u16),
    /// Attempt failed; the cycle continues.
    Failed(u16),
    /// Attempts exhausted; batch abandoned until a later cycle.
    Abandoned(u16),
}

/// Owns the retry-cycle state (plain fields — tests run any number of
/// independent schedulers).
pub struct RetryScheduler {
    in_cycle: bool,
    attempts: u8,
    current: Option<(Vec<Reading>, u16)>,
    last_attempt_ms: u32,
    backoff_ms: u32,
    max_attempts: u8,
}

impl RetryScheduler {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            in_cycle: false,
            attempts: 0,
            current: None,
            last_attempt_ms: 0,
            backoff_ms: config.retry_backoff_ms,
            max_attempts: config.retry_max_attempts,
        }
    }

    /// Run one tick. Call periodically from the gateway main loop.
    pub fn tick<F: FlashFs>(
        &mut self,
        clock: &impl MonotonicClock,
        store: &mut FlashStore<F>,
        backend_port: &mut impl BackendPort,
        wall: &impl WallClock,
    ) -> RetryOutcome {
        if !self.in_cycle {
            let Some((readings, index)) = store.load_oldest() else {
                return RetryOutcome::Idle;
            };
            self.current = Some((readings, index));
            self.attempts = 0;
            self.in_cycle = true;
        }

        let now = clock.millis();
        if now.wrapping_sub(self.last_attempt_ms) < self.backoff_ms {
            return RetryOutcome::Waiting;
        }
        self.last_attempt_ms = now;
        self.attempts += 1;

        // The cycle invariant guarantees `current` here.
        let Some((readings, index)) = self.current.as_ref() else {
            self.in_cycle = false;
            return RetryOutcome::Idle;
        };
        let index = *index;

        info!(
            "Retry: sending saved batch {index} attempt {}/{}",
            self.attempts, self.max_attempts
        );

        if backend::post_batch(backend_port, readings).is_ok() {
            info!("Retry: saved batch {index} sent, removing file");
            store.remove_batch(index);
            store.record_send_status(i32::from(index), true, "OK", wall);
            self.exit_cycle();
            return RetryOutcome::Resent(index);
        }

        if self.attempts >= self.max_attempts {
            warn!(
                "Retry: batch {index} failed after {} attempts, will retry later",
                self.max_attempts
            );
            store.record_send_status(
                i32::from(index),
                false,
                &format!("{} retries failed", self.max_attempts),
                wall,
            );
            self.exit_cycle();
            return RetryOutcome::Abandoned(index);
        }

        RetryOutcome::Failed(index)
    }

    pub fn in_cycle(&self) -> bool {
        self.in_cycle
    }

    fn exit_cycle(&mut self) {
        self.in_cycle = false;
        self.current = None;
    }
}
