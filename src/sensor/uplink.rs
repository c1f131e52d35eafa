//! Sensor-side uplink: link state machine, batch transmission, bounded
//! retry, and the degrade-to-flash-log path.
//!
//! All waiting is done by comparing stored timestamps against the
//! monotonic clock inside an otherwise non-blocking main loop — there
//! is no sleeping and no cancel API. A connection attempt that outlives
//! its timeout simply reverts to `Idle` and is retried on a later tick.

use log::{error, info, warn};

use crate::config::SystemConfig;
use crate::median;
use crate::ports::{ConnectivityPort, LinkError, MonotonicClock, SlotStorage, UplinkSocket};
use crate::reading::ErrorKind;
use crate::sensor::batch::BatchAccumulator;
use crate::sensor::flash_log::FlashLog;
use crate::wire;

/// Link association state. Not persisted — resets to `Idle` on power
/// loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting { since_ms: u32 },
    Connected,
}

/// What a [`UplinkClient::try_send_batch`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Batch delivered and drained; window timer restarted.
    Sent,
    /// Nothing to send — no retry consumed.
    Empty,
    /// Too soon since the last attempt; nothing was tried.
    Deferred,
    /// Attempt failed; the batch is retained for another try.
    Retrying,
    /// Retries exhausted: batch reduced to its median, tagged
    /// `UplinkFailure`, written to the flash log, and drained.
    Degraded,
}

/// Owns the sensor node's connection and retry state (plain fields, so
/// tests can run any number of independent clients).
pub struct UplinkClient {
    state: ConnectionState,
    attempts: u8,
    last_attempt_ms: Option<u32>,
    max_retries: u8,
    retry_spacing_ms: u32,
    connect_timeout_ms: u32,
    response_timeout_ms: u32,
}

impl UplinkClient {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            last_attempt_ms: None,
            max_retries: config.uplink_max_retries,
            retry_spacing_ms: config.uplink_retry_spacing_ms,
            connect_timeout_ms: config.connect_timeout_ms,
            response_timeout_ms: config.response_timeout_ms,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drive the Idle → Connecting → Connected machine one step.
    /// Call every main-loop tick.
    pub fn maintain_connection(
        &mut self,
        link: &mut impl ConnectivityPort,
        clock: &impl MonotonicClock,
    ) {
        let now = clock.millis();
        match self.state {
            ConnectionState::Idle => {
                if link.is_associated() {
                    info!("Uplink: link associated");
                    self.state = ConnectionState::Connected;
                } else {
                    match link.start_connect() {
                        Ok(()) => self.state = ConnectionState::Connecting { since_ms: now },
                        Err(e) => warn!("Uplink: connect kick failed ({e})"),
                    }
                }
            }
            ConnectionState::Connecting { since_ms } => {
                if link.is_associated() {
                    info!("Uplink: link associated");
                    self.state = ConnectionState::Connected;
                } else if now.wrapping_sub(since_ms) >= self.connect_timeout_ms {
                    warn!("Uplink: association timed out, reverting to idle");
                    link.disconnect();
                    self.state = ConnectionState::Idle;
                }
            }
            ConnectionState::Connected => {
                if !link.is_associated() {
                    warn!("Uplink: link lost");
                    self.state = ConnectionState::Idle;
                }
            }
        }
    }

    /// Attempt to deliver the accumulated batch.
    ///
    /// A failed attempt keeps the batch and backs off
    /// `retry_spacing_ms`; the `max_retries`-th consecutive failure
    /// reduces the batch via the median reducer, tags the result
    /// `UplinkFailure`, appends it to the flash log, and drains the
    /// batch — it is never silently dropped and never retried without
    /// bound on this side of the link.
    pub fn try_send_batch(
        &mut self,
        batch: &mut BatchAccumulator,
        socket: &mut impl UplinkSocket,
        clock: &impl MonotonicClock,
        storage: &mut impl SlotStorage,
        flash_log: &mut FlashLog,
    ) -> SendOutcome {
        if batch.is_empty() {
            return SendOutcome::Empty;
        }

        let now = clock.millis();
        if let Some(last) = self.last_attempt_ms {
            if now.wrapping_sub(last) < self.retry_spacing_ms {
                return SendOutcome::Deferred;
            }
        }
        self.last_attempt_ms = Some(now);

        let result = if self.state == ConnectionState::Connected {
            self.exchange_batch(batch, socket, clock, now)
        } else {
            Err(LinkError::NotConnected)
        };

        match result {
            Ok(()) => {
                info!("Uplink: batch of {} readings sent", batch.len());
                let _ = batch.take();
                batch.reset_window(now);
                self.attempts = 0;
                self.last_attempt_ms = None;
                SendOutcome::Sent
            }
            Err(e) => {
                self.attempts += 1;
                warn!(
                    "Uplink: send attempt {}/{} failed ({e})",
                    self.attempts, self.max_retries
                );
                if self.attempts >= self.max_retries {
                    self.degrade_batch(batch, storage, flash_log, now);
                    SendOutcome::Degraded
                } else {
                    SendOutcome::Retrying
                }
            }
        }
    }

    /// Fetch the gateway's wall clock (`GET /time`, 4-byte LE epoch
    /// body). Used to bound the node's relative-to-absolute timestamp
    /// math; failure is routine pre-association.
    pub fn sync_time(
        &mut self,
        socket: &mut impl UplinkSocket,
        clock: &impl MonotonicClock,
    ) -> Option<u32> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        socket.open().ok()?;
        let request = b"GET /time HTTP/1.1\r\nConnection: close\r\n\r\n";
        let result = socket
            .write_all(request)
            .and_then(|()| read_until(socket, clock, self.response_timeout_ms, time_body_complete));
        socket.close();

        let response = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Uplink: time sync failed ({e})");
                return None;
            }
        };
        if !response.starts_with(b"HTTP/1.1 200") {
            warn!("Uplink: time sync rejected by gateway");
            return None;
        }
        let body_at = find_header_end(&response)?;
        let body = &response[body_at..];
        let epoch = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        info!("Uplink: gateway time {epoch}");
        Some(epoch)
    }

    // ── Internal ──────────────────────────────────────────────

    fn exchange_batch(
        &self,
        batch: &BatchAccumulator,
        socket: &mut impl UplinkSocket,
        clock: &impl MonotonicClock,
        send_millis: u32,
    ) -> Result<(), LinkError> {
        let payload = wire::encode_batch(send_millis, batch.readings());
        let head = format!(
            "POST /data HTTP/1.1\r\nHost: coldtrace-gateway\r\n\
             Content-Type: application/octet-stream\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        );

        socket.open()?;
        let result = socket
            .write_all(head.as_bytes())
            .and_then(|()| socket.write_all(&payload))
            .and_then(|()| {
                read_until(socket, clock, self.response_timeout_ms, |buf| {
                    buf.contains(&b'\n')
                })
            });
        socket.close();

        let response = result?;
        if response.starts_with(b"HTTP/1.1 200") {
            Ok(())
        } else {
            Err(LinkError::Closed)
        }
    }

    fn degrade_batch(
        &mut self,
        batch: &mut BatchAccumulator,
        storage: &mut impl SlotStorage,
        flash_log: &mut FlashLog,
        now_ms: u32,
    ) {
        let readings = batch.take();
        batch.reset_window(now_ms);

        let mut reduced = median::reduce_batch(&readings);
        reduced.mark_error(ErrorKind::UplinkFailure);
        flash_log.append(storage, &reduced);

        error!(
            "Uplink: giving up after {} attempts, {} readings reduced to flash log",
            self.attempts,
            readings.len()
        );
        self.attempts = 0;
        self.last_attempt_ms = None;
    }
}

/// Poll the socket until `done` matches or `timeout_ms` elapses.
fn read_until(
    socket: &mut impl UplinkSocket,
    clock: &impl MonotonicClock,
    timeout_ms: u32,
    done: impl Fn(&[u8]) -> bool,
) -> Result<Vec<u8>, LinkError> {
    let start = clock.millis();
    let mut collected = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = socket.read_some(&mut chunk)?;
        if n > 0 {
            collected.extend_from_slice(&chunk[..n]);
            if done(&collected) {
                return Ok(collected);
            }
        }
        if clock.millis().wrapping_sub(start) >= timeout_ms {
            return Err(LinkError::Timeout);
        }
    }
}

fn find_header_end(response: &[u8]) -> Option<usize> {
    response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
}

fn time_body_complete(buf: &[u8]) -> bool {
    find_header_end(buf).is_some_and(|at| buf.len() >= at + 4)
}
