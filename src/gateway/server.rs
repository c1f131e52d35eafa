//! Sensor-facing request handling on the gateway.
//!
//! Serves exactly two exchanges over a raw socket: `POST /data`
//! (binary batch upload → ingest queue) and `GET /time` (4-byte LE
//! epoch). One connection is handled per poll from the main loop; the
//! response goes out immediately and the connection closes — batch
//! processing happens later, on the background task.

use log::{info, warn};

use crate::gateway::ingest::{IncomingFrame, IngestQueue};
use crate::ports::{LinkError, MonotonicClock, WallClock, WireStream};

/// Upper bound on an incoming POST body.
pub const MAX_REQUEST_BODY: usize = 10 * 1024;

/// Overall timeout for reading a request off the socket. Prevents a
/// stalled client from blocking the acceptor forever on a partial
/// upload.
const READ_TIMEOUT_MS: u32 = 3_000;

/// What a handled connection amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedRequest {
    /// Batch read and enqueued (client got 200).
    DataAccepted,
    /// Malformed upload — bad length header or truncated body (400).
    DataRejected,
    /// Ingest queue at capacity — backpressure (503).
    QueueFull,
    /// Time request answered (200 + 4 bytes).
    TimeServed,
    /// Wall clock not yet synced (500).
    TimeUnavailable,
    /// Unknown route (404).
    NotFound,
}

/// Stateless request handler; everything flows through the ports.
pub struct GatewayServer;

impl GatewayServer {
    pub fn new() -> Self {
        Self
    }

    /// Handle one client connection end-to-end.
    pub fn handle_connection(
        &self,
        conn: &mut impl WireStream,
        clock: &impl MonotonicClock,
        wall: &impl WallClock,
        queue: &IngestQueue,
    ) -> ServedRequest {
        let mut reader = RequestReader::new();

        let request_line = match reader.next_line(conn, clock) {
            Ok(line) => line,
            Err(e) => {
                warn!("Server: failed to read request line ({e})");
                respond(conn, 400);
                return ServedRequest::DataRejected;
            }
        };

        if request_line.starts_with("POST /data") {
            self.handle_post_data(&mut reader, conn, clock, queue)
        } else if request_line.starts_with("GET /time") {
            self.handle_get_time(conn, wall)
        } else {
            respond(conn, 404);
            ServedRequest::NotFound
        }
    }

    fn handle_post_data(
        &self,
        reader: &mut RequestReader,
        conn: &mut impl WireStream,
        clock: &impl MonotonicClock,
        queue: &IngestQueue,
    ) -> ServedRequest {
        let content_length = match read_content_length(reader, conn, clock) {
            Some(len) if len > 0 && len <= MAX_REQUEST_BODY => len,
            _ => {
                respond(conn, 400);
                return ServedRequest::DataRejected;
            }
        };

        let payload = match reader.read_exact(conn, clock, content_length) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Server: body read failed ({e})");
                respond(conn, 400);
                return ServedRequest::DataRejected;
            }
        };

        let accepted = queue.push(IncomingFrame {
            payload,
            arrival_ms: clock.millis(),
        });
        if !accepted {
            warn!("Server: batch queue full, discarding incoming batch");
            respond(conn, 503);
            return ServedRequest::QueueFull;
        }

        respond(conn, 200);
        ServedRequest::DataAccepted
    }

    fn handle_get_time(&self, conn: &mut impl WireStream, wall: &impl WallClock) -> ServedRequest {
        let Some(epoch) = wall.epoch_seconds() else {
            warn!("Server: time requested before clock sync");
            respond(conn, 500);
            return ServedRequest::TimeUnavailable;
        };

        info!("Server: serving current time {epoch}");
        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\
                    Content-Length: 4\r\nConnection: close\r\n\r\n";
        let _ = conn.write_all(head.as_bytes());
        let _ = conn.write_all(&epoch.to_le_bytes());
        ServedRequest::TimeServed
    }
}

impl Default for GatewayServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Read headers until the blank line, returning the Content-Length
/// value (`None` if the header is missing or unparsable).
fn read_content_length(
    reader: &mut RequestReader,
    conn: &mut impl WireStream,
    clock: &impl MonotonicClock,
) -> Option<usize> {
    let mut content_length = None;
    loop {
        let line = reader.next_line(conn, clock).ok()?;
        if line.is_empty() {
            return content_length; // blank line ends the headers
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse().ok();
        }
    }
}

/// Send a minimal response and leave the connection to be closed by
/// the caller/transport.
fn respond(conn: &mut impl WireStream, code: u16) {
    let line = match code {
        200 => "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n",
        404 => "HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n",
        500 => "HTTP/1.1 500 Internal Server Error\r\nConnection: close\r\n\r\n",
        503 => "HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\n\r\n",
        _ => "HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n",
    };
    let _ = conn.write_all(line.as_bytes());
}

/// Incremental reader over a non-blocking stream: buffers what has
/// arrived and hands out lines / exact byte runs, polling against the
/// shared request deadline.
struct RequestReader {
    buf: Vec<u8>,
    pos: usize,
    deadline_base: Option<u32>,
}

impl RequestReader {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            deadline_base: None,
        }
    }

    fn fill(
        &mut self,
        conn: &mut impl WireStream,
        clock: &impl MonotonicClock,
    ) -> Result<(), LinkError> {
        let start = *self.deadline_base.get_or_insert_with(|| clock.millis());
        let mut chunk = [0u8; 512];
        loop {
            let n = conn.read_some(&mut chunk)?;
            if n > 0 {
                self.buf.extend_from_slice(&chunk[..n]);
                return Ok(());
            }
            if clock.millis().wrapping_sub(start) >= READ_TIMEOUT_MS {
                return Err(LinkError::Timeout);
            }
        }
    }

    /// Next `\n`-terminated line, trimmed of `\r\n`.
    fn next_line(
        &mut self,
        conn: &mut impl WireStream,
        clock: &impl MonotonicClock,
    ) -> Result<String, LinkError> {
        loop {
            if let Some(nl) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
                let line = &self.buf[self.pos..self.pos + nl];
                let line = core::str::from_utf8(line)
                    .map_err(|_| LinkError::IoError)?
                    .trim_end_matches('\r')
                    .to_owned();
                self.pos += nl + 1;
                return Ok(line);
            }
            self.fill(conn, clock)?;
        }
    }

    /// Exactly `n` body bytes, or `Timeout` if the client stalls.
    fn read_exact(
        &mut self,
        conn: &mut impl WireStream,
        clock: &impl MonotonicClock,
        n: usize,
    ) -> Result<Vec<u8>, LinkError> {
        while self.buf.len() - self.pos < n {
            self.fill(conn, clock)?;
        }
        let bytes = self.buf[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(bytes)
    }
}
