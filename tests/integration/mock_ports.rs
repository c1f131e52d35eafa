//! Shared mock port implementations for the integration suite.
//!
//! Every mock is deterministic: clocks advance only when told to, the
//! scripted gateway socket answers by inspecting the request it was
//! written, and the backend records every body it is offered.

use std::cell::{Cell, RefCell};

use coldtrace::ports::{
    BackendError, BackendPort, ConnectivityPort, LinkError, MonotonicClock, SlotStorage,
    StorageError, UplinkSocket, WallClock, WireStream,
};
use coldtrace::sensor::flash_log;

// ── Clock ─────────────────────────────────────────────────────

pub struct MockClock {
    now: Cell<u32>,
    step: u32,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            step: 0,
        }
    }

    /// Advances `step` ms on every query — lets bounded poll loops
    /// terminate without wall-clock sleeps.
    pub fn auto_advance(step: u32) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl MonotonicClock for MockClock {
    fn millis(&self) -> u32 {
        let t = self.now.get();
        self.now.set(t.wrapping_add(self.step));
        t
    }
}

pub struct MockWall(pub Option<u32>);

impl WallClock for MockWall {
    fn epoch_seconds(&self) -> Option<u32> {
        self.0
    }
}

// ── Sensor-node slot storage ──────────────────────────────────

pub struct MemSlotStorage {
    bytes: RefCell<Vec<u8>>,
}

impl MemSlotStorage {
    pub fn new() -> Self {
        Self {
            bytes: RefCell::new(vec![0; flash_log::REGION_LEN]),
        }
    }
}

impl SlotStorage for MemSlotStorage {
    fn capacity(&self) -> usize {
        self.bytes.borrow().len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let bytes = self.bytes.borrow();
        let end = offset.checked_add(buf.len()).ok_or(StorageError::OutOfRange)?;
        if end > bytes.len() {
            return Err(StorageError::OutOfRange);
        }
        buf.copy_from_slice(&bytes[offset..end]);
        Ok(())
    }

    fn update(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let mut bytes = self.bytes.borrow_mut();
        let end = offset.checked_add(data.len()).ok_or(StorageError::OutOfRange)?;
        if end > bytes.len() {
            return Err(StorageError::OutOfRange);
        }
        bytes[offset..end].copy_from_slice(data);
        Ok(())
    }
}

// ── Link association ──────────────────────────────────────────

pub struct MockLink {
    pub associated: bool,
}

#[allow(dead_code)]
impl MockLink {
    pub fn up() -> Self {
        Self { associated: true }
    }

    pub fn down() -> Self {
        Self { associated: false }
    }
}

impl ConnectivityPort for MockLink {
    fn start_connect(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.associated
    }

    fn disconnect(&mut self) {}
}

// ── Scripted gateway socket (sensor side) ─────────────────────

/// Plays the gateway's role on the sensor's per-exchange socket:
/// inspects each written request and serves the matching canned
/// response. Records every request for assertions.
pub struct ScriptedGatewaySocket {
    /// All completed exchanges (full request bytes).
    pub requests: RefCell<Vec<Vec<u8>>>,
    current: Vec<u8>,
    response: Vec<u8>,
    pub reachable: bool,
    /// When false, `POST /data` gets a 503 instead of a 200.
    pub accept_data: bool,
    pub epoch: u32,
}

#[allow(dead_code)]
impl ScriptedGatewaySocket {
    pub fn new(epoch: u32) -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            current: Vec::new(),
            response: Vec::new(),
            reachable: true,
            accept_data: true,
            epoch,
        }
    }

    pub fn unreachable() -> Self {
        let mut s = Self::new(0);
        s.reachable = false;
        s
    }

    /// Request bodies of every `POST /data` exchange seen so far.
    pub fn posted_payloads(&self) -> Vec<Vec<u8>> {
        self.requests
            .borrow()
            .iter()
            .filter(|req| req.starts_with(b"POST /data"))
            .filter_map(|req| {
                req.windows(4)
                    .position(|w| w == b"\r\n\r\n")
                    .map(|at| req[at + 4..].to_vec())
            })
            .collect()
    }

    fn build_response(&self) -> Vec<u8> {
        if self.current.starts_with(b"GET /time") {
            let mut out = Vec::new();
            out.extend_from_slice(
                b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\
                  Content-Length: 4\r\nConnection: close\r\n\r\n",
            );
            out.extend_from_slice(&self.epoch.to_le_bytes());
            out
        } else if self.accept_data {
            b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec()
        } else {
            b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\n\r\n".to_vec()
        }
    }
}

impl WireStream for ScriptedGatewaySocket {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.response.is_empty() {
            self.response = self.build_response();
        }
        let n = self.response.len().min(buf.len());
        buf[..n].copy_from_slice(&self.response[..n]);
        self.response.drain(..n);
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.current.extend_from_slice(data);
        Ok(())
    }
}

impl UplinkSocket for ScriptedGatewaySocket {
    fn open(&mut self) -> Result<(), LinkError> {
        if !self.reachable {
            return Err(LinkError::ConnectFailed);
        }
        self.current.clear();
        self.response.clear();
        Ok(())
    }

    fn close(&mut self) {
        if !self.current.is_empty() {
            let request = core::mem::take(&mut self.current);
            self.requests.borrow_mut().push(request);
        }
        self.response.clear();
    }
}

// ── Gateway-side client connection ────────────────────────────

/// One accepted connection with a scripted request and captured reply.
pub struct MockConnection {
    incoming: Vec<u8>,
    pub outgoing: Vec<u8>,
}

#[allow(dead_code)]
impl MockConnection {
    pub fn new(incoming: Vec<u8>) -> Self {
        Self {
            incoming,
            outgoing: Vec::new(),
        }
    }

    pub fn reply_text(&self) -> String {
        String::from_utf8_lossy(&self.outgoing).into_owned()
    }
}

impl WireStream for MockConnection {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let n = self.incoming.len().min(buf.len());
        buf[..n].copy_from_slice(&self.incoming[..n]);
        self.incoming.drain(..n);
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.outgoing.extend_from_slice(data);
        Ok(())
    }
}

// ── Backend ───────────────────────────────────────────────────

/// Records every offered body; refuses the first `refuse_first` posts.
pub struct MockBackend {
    pub bodies: RefCell<Vec<String>>,
    pub refuse_first: Cell<u32>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn accepting() -> Self {
        Self {
            bodies: RefCell::new(Vec::new()),
            refuse_first: Cell::new(0),
        }
    }

    pub fn refusing(times: u32) -> Self {
        Self {
            bodies: RefCell::new(Vec::new()),
            refuse_first: Cell::new(times),
        }
    }

    pub fn post_count(&self) -> usize {
        self.bodies.borrow().len()
    }
}

impl BackendPort for MockBackend {
    fn post_json(&mut self, body: &str) -> Result<(), BackendError> {
        self.bodies.borrow_mut().push(body.to_owned());
        let left = self.refuse_first.get();
        if left > 0 {
            self.refuse_first.set(left - 1);
            return Err(BackendError::ConnectionFailed);
        }
        Ok(())
    }
}
