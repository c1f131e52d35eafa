//! Port traits — the hexagonal boundary between domain logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ pipeline core (sensor/, gateway/)
//! ```
//!
//! Driven adapters (clocks, radios, sockets, EEPROM, flash filesystem,
//! backend HTTP client) implement these traits. The pipeline consumes
//! them via generics, so the core never touches hardware directly and
//! every component is testable with mock adapters on the host.
//!
//! The system's external collaborators live exactly here: the DHT
//! driver behind [`ReadingSource`], WiFi association behind
//! [`ConnectivityPort`], NTP behind [`WallClock`], and the backend HTTP
//! endpoint behind [`BackendPort`].

use core::fmt;

use crate::config::SystemConfig;
use crate::reading::Reading;

// ───────────────────────────────────────────────────────────────
// Clocks
// ───────────────────────────────────────────────────────────────

/// Device-local milliseconds since boot. Wraps at `u32::MAX` (~49.7
/// days); all consumers compare with `wrapping_sub`.
pub trait MonotonicClock {
    fn millis(&self) -> u32;
}

/// Best-effort absolute time. `None` until NTP (or a `GET /time`
/// exchange) has synced the device.
pub trait WallClock {
    fn epoch_seconds(&self) -> Option<u32>;
}

// ───────────────────────────────────────────────────────────────
// Sensor reading source (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Produces one `(temperature, humidity, valid)` sample on demand.
/// The DHT driver (or a mock) lives behind this.
pub trait ReadingSource {
    /// Sample the sensor, stamping the reading with the given id and
    /// device-local timestamp. A failed read returns a
    /// `SensorFailure` reading, never an `Err`.
    fn sample(&mut self, sensor_id: u8, timestamp: u32) -> Reading;
}

// ───────────────────────────────────────────────────────────────
// Link connectivity (radio association)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The radio is not associated; no socket can be opened.
    NotConnected,
    /// Opening the peer socket failed outright.
    ConnectFailed,
    /// The peer did not answer within the bounded window.
    Timeout,
    /// The peer closed the connection mid-exchange.
    Closed,
    /// Underlying socket I/O failed.
    IoError,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "link not associated"),
            Self::ConnectFailed => write!(f, "peer connect failed"),
            Self::Timeout => write!(f, "peer response timeout"),
            Self::Closed => write!(f, "connection closed by peer"),
            Self::IoError => write!(f, "socket I/O error"),
        }
    }
}

/// Radio association to the peer network (sensor → gateway AP, or
/// gateway → upstream WiFi). Association is slow and asynchronous; the
/// caller owns the Idle/Connecting/Connected state machine and polls.
pub trait ConnectivityPort {
    /// Kick off an association attempt. Non-blocking.
    fn start_connect(&mut self) -> Result<(), LinkError>;

    /// Whether the radio is currently associated.
    fn is_associated(&self) -> bool;

    /// Drop the association (also used to reset a stuck attempt).
    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Byte streams (per-exchange sockets)
// ───────────────────────────────────────────────────────────────

/// A non-blocking byte stream — one accepted gateway connection, or the
/// sensor's per-exchange socket to the gateway.
pub trait WireStream {
    /// Read whatever is available. `Ok(0)` means "nothing yet", not
    /// end-of-stream; the caller polls against its own deadline.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Write the whole buffer.
    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError>;
}

/// Sensor-side socket to the gateway: opened per exchange, closed after
/// the response (the gateway serves one request per connection).
pub trait UplinkSocket: WireStream {
    /// Open a fresh connection to the gateway. Bounded internally; an
    /// unreachable gateway returns `ConnectFailed` rather than hanging.
    fn open(&mut self) -> Result<(), LinkError>;

    /// Close the current connection, if any.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Sensor-node slot storage (EEPROM-like)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Offset/length falls outside the storage region.
    OutOfRange,
    /// The underlying storage failed (mount/write error).
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "offset outside storage region"),
            Self::IoError => write!(f, "storage I/O error"),
        }
    }
}

/// Byte-addressed non-volatile region with EEPROM `update` semantics:
/// implementations MUST skip physically writing bytes that already hold
/// the requested value (wear reduction — the flash log leans on this).
pub trait SlotStorage {
    /// Total region size in bytes.
    fn capacity(&self) -> usize;

    /// Fill `buf` from `offset`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `data` at `offset`, skipping unchanged bytes.
    fn update(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Gateway flash filesystem
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No such file.
    NotFound,
    /// The filesystem could not be mounted at boot.
    MountFailed,
    /// Read/write/remove failed.
    IoError,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::MountFailed => write!(f, "filesystem mount failed"),
            Self::IoError => write!(f, "filesystem I/O error"),
        }
    }
}

/// Minimal flash filesystem surface (LittleFS-shaped): whole-file reads
/// and writes plus append, no directories beyond the root, no seeking.
/// Each write/remove is a single atomic-enough operation; no transaction
/// ever spans two files.
pub trait FlashFs {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Create or truncate, then write.
    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError>;

    /// Create if missing, then append.
    fn append_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError>;

    fn remove_file(&mut self, path: &str) -> Result<(), FsError>;

    /// Size in bytes, `None` if the file does not exist.
    fn file_size(&self, path: &str) -> Option<usize>;

    /// Names of all files in the root directory (leading `/` included).
    fn list_root(&self) -> Vec<String>;
}

// ───────────────────────────────────────────────────────────────
// Backend relay
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    /// Upstream network is down; nothing was sent.
    NotConnected,
    /// Connection-level failure talking to the backend.
    ConnectionFailed,
    /// The backend answered with a non-201 status.
    Rejected(u16),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "WiFi not connected"),
            Self::ConnectionFailed => write!(f, "backend connection failed"),
            Self::Rejected(code) => write!(f, "backend rejected batch (HTTP {code})"),
        }
    }
}

/// The opaque backend endpoint: POST one JSON batch body, success iff
/// the backend answers HTTP 201.
pub trait BackendPort {
    fn post_json(&mut self, body: &str) -> Result<(), BackendError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration persistence
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field is out of its allowed range.
    ValidationFailed(&'static str),
    /// Stored blob failed to deserialize.
    Corrupted,
    /// Storage-layer failure.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "config validation failed: {msg}"),
            Self::Corrupted => write!(f, "stored config is corrupted"),
            Self::IoError => write!(f, "config storage I/O error"),
        }
    }
}

/// Loads and persists system configuration.
///
/// Implementations MUST validate before persisting — invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently
/// clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError>;
}
