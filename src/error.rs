//! Unified error types for the Coldtrace firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every
//! subsystem can convert into, keeping node-level error handling
//! uniform. All variants are `Copy` so they can be cheaply passed
//! through the cooperative main loops without allocation.

use core::fmt;

use crate::ports::{BackendError, ConfigError, FsError, LinkError, StorageError};
use crate::wire::WireError;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A wire/flash record could not be decoded.
    Wire(WireError),
    /// Sensor-node slot storage failed.
    Storage(StorageError),
    /// Gateway flash filesystem failed.
    Fs(FsError),
    /// Link or socket failure.
    Link(LinkError),
    /// The backend relay failed.
    Backend(BackendError),
    /// Configuration load/save failed.
    Config(ConfigError),
    /// Peripheral or service initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Fs(e) => write!(f, "fs: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Backend(e) => write!(f, "backend: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<FsError> for Error {
    fn from(e: FsError) -> Self {
        Self::Fs(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<BackendError> for Error {
    fn from(e: BackendError) -> Self {
        Self::Backend(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
