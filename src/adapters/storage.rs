//! Flash filesystem adapter.
//!
//! - **`target_os = "espidf"`** — files live on the LittleFS partition
//!   registered at `/littlefs` (mounted by the gateway binary before
//!   this adapter is built); access goes through `std::fs`, which
//!   ESP-IDF routes over its VFS layer.
//! - **other targets** — an in-memory file map, so store/retry tests
//!   exercise the exact same code paths without a filesystem.

use log::info;

use crate::ports::{FlashFs, FsError};
use crate::Error;

#[cfg(target_os = "espidf")]
const BASE_PATH: &str = "/littlefs";

pub struct LittleFsAdapter {
    /// Set when the mount failed at boot; every operation then fails
    /// and the store above degrades to a no-persistence mode.
    degraded: bool,
    #[cfg(not(target_os = "espidf"))]
    files: std::collections::HashMap<String, Vec<u8>>,
}

impl LittleFsAdapter {
    /// Open the filesystem. On ESP-IDF this checks the mount point and
    /// fails with `Fs(MountFailed)` if the partition is absent.
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            if !std::path::Path::new(BASE_PATH).is_dir() {
                return Err(Error::Fs(FsError::MountFailed));
            }
            info!("LittleFs: mounted at {BASE_PATH}");
            Ok(Self { degraded: false })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("LittleFs: simulation backend");
            Ok(Self {
                degraded: false,
                files: std::collections::HashMap::new(),
            })
        }
    }

    /// An adapter whose every operation fails. Used after a mount
    /// failure so the node keeps relaying without persistence instead
    /// of halting.
    pub fn unavailable() -> Self {
        Self {
            degraded: true,
            #[cfg(not(target_os = "espidf"))]
            files: std::collections::HashMap::new(),
        }
    }

    #[cfg(target_os = "espidf")]
    fn full_path(path: &str) -> String {
        format!("{BASE_PATH}{path}")
    }
}

#[cfg(not(target_os = "espidf"))]
impl FlashFs for LittleFsAdapter {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        if self.degraded {
            return Err(FsError::IoError);
        }
        self.files.get(path).cloned().ok_or(FsError::NotFound)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        if self.degraded {
            return Err(FsError::IoError);
        }
        self.files.insert(path.to_owned(), data.to_vec());
        Ok(())
    }

    fn append_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        if self.degraded {
            return Err(FsError::IoError);
        }
        self.files
            .entry(path.to_owned())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> Result<(), FsError> {
        if self.degraded {
            return Err(FsError::IoError);
        }
        self.files.remove(path);
        Ok(())
    }

    fn file_size(&self, path: &str) -> Option<usize> {
        if self.degraded {
            return None;
        }
        self.files.get(path).map(Vec::len)
    }

    fn list_root(&self) -> Vec<String> {
        if self.degraded {
            return Vec::new();
        }
        self.files.keys().cloned().collect()
    }
}

#[cfg(target_os = "espidf")]
impl FlashFs for LittleFsAdapter {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        if self.degraded {
            return Err(FsError::IoError);
        }
        match std::fs::read(Self::full_path(path)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FsError::NotFound),
            Err(_) => Err(FsError::IoError),
        }
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        if self.degraded {
            return Err(FsError::IoError);
        }
        std::fs::write(Self::full_path(path), data).map_err(|_| FsError::IoError)
    }

    fn append_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        use std::io::Write;
        if self.degraded {
            return Err(FsError::IoError);
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::full_path(path))
            .map_err(|_| FsError::IoError)?;
        file.write_all(data).map_err(|_| FsError::IoError)
    }

    fn remove_file(&mut self, path: &str) -> Result<(), FsError> {
        if self.degraded {
            return Err(FsError::IoError);
        }
        match std::fs::remove_file(Self::full_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(_) => Err(FsError::IoError),
        }
    }

    fn file_size(&self, path: &str) -> Option<usize> {
        if self.degraded {
            return None;
        }
        std::fs::metadata(Self::full_path(path))
            .ok()
            .map(|m| m.len() as usize)
    }

    fn list_root(&self) -> Vec<String> {
        if self.degraded {
            return Vec::new();
        }
        let Ok(entries) = std::fs::read_dir(BASE_PATH) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .map(|name| format!("/{name}"))
            .collect()
    }
}
