//! EEPROM-style slot storage and config persistence over NVS.
//!
//! The sensor node's flash log wants a byte-addressed region with
//! "write only if changed" semantics (classic `EEPROM.update`). On
//! ESP-IDF the region is shadowed in RAM and persisted as a single NVS
//! blob — the shadow comparison keeps no-op writes from ever reaching
//! flash. On other targets the shadow *is* the storage (simulation).
//!
//! The same adapter implements [`ConfigPort`]: the system config is a
//! postcard blob in its own NVS namespace, validated before every save.

use log::info;

use crate::config::SystemConfig;
use crate::ports::{ConfigError, ConfigPort, SlotStorage, StorageError};
use crate::sensor::flash_log;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &str = "coldtrace";
#[cfg(target_os = "espidf")]
const REGION_NAMESPACE: &str = "eeprom";
#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 4000;

pub struct EepromAdapter {
    /// RAM shadow of the whole region; source of truth for reads.
    region: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    config_blob: std::cell::RefCell<Option<Vec<u8>>>,
}

impl EepromAdapter {
    /// Create the adapter and load the persisted region, initialising
    /// NVS flash on ESP-IDF. The region is sized for the flash log.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from
            // the single main-task context before any concurrent NVS
            // access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                log::warn!("Eeprom: erasing and re-initialising NVS partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }

            let mut region = vec![0u8; flash_log::REGION_LEN];
            let loaded = Self::with_nvs_handle(REGION_NAMESPACE, false, |handle| {
                let key = b"region\0";
                let mut size = region.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        region.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match loaded {
                Ok(n) => info!("Eeprom: restored {n}-byte region from NVS"),
                Err(_) => info!("Eeprom: no persisted region, starting blank"),
            }
            Ok(Self { region })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("Eeprom: simulation backend ({} bytes)", flash_log::REGION_LEN);
            Ok(Self {
                region: vec![0u8; flash_log::REGION_LEN],
                config_blob: std::cell::RefCell::new(None),
            })
        }
    }

    /// Open an NVS namespace, run a closure with the handle, close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn persist_region(&self) -> Result<(), StorageError> {
        let result = Self::with_nvs_handle(REGION_NAMESPACE, true, |handle| {
            let key = b"region\0";
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key.as_ptr() as *const _,
                    self.region.as_ptr() as *const _,
                    self.region.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|_| StorageError::IoError)
    }
}

impl SlotStorage for EepromAdapter {
    fn capacity(&self) -> usize {
        self.region.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let end = offset.checked_add(buf.len()).ok_or(StorageError::OutOfRange)?;
        if end > self.region.len() {
            return Err(StorageError::OutOfRange);
        }
        buf.copy_from_slice(&self.region[offset..end]);
        Ok(())
    }

    fn update(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let end = offset.checked_add(data.len()).ok_or(StorageError::OutOfRange)?;
        if end > self.region.len() {
            return Err(StorageError::OutOfRange);
        }
        if self.region[offset..end] == *data {
            return Ok(()); // unchanged — no flash write
        }
        self.region[offset..end].copy_from_slice(data);

        #[cfg(target_os = "espidf")]
        self.persist_region()?;

        Ok(())
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !(100..=60_000).contains(&cfg.sample_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "sample_interval_ms must be 100-60000",
        ));
    }
    if cfg.batch_window_ms < cfg.sample_interval_ms {
        return Err(ConfigError::ValidationFailed(
            "batch_window_ms must cover at least one sample",
        ));
    }
    if !(1..=10).contains(&cfg.uplink_max_retries) {
        return Err(ConfigError::ValidationFailed(
            "uplink_max_retries must be 1-10",
        ));
    }
    if !(100..=60_000).contains(&cfg.uplink_retry_spacing_ms) {
        return Err(ConfigError::ValidationFailed(
            "uplink_retry_spacing_ms must be 100-60000",
        ));
    }
    if cfg.connect_timeout_ms < cfg.uplink_retry_spacing_ms {
        return Err(ConfigError::ValidationFailed(
            "connect_timeout_ms must exceed the retry spacing",
        ));
    }
    if !(100..=10_000).contains(&cfg.response_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "response_timeout_ms must be 100-10000",
        ));
    }
    if !(1..=100).contains(&cfg.max_stored_batches) {
        return Err(ConfigError::ValidationFailed(
            "max_stored_batches must be 1-100",
        ));
    }
    if !(1_000..=600_000).contains(&cfg.retry_backoff_ms) {
        return Err(ConfigError::ValidationFailed(
            "retry_backoff_ms must be 1000-600000",
        ));
    }
    if !(1..=10).contains(&cfg.retry_max_attempts) {
        return Err(ConfigError::ValidationFailed(
            "retry_max_attempts must be 1-10",
        ));
    }
    if cfg.data_silence_threshold_ms <= cfg.batch_window_ms {
        return Err(ConfigError::ValidationFailed(
            "data_silence_threshold_ms must exceed the batch window",
        ));
    }
    Ok(())
}

impl ConfigPort for EepromAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            if let Some(bytes) = self.config_blob.borrow().as_ref() {
                let cfg: SystemConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("Eeprom: loaded config from store");
                Ok(cfg)
            } else {
                info!("Eeprom: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let key = b"syscfg\0";
                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: SystemConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("Eeprom: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("Eeprom: no stored config, using defaults");
                    Ok(SystemConfig::default())
                }
                Err(e) => {
                    log::warn!("Eeprom: NVS read error {e}, using defaults");
                    Ok(SystemConfig::default())
                }
            }
        }
    }

    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            *self.config_blob.borrow_mut() = Some(bytes);
            info!("Eeprom: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let key = b"syscfg\0";
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("Eeprom: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    log::warn!("Eeprom: NVS write error {e}");
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}
