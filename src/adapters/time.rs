//! Clock adapter.
//!
//! - **`target_os = "espidf"`** — monotonic time wraps
//!   `esp_timer_get_time()`; wall time comes from `gettimeofday` and is
//!   reported only once SNTP has plausibly synced it.
//! - **other targets** — `std::time::Instant` / `SystemTime` for host
//!   tests and simulation.

use crate::ports::{MonotonicClock, WallClock};

/// Wall-clock values before 2020-01-01 mean "never synced".
const EPOCH_2020: u64 = 1_577_836_800;

pub struct TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

impl Default for TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for TimeAdapter {
    #[cfg(target_os = "espidf")]
    fn millis(&self) -> u32 {
        ((unsafe { esp_idf_svc::sys::esp_timer_get_time() }) / 1000) as u32
    }

    #[cfg(not(target_os = "espidf"))]
    fn millis(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

impl WallClock for TimeAdapter {
    #[cfg(target_os = "espidf")]
    fn epoch_seconds(&self) -> Option<u32> {
        let mut tv = esp_idf_svc::sys::timeval { tv_sec: 0, tv_usec: 0 };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = tv.tv_sec as u64;
        if secs < EPOCH_2020 {
            return None; // obviously unsynced (pre-SNTP)
        }
        u32::try_from(secs).ok()
    }

    #[cfg(not(target_os = "espidf"))]
    fn epoch_seconds(&self) -> Option<u32> {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        if secs < EPOCH_2020 {
            return None;
        }
        u32::try_from(secs).ok()
    }
}
