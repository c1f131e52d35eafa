//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                  | Connects to                |
//! |------------|-----------------------------|----------------------------|
//! | `backend`  | BackendPort                 | Backend HTTP endpoint      |
//! | `eeprom`   | SlotStorage, ConfigPort     | NVS blob / in-memory store |
//! | `net`      | WireStream, UplinkSocket    | TCP sockets (std::net)     |
//! | `storage`  | FlashFs                     | LittleFS VFS / in-memory   |
//! | `time`     | MonotonicClock, WallClock   | ESP timer + SNTP clock     |
//! | `wifi`     | ConnectivityPort            | ESP-IDF WiFi / simulation  |
//!
//! Every adapter is dual-target: `target_os = "espidf"` branches talk
//! to the real platform, all other targets get a simulation backend so
//! the full pipeline runs in host tests.

pub mod backend;
pub mod eeprom;
pub mod net;
pub mod storage;
pub mod time;
pub mod wifi;
