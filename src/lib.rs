//! Coldtrace firmware library.
//!
//! Two-tier cold-chain telemetry pipeline: a DHT sensor node batches
//! temperature/humidity readings and forwards them over the local link;
//! the gateway node relays batches to the backend and persists
//! undeliverable ones to flash until delivery succeeds.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod config;
pub mod median;
pub mod ports;
pub mod reading;
pub mod thresholds;
pub mod timefmt;
pub mod wire;

pub mod gateway;
pub mod sensor;

mod error;
pub use error::Error;

// Adapters compile on both targets; the platform branches are guarded
// by cfg attributes inside each module.
pub mod adapters;
