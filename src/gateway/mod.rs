//! Gateway-node subsystem: accept batches from the sensor link, relay
//! them to the backend, and persist what the backend will not take
//! until it does.
//!
//! ```text
//!  sensor link ──▶ server ──▶ ingest queue ──▶ processor ──▶ backend
//!                                                  │ failure    ▲
//!                                                  ▼            │
//!                                             flash store ──▶ retry
//! ```

pub mod backend;
pub mod ingest;
pub mod processor;
pub mod retry;
pub mod server;
pub mod store;
