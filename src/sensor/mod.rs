//! Sensor-node subsystem: sample → classify → batch → uplink, with the
//! circular flash log as the degradation path when the uplink is down.

pub mod batch;
pub mod flash_log;
pub mod mock;
pub mod node;
pub mod uplink;
