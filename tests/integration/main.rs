//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a slice of the
//! pipeline against mock adapters. All tests run on the host with no
//! real hardware or network required.

mod end_to_end_tests;
mod gateway_pipeline_tests;
mod mock_ports;
mod sensor_pipeline_tests;
