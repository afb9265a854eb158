//! # Sensor Uplink Library
//!
//! Ship ADC and GPS measurements to InfluxDB without losing data when the
//! network goes away.
//!
//! This library provides the core of the uplink:
//! - [`line_protocol`]: validated record building and parsing
//! - [`queue`]: hand-off from the sampling loop to the sender thread
//! - [`sender`]: delivery orchestration (send, or spool on failure)
//! - [`spool`]: durable offline file with compressed batch replay
//! - [`transport`]: HTTP delivery to the InfluxDB v2 write API
//! - [`sampling`]: sensor reads, calibration and record publishing

pub mod config;
pub mod error;
pub mod line_protocol;
pub mod logging;
pub mod queue;
pub mod sampling;
pub mod sender;
pub mod spool;
pub mod transport;
