//! # Sampling Module
//!
//! Producer side of the uplink: reads sensors and publishes records.
//!
//! This module handles:
//! - Reading ADC channels and GPS through the [`sampler::Sampler`] trait
//! - Retrying failed reads with exponential backoff
//! - Smoothing and calibrating raw counts
//! - Building one record per cycle and submitting it to the sender

pub mod calibration;
pub mod channel;
pub mod collector;
pub mod publisher;
pub mod sampler;

pub use channel::Channel;
pub use collector::{Collector, CycleSummary};
pub use publisher::Publisher;
pub use sampler::{GpsFix, Sampler, SamplerError, SimulatedSampler};
