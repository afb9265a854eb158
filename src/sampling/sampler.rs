//! # Sampler Module
//!
//! Hardware boundary: ADC channel reads and GPS fixes.
//!
//! The pipeline only talks to the [`Sampler`] trait. [`SimulatedSampler`]
//! stands in for the hardware so the uplink can run on any host.

use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// ADS1115 positive full scale in counts
pub const ADC_FULL_SCALE: i32 = 32_767;

/// Errors from the sampling hardware
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplerError {
    /// The channel index does not exist on this sampler
    #[error("Channel {0} does not exist")]
    InvalidChannel(usize),

    /// The device did not return a conversion
    #[error("Read failed on channel {channel}: {reason}")]
    Read { channel: usize, reason: String },
}

/// One GPS position report
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    /// Degrees
    pub latitude: f64,
    /// Degrees
    pub longitude: f64,
    /// Metres above mean sea level
    pub altitude: f64,
    /// Metres per second
    pub speed: f64,
}

impl GpsFix {
    /// A fix is usable only if every component is finite.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.altitude.is_finite()
            && self.speed.is_finite()
    }
}

/// Source of raw readings
#[cfg_attr(test, automock)]
pub trait Sampler: Send {
    /// Number of channels the sampler can read
    fn channel_count(&self) -> usize;

    /// Single conversion on channel `index`, in raw counts
    fn read_channel(&mut self, index: usize) -> Result<i32, SamplerError>;

    /// Latest GPS report, `None` if no new data is available
    fn read_gps(&mut self) -> Option<GpsFix>;
}

/// Hardware-free sampler
///
/// Returns mid-scale counts on every channel and an optional fixed GPS
/// position.
#[derive(Debug, Clone)]
pub struct SimulatedSampler {
    channels: usize,
    value: i32,
    gps: Option<GpsFix>,
}

impl SimulatedSampler {
    /// Creates a sampler with `channels` inputs at mid-scale and no GPS.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            value: ADC_FULL_SCALE / 2 + 1,
            gps: None,
        }
    }

    /// Reports `fix` on every GPS read.
    #[must_use]
    pub fn with_gps(mut self, fix: GpsFix) -> Self {
        self.gps = Some(fix);
        self
    }

    /// Uses `value` instead of mid-scale.
    #[must_use]
    pub fn with_value(mut self, value: i32) -> Self {
        self.value = value;
        self
    }
}

impl Sampler for SimulatedSampler {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn read_channel(&mut self, index: usize) -> Result<i32, SamplerError> {
        if index >= self.channels {
            return Err(SamplerError::InvalidChannel(index));
        }
        Ok(self.value)
    }

    fn read_gps(&mut self) -> Option<GpsFix> {
        self.gps
    }
}
