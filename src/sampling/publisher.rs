//! # Publisher Module
//!
//! Turns one collection cycle into a record and hands it to the sender.
//!
//! ## Record Layout
//!
//! ```text
//! measurements,source=instrumentacao A0=1.234000,A1=0.512000,latitude=-23.550000,... 1700000000
//! ```
//!
//! - One double field per enabled channel with a current reading, keyed by
//!   channel id
//! - `latitude`, `longitude`, `altitude`, `speed` from the GPS fix, each only
//!   if finite
//! - Timestamp is the wall clock at publish time, in seconds

use super::channel::Channel;
use super::sampler::GpsFix;
use crate::config::SamplingConfig;
use crate::error::Result;
use crate::line_protocol::{LineProtocolBuilder, LineProtocolError, Record};
use crate::sender::Sender;
use tracing::debug;

/// Builds records from channel state
#[derive(Debug)]
pub struct Publisher {
    builder: LineProtocolBuilder,
    measurement: String,
    source: String,
}

impl Publisher {
    /// Creates a publisher using the configured measurement and source tag.
    pub fn new(sampling: &SamplingConfig) -> Self {
        Self {
            builder: LineProtocolBuilder::new(),
            measurement: sampling.measurement.clone(),
            source: sampling.source_tag.clone(),
        }
    }

    /// Builds the record for one cycle.
    ///
    /// # Arguments
    ///
    /// * `channels` - Channel state after collection
    /// * `gps` - Last valid fix, if any
    ///
    /// # Returns
    ///
    /// * `Result<Record>` - Finalized record with the current timestamp
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no channel has a reading and there is no GPS
    /// fix, since a record needs at least one field
    pub fn build(&mut self, channels: &[Channel], gps: Option<&GpsFix>) -> Result<Record> {
        self.builder.reset();
        self.builder.set_measurement(&self.measurement)?;
        self.builder.add_tag("source", &self.source)?;

        for channel in channels.iter().filter(|c| c.is_enabled()) {
            if let Some(value) = channel.calibrated_value() {
                match self.builder.add_field_double(channel.id(), value) {
                    Ok(()) => {}
                    // Calibration overflow; leave this channel out
                    Err(LineProtocolError::InvalidParam) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if let Some(fix) = gps {
            for (key, value) in [
                ("latitude", fix.latitude),
                ("longitude", fix.longitude),
                ("altitude", fix.altitude),
                ("speed", fix.speed),
            ] {
                if value.is_finite() {
                    self.builder.add_field_double(key, value)?;
                }
            }
        }

        self.builder.set_timestamp_now()?;
        Ok(self.builder.copy()?)
    }

    /// Builds the record for one cycle and submits it to `sender`.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be built; nothing is submitted then
    pub fn publish(
        &mut self,
        channels: &[Channel],
        gps: Option<&GpsFix>,
        sender: &Sender,
    ) -> Result<()> {
        let record = self.build(channels, gps)?;
        debug!(bytes = record.len(), "Publishing record");
        sender.submit(record);
        Ok(())
    }
}
