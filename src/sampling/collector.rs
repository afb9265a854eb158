//! # Collector Module
//!
//! Reads every enabled channel once per cycle and tracks the GPS position.
//!
//! Failed reads are retried with exponential backoff: attempt `n` waits
//! `read_retry_delay * 2^n` before trying again. A channel that still fails
//! is marked unavailable for this cycle and left out of the record.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::channel::Channel;
use super::sampler::{GpsFix, Sampler, SamplerError};
use crate::config::{ChannelConfig, SamplingConfig};

/// Result of one collection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Channels with a fresh reading
    pub read: usize,

    /// Enabled channels that failed every attempt
    pub failed: usize,
}

/// Drives a [`Sampler`] and keeps per-channel state
pub struct Collector<S: Sampler> {
    sampler: S,
    channels: Vec<Channel>,
    filter_alpha: Option<f64>,
    retries: u32,
    retry_delay: Duration,
    last_fix: Option<GpsFix>,
}

impl<S: Sampler> std::fmt::Debug for Collector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("channels", &self.channels)
            .field("filter_alpha", &self.filter_alpha)
            .field("retries", &self.retries)
            .field("last_fix", &self.last_fix)
            .finish_non_exhaustive()
    }
}

impl<S: Sampler> Collector<S> {
    /// Creates a collector for the configured channels.
    ///
    /// Channel `i` in `channels` is read from sampler input `i`.
    pub fn new(sampler: S, channels: &[ChannelConfig], sampling: &SamplingConfig) -> Self {
        Self {
            sampler,
            channels: channels.iter().map(Channel::from_config).collect(),
            filter_alpha: sampling.filter_enabled.then_some(sampling.filter_alpha),
            retries: sampling.read_retries,
            retry_delay: sampling.read_retry_delay(),
            last_fix: None,
        }
    }

    /// Channel state after the last cycle
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Most recent valid GPS fix
    pub fn last_fix(&self) -> Option<&GpsFix> {
        self.last_fix.as_ref()
    }

    /// Runs one collection cycle.
    ///
    /// Reads every enabled channel, applies the filter when enabled, then
    /// polls the GPS. An invalid or missing fix keeps the previous one.
    pub fn collect(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for index in 0..self.channels.len() {
            if !self.channels[index].is_enabled() {
                continue;
            }

            match self.read_with_retry(index) {
                Ok(raw) => {
                    let channel = &mut self.channels[index];
                    channel.update_raw(raw);
                    if let Some(alpha) = self.filter_alpha {
                        channel.apply_filter(alpha);
                    }
                    summary.read += 1;
                }
                Err(e) => {
                    warn!(channel = self.channels[index].id(), "Channel read failed after retries: {}", e);
                    self.channels[index].mark_unavailable();
                    summary.failed += 1;
                }
            }
        }

        if let Some(fix) = self.sampler.read_gps() {
            if fix.is_valid() {
                self.last_fix = Some(fix);
            } else {
                debug!("Ignoring GPS fix with non-finite components");
            }
        }

        summary
    }

    fn read_with_retry(&mut self, index: usize) -> Result<i32, SamplerError> {
        let mut attempt = 0;
        loop {
            match self.sampler.read_channel(index) {
                Ok(raw) => {
                    if attempt > 0 {
                        debug!(channel = index, attempt, "Channel read succeeded after retry");
                    }
                    return Ok(raw);
                }
                Err(SamplerError::InvalidChannel(i)) => return Err(SamplerError::InvalidChannel(i)),
                Err(e) if attempt >= self.retries => return Err(e),
                Err(e) => {
                    debug!(channel = index, attempt, "Channel read failed, retrying: {}", e);
                    thread::sleep(self.retry_delay * (1u32 << attempt));
                    attempt += 1;
                }
            }
        }
    }
}
