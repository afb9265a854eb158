//! # Channel Module
//!
//! Live state of one ADC input: configuration, calibration, last raw
//! reading and smoothed value.

use super::calibration::{ema_step, LinearCalibration};
use crate::config::ChannelConfig;

/// One sensor channel
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    id: String,
    unit: String,
    calibration: LinearCalibration,
    enabled: bool,
    raw: Option<i32>,
    filtered: Option<f64>,
}

impl Channel {
    /// Creates a channel with identity calibration and no reading.
    pub fn new(id: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unit: unit.into(),
            calibration: LinearCalibration::identity(),
            enabled: true,
            raw: None,
            filtered: None,
        }
    }

    /// Creates a channel from its configuration entry.
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            id: config.id.clone(),
            unit: config.unit.clone(),
            calibration: LinearCalibration::new(config.slope, config.offset),
            enabled: config.enabled,
            raw: None,
            filtered: None,
        }
    }

    /// Replaces the calibration.
    #[must_use]
    pub fn with_calibration(mut self, calibration: LinearCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn calibration(&self) -> LinearCalibration {
        self.calibration
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Last raw reading, `None` before the first read or after a failed one
    pub fn raw(&self) -> Option<i32> {
        self.raw
    }

    /// Smoothed reading, `None` until the filter has been applied
    pub fn filtered(&self) -> Option<f64> {
        self.filtered
    }

    /// Stores a new raw reading.
    pub fn update_raw(&mut self, raw: i32) {
        self.raw = Some(raw);
    }

    /// Marks the current reading as unavailable.
    ///
    /// The filter state is kept so smoothing resumes where it left off.
    pub fn mark_unavailable(&mut self) {
        self.raw = None;
    }

    /// Feeds the current raw reading through the moving average.
    ///
    /// The first call seeds the filter with the raw value. Does nothing
    /// without a reading.
    pub fn apply_filter(&mut self, alpha: f64) {
        if let Some(raw) = self.raw {
            self.filtered = Some(ema_step(self.filtered, f64::from(raw), alpha));
        }
    }

    /// Calibrated value in physical units.
    ///
    /// Uses the smoothed value when the filter has run, otherwise the raw
    /// reading. Returns `None` if there is no current reading.
    pub fn calibrated_value(&self) -> Option<f64> {
        let raw = self.raw?;
        let input = self.filtered.unwrap_or(f64::from(raw));
        Some(self.calibration.apply(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_new_channel_has_no_value() {
        let channel = Channel::new("A0", "V");
        assert_eq!(channel.id(), "A0");
        assert_eq!(channel.unit(), "V");
        assert!(channel.is_enabled());
        assert_eq!(channel.calibrated_value(), None);
    }

    #[test]
    fn test_from_config() {
        let config = ChannelConfig {
            id: "current".to_string(),
            unit: "A".to_string(),
            slope: 0.5,
            offset: 1.0,
            enabled: false,
        };
        let mut channel = Channel::from_config(&config);
        assert!(!channel.is_enabled());

        channel.update_raw(10);
        assert_eq!(channel.calibrated_value(), Some(6.0));
    }

    #[test]
    fn test_raw_value_used_without_filter() {
        let mut channel =
            Channel::new("A0", "V").with_calibration(LinearCalibration::new(0.000125, 0.0));
        channel.update_raw(16000);
        assert!((channel.calibrated_value().unwrap() - 2.0).abs() < EPSILON);
        assert_eq!(channel.filtered(), None);
    }

    #[test]
    fn test_filtered_value_preferred() {
        let mut channel = Channel::new("A0", "V");
        channel.update_raw(100);
        channel.apply_filter(0.5);
        assert_eq!(channel.filtered(), Some(100.0));

        channel.update_raw(200);
        channel.apply_filter(0.5);
        assert_eq!(channel.calibrated_value(), Some(150.0));
    }

    #[test]
    fn test_filter_seeded_by_zero_reading() {
        let mut channel = Channel::new("A0", "V");
        channel.update_raw(0);
        channel.apply_filter(0.1);
        assert_eq!(channel.filtered(), Some(0.0));

        channel.update_raw(100);
        channel.apply_filter(0.1);
        assert!((channel.filtered().unwrap() - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_unavailable_reading() {
        let mut channel = Channel::new("A0", "V");
        channel.update_raw(100);
        channel.apply_filter(0.5);
        channel.mark_unavailable();

        assert_eq!(channel.calibrated_value(), None);
        // Filter without a reading leaves state untouched
        channel.apply_filter(0.5);
        assert_eq!(channel.filtered(), Some(100.0));
    }
}
