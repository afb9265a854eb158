//! # Calibration Module
//!
//! Converts raw ADC counts into physical units.
//!
//! ## Linear Calibration
//!
//! Each channel maps counts to a physical value with a straight line:
//!
//! `value = counts * slope + offset`
//!
//! Slope and offset come from the configuration, or from a least-squares fit
//! over reference points taken with a known input.
//!
//! ## Smoothing
//!
//! An exponential moving average reduces ADC noise:
//!
//! `filtered = filtered * (1 - alpha) + raw * alpha`
//!
//! - `alpha = 1.0`: no smoothing
//! - `alpha = 0.1`: heavy smoothing (default)
//!
//! ## Usage
//!
//! ```
//! use sensor_uplink::sampling::calibration::{least_squares, LinearCalibration};
//!
//! let points = [(0.0, 0.5), (1000.0, 1.5), (2000.0, 2.5)];
//! let cal = least_squares(&points)?;
//!
//! assert!((cal.slope() - 0.001).abs() < 1e-12);
//! assert!((cal.apply(3000.0) - 3.5).abs() < 1e-9);
//! # Ok::<(), sensor_uplink::sampling::calibration::CalibrationError>(())
//! ```

use thiserror::Error;

/// Minimum number of reference points for a fit
pub const MIN_CALIBRATION_POINTS: usize = 3;

/// Errors from calibration fitting
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CalibrationError {
    /// Not enough reference points
    #[error("Need at least {needed} calibration points, got {got}")]
    TooFewPoints { got: usize, needed: usize },

    /// A reference point is NaN or infinite
    #[error("Calibration point {0} is not finite")]
    NonFinite(usize),
}

/// Straight-line mapping from counts to physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    slope: f64,
    offset: f64,
}

impl Default for LinearCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

impl LinearCalibration {
    /// Creates a calibration from slope and offset.
    #[must_use]
    pub fn new(slope: f64, offset: f64) -> Self {
        Self { slope, offset }
    }

    /// Slope 1, offset 0: the output is the raw count.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            slope: 1.0,
            offset: 0.0,
        }
    }

    #[must_use]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    #[must_use]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Applies `x * slope + offset`.
    #[inline]
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        x * self.slope + self.offset
    }
}

/// Fits a line through `(counts, physical)` points by least squares.
///
/// If every point has the same `counts` value the slope is undefined; the
/// result is then a flat line at the mean physical value.
///
/// # Arguments
///
/// * `points` - Reference points, at least [`MIN_CALIBRATION_POINTS`]
///
/// # Returns
///
/// * `Result<LinearCalibration, CalibrationError>` - Fitted calibration
///
/// # Errors
///
/// Returns error if there are too few points or any coordinate is not finite
pub fn least_squares(points: &[(f64, f64)]) -> Result<LinearCalibration, CalibrationError> {
    if points.len() < MIN_CALIBRATION_POINTS {
        return Err(CalibrationError::TooFewPoints {
            got: points.len(),
            needed: MIN_CALIBRATION_POINTS,
        });
    }

    if let Some(i) = points
        .iter()
        .position(|(x, y)| !x.is_finite() || !y.is_finite())
    {
        return Err(CalibrationError::NonFinite(i));
    }

    let n = points.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return Ok(LinearCalibration::new(0.0, sum_y / n));
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let offset = (sum_y - slope * sum_x) / n;
    Ok(LinearCalibration::new(slope, offset))
}

/// One exponential moving average step.
///
/// The first sample (no previous value) seeds the filter unchanged.
#[inline]
#[must_use]
pub fn ema_step(previous: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match previous {
        None => sample,
        Some(prev) => prev * (1.0 - alpha) + sample * alpha,
    }
}
