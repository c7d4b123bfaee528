//! Linear calibration and believability ranges for acquired readings.

use serde::{Deserialize, Serialize};

/// Linear correction `real = a * measured + b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCalibration {
    /// Gain.
    #[serde(default = "unit_gain")]
    pub a: f64,
    /// Offset.
    #[serde(default)]
    pub b: f64,
}

fn unit_gain() -> f64 {
    1.0
}

impl Default for LinearCalibration {
    fn default() -> Self {
        Self { a: 1.0, b: 0.0 }
    }
}

impl LinearCalibration {
    /// Create a calibration with the given gain and offset.
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Apply the correction to a measured value.
    pub fn apply(&self, measured: f64) -> f64 {
        self.a * measured + self.b
    }

    /// Whether this calibration leaves values untouched.
    pub fn is_identity(&self) -> bool {
        self.a == 1.0 && self.b == 0.0
    }

    /// Reject non-finite coefficients and a zero gain.
    pub fn validate(&self) -> Result<(), String> {
        if !self.a.is_finite() || !self.b.is_finite() {
            return Err(format!(
                "calibration coefficients must be finite (a={}, b={})",
                self.a, self.b
            ));
        }
        if self.a == 0.0 {
            return Err("calibration gain must not be zero".into());
        }
        Ok(())
    }
}

/// Inclusive range of believable values.
///
/// Values outside the range are still recorded; the caller flags them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    /// Lowest believable value.
    pub min: f64,
    /// Highest believable value.
    pub max: f64,
}

impl ValidRange {
    /// Create a range.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies inside the range (bounds included).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check the bounds are ordered and finite.
    pub fn validate(&self) -> Result<(), String> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err("valid range bounds must be finite".into());
        }
        if self.min > self.max {
            return Err(format!(
                "valid range min ({}) exceeds max ({})",
                self.min, self.max
            ));
        }
        Ok(())
    }
}
