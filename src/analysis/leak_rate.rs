//! Leak rate estimation from a window of samples.
//!
//! Ordinary least squares of pressure against elapsed seconds, with time taken
//! relative to the first sample of the window. Sums are computed in two passes
//! around the means, which keeps the slope accurate for long windows of large,
//! nearly constant pressures.
//!
//! The residual metric is the mean squared residual (SSR / n), in squared
//! pressure units.

use crate::measurement::sample::MeasurementSample;
use crate::measurement::stream::StreamReader;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a window against the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Slope and fit quality within tolerance.
    Pass,
    /// Slope exceeds the allowed leak rate.
    Fail,
    /// Too few samples or a fit too poor to trust.
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Inconclusive => "INCONCLUSIVE",
        })
    }
}

/// Why a result is inconclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconclusiveReason {
    /// Fewer samples than `min_samples`.
    InsufficientSamples,
    /// All samples share one timestamp.
    ZeroTimeSpread,
    /// Statistics were not finite.
    NonFiniteStatistics,
    /// Residual above the inconclusive ceiling.
    PoorFit,
    /// Residual between `max_residual` and the ceiling with an in-tolerance slope.
    MarginalFit,
}

/// Thresholds for the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Largest allowed |slope| in pressure units per second.
    pub max_leak_rate: f64,
    /// Largest residual metric for a `Pass`.
    pub max_residual: f64,
    /// Residual metric above which the fit is not trusted at all.
    pub inconclusive_residual: f64,
    /// Minimum number of samples for any verdict other than `Inconclusive`.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_min_samples() -> usize {
    3
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            max_leak_rate: 0.01,
            max_residual: 0.01,
            inconclusive_residual: 1.0,
            min_samples: default_min_samples(),
        }
    }
}

impl ToleranceConfig {
    /// Check thresholds are consistent.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("max_leak_rate", self.max_leak_rate),
            ("max_residual", self.max_residual),
            ("inconclusive_residual", self.inconclusive_residual),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be finite and non-negative, got {}", name, value));
            }
        }
        if self.inconclusive_residual < self.max_residual {
            return Err(format!(
                "inconclusive_residual ({}) must not be below max_residual ({})",
                self.inconclusive_residual, self.max_residual
            ));
        }
        if self.min_samples < 2 {
            return Err(format!(
                "min_samples must be at least 2, got {}",
                self.min_samples
            ));
        }
        Ok(())
    }
}

/// Outcome of one estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeakRateResult {
    /// Pressure change per second. `None` when no line could be fitted.
    pub slope: Option<f64>,
    /// Fitted pressure at the first sample.
    pub intercept: Option<f64>,
    /// Mean squared residual.
    pub residual_metric: Option<f64>,
    /// Samples in the window.
    pub sample_count: usize,
    /// Classification.
    pub verdict: Verdict,
    /// Time between first and last sample, in seconds.
    pub window_seconds: f64,
    /// Set when the verdict is `Inconclusive`.
    pub inconclusive_reason: Option<InconclusiveReason>,
}

impl LeakRateResult {
    fn inconclusive(sample_count: usize, window_seconds: f64, reason: InconclusiveReason) -> Self {
        Self {
            slope: None,
            intercept: None,
            residual_metric: None,
            sample_count,
            verdict: Verdict::Inconclusive,
            window_seconds,
            inconclusive_reason: Some(reason),
        }
    }
}

/// Estimate the leak rate of an ordered sample window.
///
/// Pure: identical inputs give bit-identical results.
pub fn estimate(samples: &[MeasurementSample], tolerance: &ToleranceConfig) -> LeakRateResult {
    let n = samples.len();
    let min = tolerance.min_samples.max(2);

    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return LeakRateResult::inconclusive(0, 0.0, InconclusiveReason::InsufficientSamples)
        }
    };
    let origin = first.timestamp;
    let window_seconds = last.seconds_since(origin);

    if n < min {
        return LeakRateResult::inconclusive(n, window_seconds, InconclusiveReason::InsufficientSamples);
    }

    let nf = n as f64;
    let mean_t = samples.iter().map(|s| s.seconds_since(origin)).sum::<f64>() / nf;
    let mean_p = samples.iter().map(|s| s.pressure).sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for s in samples {
        let dt = s.seconds_since(origin) - mean_t;
        sxx += dt * dt;
        sxy += dt * (s.pressure - mean_p);
    }

    if sxx == 0.0 {
        return LeakRateResult::inconclusive(n, window_seconds, InconclusiveReason::ZeroTimeSpread);
    }

    let slope = sxy / sxx;
    let intercept = mean_p - slope * mean_t;

    let ssr: f64 = samples
        .iter()
        .map(|s| {
            let fitted = intercept + slope * s.seconds_since(origin);
            let r = s.pressure - fitted;
            r * r
        })
        .sum();
    let residual_metric = ssr / nf;

    if !slope.is_finite() || !intercept.is_finite() || !residual_metric.is_finite() {
        return LeakRateResult::inconclusive(
            n,
            window_seconds,
            InconclusiveReason::NonFiniteStatistics,
        );
    }

    let (verdict, inconclusive_reason) = if residual_metric > tolerance.inconclusive_residual {
        (Verdict::Inconclusive, Some(InconclusiveReason::PoorFit))
    } else if slope.abs() > tolerance.max_leak_rate {
        (Verdict::Fail, None)
    } else if residual_metric <= tolerance.max_residual {
        (Verdict::Pass, None)
    } else {
        (Verdict::Inconclusive, Some(InconclusiveReason::MarginalFit))
    };

    LeakRateResult {
        slope: Some(slope),
        intercept: Some(intercept),
        residual_metric: Some(residual_metric),
        sample_count: n,
        verdict,
        window_seconds,
        inconclusive_reason,
    }
}

/// Estimator bound to a tolerance and an optional trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakRateEstimator {
    /// Thresholds.
    pub tolerance: ToleranceConfig,
    /// Number of most recent samples to use; `None` uses the whole series.
    pub window: Option<usize>,
}

impl LeakRateEstimator {
    /// Estimator over the whole series.
    pub fn new(tolerance: ToleranceConfig) -> Self {
        Self {
            tolerance,
            window: None,
        }
    }

    /// Restrict estimation to the last `window` samples.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = Some(window);
        self
    }

    /// Estimate over `samples`, honoring the window.
    pub fn estimate(&self, samples: &[MeasurementSample]) -> LeakRateResult {
        let start = self
            .window
            .map_or(0, |w| samples.len().saturating_sub(w));
        estimate(&samples[start..], &self.tolerance)
    }

    /// Estimate over the current contents of a stream.
    pub fn evaluate(&self, reader: &StreamReader) -> LeakRateResult {
        let snapshot = reader.snapshot();
        let samples = match self.window {
            Some(w) => snapshot.latest(w),
            None => snapshot.to_vec(),
        };
        estimate(&samples, &self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn series(points: &[(f64, f64)]) -> Vec<MeasurementSample> {
        let t0 = Instant::now();
        points
            .iter()
            .enumerate()
            .map(|(i, &(t, p))| MeasurementSample {
                sequence_number: i as u64,
                timestamp: t0 + Duration::from_secs_f64(t),
                pressure: p,
                temperature: None,
                raw_frame: None,
            })
            .collect()
    }

    fn tolerance(max_leak_rate: f64) -> ToleranceConfig {
        ToleranceConfig {
            max_leak_rate,
            max_residual: 0.01,
            inconclusive_residual: 1.0,
            min_samples: 3,
        }
    }

    #[test]
    fn falling_pressure_fails() {
        let samples = series(&[(0.0, 100.0), (10.0, 99.0), (20.0, 98.0)]);
        let result = estimate(&samples, &tolerance(0.05));
        assert!((result.slope.unwrap() + 0.1).abs() < 1e-12);
        assert!((result.intercept.unwrap() - 100.0).abs() < 1e-9);
        assert!(result.residual_metric.unwrap() < 1e-18);
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(result.sample_count, 3);
        assert!((result.window_seconds - 20.0).abs() < 1e-9);
    }

    #[test]
    fn flat_pressure_at_minimum_count_passes() {
        let samples = series(&[(0.0, 250.0), (1.0, 250.0), (2.0, 250.0)]);
        let result = estimate(&samples, &tolerance(0.0));
        assert_eq!(result.slope, Some(0.0));
        assert_eq!(result.verdict, Verdict::Pass);
        assert_eq!(result.inconclusive_reason, None);
    }

    #[test]
    fn too_few_samples_is_inconclusive() {
        let samples = series(&[(0.0, 100.0), (1.0, 90.0)]);
        let result = estimate(&samples, &tolerance(0.05));
        assert_eq!(result.verdict, Verdict::Inconclusive);
        assert_eq!(result.sample_count, 2);
        assert_eq!(
            result.inconclusive_reason,
            Some(InconclusiveReason::InsufficientSamples)
        );

        let empty = estimate(&[], &tolerance(0.05));
        assert_eq!(empty.sample_count, 0);
        assert_eq!(empty.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn unfitted_results_have_no_statistics_and_compare_equal() {
        let samples = series(&[(0.0, 100.0), (1.0, 90.0)]);
        let a = estimate(&samples, &tolerance(0.05));
        let b = estimate(&samples, &tolerance(0.05));
        assert_eq!(a.slope, None);
        assert_eq!(a.intercept, None);
        assert_eq!(a.residual_metric, None);
        assert_eq!(a, b);

        let json = serde_json::to_value(a).unwrap();
        assert!(json["slope"].is_null());
        assert_eq!(json["sample_count"], 2);
    }

    #[test]
    fn noisy_fit_is_inconclusive_even_with_large_slope() {
        let samples = series(&[
            (0.0, 100.0),
            (1.0, 80.0),
            (2.0, 105.0),
            (3.0, 70.0),
            (4.0, 95.0),
        ]);
        let result = estimate(&samples, &tolerance(0.05));
        assert!(result.residual_metric.unwrap() > 1.0);
        assert_eq!(result.verdict, Verdict::Inconclusive);
        assert_eq!(result.inconclusive_reason, Some(InconclusiveReason::PoorFit));
    }

    #[test]
    fn marginal_fit_with_small_slope_is_inconclusive() {
        let samples = series(&[(0.0, 100.0), (1.0, 100.3), (2.0, 99.7), (3.0, 100.0)]);
        let result = estimate(&samples, &tolerance(0.5));
        let residual = result.residual_metric.unwrap();
        assert!(residual > 0.01 && residual <= 1.0);
        assert_eq!(
            result.inconclusive_reason,
            Some(InconclusiveReason::MarginalFit)
        );
    }

    #[test]
    fn identical_timestamps_are_inconclusive() {
        let samples = series(&[(5.0, 100.0), (5.0, 99.0), (5.0, 98.0)]);
        let result = estimate(&samples, &tolerance(0.05));
        assert_eq!(
            result.inconclusive_reason,
            Some(InconclusiveReason::ZeroTimeSpread)
        );
    }

    #[test]
    fn estimate_is_deterministic() {
        let samples = series(&[
            (0.0, 1013.25),
            (0.5, 1013.2),
            (1.1, 1013.19),
            (1.4, 1013.1),
            (2.0, 1013.05),
        ]);
        let a = estimate(&samples, &tolerance(0.5));
        let b = estimate(&samples, &tolerance(0.5));
        assert_eq!(a, b);
        assert_eq!(a.slope.map(f64::to_bits), b.slope.map(f64::to_bits));
    }

    #[test]
    fn large_offset_does_not_swamp_the_slope() {
        let points: Vec<(f64, f64)> = (0..50)
            .map(|i| (i as f64 * 60.0, 1.0e5 - 0.001 * i as f64 * 60.0))
            .collect();
        let result = estimate(&series(&points), &tolerance(0.01));
        assert!((result.slope.unwrap() + 0.001).abs() < 1e-9);
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn estimator_window_uses_trailing_samples() {
        // Early leak, then stable.
        let samples = series(&[
            (0.0, 110.0),
            (1.0, 105.0),
            (2.0, 100.0),
            (3.0, 100.0),
            (4.0, 100.0),
        ]);
        let estimator = LeakRateEstimator::new(tolerance(0.05)).with_window(3);
        let result = estimator.estimate(&samples);
        assert_eq!(result.sample_count, 3);
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn tolerance_validation() {
        assert!(ToleranceConfig::default().validate().is_ok());
        let bad = ToleranceConfig {
            min_samples: 1,
            ..ToleranceConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = ToleranceConfig {
            inconclusive_residual: 0.001,
            ..ToleranceConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
