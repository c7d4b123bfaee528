//! Two-point containment leakage rate (integrated leak rate test form).
//!
//! Each point is turned into a gas density `rho = P / (R * T)`. With the
//! reference density `rho_inf`, the regression variable is
//! `y = ln(rho / rho_inf - 1)` and the leakage rate between two points is
//!
//! ```text
//! L = 8_640_000 * (y1 - y0) / dt * (1 / (1 + e^y0) - 1)      [v/v %/day]
//! ```
//!
//! A point is only usable when `rho > rho_inf`; the rate is undefined for
//! `dt <= 0` or non-finite `y`.

use crate::measurement::sample::MeasurementSample;
use crate::measurement::units::PressureUnit;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Reference density near 0.1 MPa and 300 K, in kg/m³.
pub const RHO_INF: f64 = 1.16144;

/// Seconds per day times 100 (percent).
pub const LEAKAGE_SCALE: f64 = 8_640_000.0;

const ZERO_CELSIUS_K: f64 = 273.15;

/// Gas density in kg/m³, or `None` when the inputs are not physical or the
/// density does not exceed [`RHO_INF`].
pub fn density(pressure_pa: f64, temperature_k: f64, gas_constant: f64) -> Option<f64> {
    if !(pressure_pa > 0.0 && temperature_k > 0.0 && gas_constant > 0.0) {
        return None;
    }
    let rho = pressure_pa / (gas_constant * temperature_k);
    (rho.is_finite() && rho > RHO_INF).then_some(rho)
}

/// Leakage rate in v/v %/day between two densities `dt_secs` apart.
pub fn two_point_leakage(rho_prev: f64, rho_curr: f64, dt_secs: f64) -> Option<f64> {
    let y_prev = (rho_prev / RHO_INF - 1.0).ln();
    let y_curr = (rho_curr / RHO_INF - 1.0).ln();
    if !(dt_secs > 0.0) || !y_prev.is_finite() || !y_curr.is_finite() {
        return None;
    }
    let slope = (y_curr - y_prev) / dt_secs;
    let term = 1.0 / (1.0 + y_prev.exp()) - 1.0;
    Some(LEAKAGE_SCALE * slope * term)
}

/// Result of feeding one point to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeakageUpdate {
    /// The point had no usable density and was ignored.
    Rejected,
    /// First usable point; nothing to compare with yet.
    First,
    /// Two-point leakage rate against the previous usable point.
    Rate(f64),
}

impl LeakageUpdate {
    /// The rate, if one was computed.
    pub fn rate(self) -> Option<f64> {
        match self {
            LeakageUpdate::Rate(rate) => Some(rate),
            _ => None,
        }
    }
}

/// Running two-point leakage over successive points.
#[derive(Debug, Clone, Default)]
pub struct ContainmentLeakageTracker {
    previous: Option<(Instant, f64)>,
}

impl ContainmentLeakageTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one point: pressure in Pa, temperature in K, specific gas constant in J/(kg·K).
    pub fn push(
        &mut self,
        at: Instant,
        pressure_pa: f64,
        temperature_k: f64,
        gas_constant: f64,
    ) -> LeakageUpdate {
        let Some(rho) = density(pressure_pa, temperature_k, gas_constant) else {
            return LeakageUpdate::Rejected;
        };

        let update = match self.previous {
            None => LeakageUpdate::First,
            Some((prev_at, prev_rho)) => {
                let dt = if at >= prev_at {
                    at.duration_since(prev_at).as_secs_f64()
                } else {
                    0.0
                };
                match two_point_leakage(prev_rho, rho, dt) {
                    Some(rate) => LeakageUpdate::Rate(rate),
                    None => return LeakageUpdate::Rejected,
                }
            }
        };
        self.previous = Some((at, rho));
        update
    }

    /// Forget the previous point.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// How to turn stream samples into containment points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainmentConfig {
    /// Unit of the sample pressures.
    pub pressure_unit: PressureUnit,
    /// Specific gas constant in J/(kg·K); dry air by default.
    #[serde(default = "default_gas_constant")]
    pub gas_constant: f64,
    /// Temperature in °C used for samples that carry none.
    #[serde(default = "default_ambient_temperature")]
    pub ambient_temperature_c: f64,
}

fn default_gas_constant() -> f64 {
    287.05
}

fn default_ambient_temperature() -> f64 {
    20.0
}

impl ContainmentConfig {
    /// Config for samples in `pressure_unit` with default gas and ambient temperature.
    pub fn new(pressure_unit: PressureUnit) -> Self {
        Self {
            pressure_unit,
            gas_constant: default_gas_constant(),
            ambient_temperature_c: default_ambient_temperature(),
        }
    }

    /// Two-point rates over an ordered series. Sample temperatures are in °C.
    pub fn leakage_series(&self, samples: &[MeasurementSample]) -> Vec<f64> {
        let mut tracker = ContainmentLeakageTracker::new();
        samples
            .iter()
            .filter_map(|s| {
                let t_c = s.temperature.unwrap_or(self.ambient_temperature_c);
                tracker
                    .push(
                        s.timestamp,
                        self.pressure_unit.to_pascal(s.pressure),
                        t_c + ZERO_CELSIUS_K,
                        self.gas_constant,
                    )
                    .rate()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const R_AIR: f64 = 287.0;
    const T_20C: f64 = 293.15;

    #[test]
    fn density_requires_rho_above_reference() {
        let rho = density(101_325.0, T_20C, R_AIR).unwrap();
        assert!((rho - 101_325.0 / (R_AIR * T_20C)).abs() < 1e-12);
        // Low pressure gives a density below the reference.
        assert_eq!(density(90_000.0, T_20C, R_AIR), None);
        assert_eq!(density(-1.0, T_20C, R_AIR), None);
        assert_eq!(density(101_325.0, 0.0, R_AIR), None);
    }

    #[test]
    fn first_point_has_no_rate_then_falling_pressure_leaks() {
        let mut tracker = ContainmentLeakageTracker::new();
        let t0 = Instant::now();
        assert_eq!(
            tracker.push(t0, 101_325.0, T_20C, R_AIR),
            LeakageUpdate::First
        );
        let update = tracker.push(t0 + Duration::from_secs(1), 101_000.0, T_20C, R_AIR);
        let rate = update.rate().unwrap();
        assert!(rate.is_finite());
        // Density fell, so the leakage is positive.
        assert!(rate > 0.0);
    }

    #[test]
    fn undefined_points_are_rejected() {
        let mut tracker = ContainmentLeakageTracker::new();
        let t0 = Instant::now();
        tracker.push(t0, 101_325.0, T_20C, R_AIR);
        assert_eq!(
            tracker.push(t0, 101_000.0, T_20C, R_AIR),
            LeakageUpdate::Rejected
        );
        assert_eq!(
            tracker.push(t0 + Duration::from_secs(1), 50_000.0, T_20C, R_AIR),
            LeakageUpdate::Rejected
        );
    }

    #[test]
    fn two_point_formula_matches_reference_values() {
        let rho0 = 1.2043;
        let rho1 = 1.2004;
        let y0 = (rho0 / RHO_INF - 1.0_f64).ln();
        let y1 = (rho1 / RHO_INF - 1.0_f64).ln();
        let expected = LEAKAGE_SCALE * (y1 - y0) / 60.0 * (1.0 / (1.0 + y0.exp()) - 1.0);
        let rate = two_point_leakage(rho0, rho1, 60.0).unwrap();
        assert_eq!(rate.to_bits(), expected.to_bits());
        assert_eq!(two_point_leakage(rho0, rho1, 0.0), None);
    }

    #[test]
    fn series_from_kpa_samples() {
        let t0 = Instant::now();
        let samples: Vec<MeasurementSample> = [101.325, 101.2, 101.1]
            .iter()
            .enumerate()
            .map(|(i, &p)| MeasurementSample {
                sequence_number: i as u64,
                timestamp: t0 + Duration::from_secs(60 * i as u64),
                pressure: p,
                temperature: None,
                raw_frame: None,
            })
            .collect();
        let config = ContainmentConfig::new(PressureUnit::Kilopascal);
        let rates = config.leakage_series(&samples);
        assert_eq!(rates.len(), 2);
        assert!(rates.iter().all(|r| *r > 0.0));
    }
}
