//! Pressure-decay analysis.
//!
//! - [`leak_rate`]: least-squares slope over a window with a pass/fail verdict.
//! - [`containment`]: density-based two-point leakage in v/v %/day.

pub mod containment;
pub mod leak_rate;

pub use containment::{ContainmentConfig, ContainmentLeakageTracker, LeakageUpdate};
pub use leak_rate::{
    estimate, InconclusiveReason, LeakRateEstimator, LeakRateResult, ToleranceConfig, Verdict,
};
