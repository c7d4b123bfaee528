//! Measurement samples and their export form.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One accepted reading, as stored in the measurement stream.
///
/// Created only by [`MeasurementVectorStream::append`](super::MeasurementVectorStream::append);
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSample {
    /// Position in the session, starting at 0, gap-free.
    pub sequence_number: u64,
    /// Monotonic capture time, strictly increasing within a session.
    pub timestamp: Instant,
    /// Pressure in instrument units (after calibration, if any).
    pub pressure: f64,
    /// Temperature, when reported.
    pub temperature: Option<f64>,
    /// Frame payload the reading came from, kept for audit.
    pub raw_frame: Option<Bytes>,
}

impl MeasurementSample {
    /// Seconds since `origin`. Negative if `origin` is later.
    pub fn seconds_since(&self, origin: Instant) -> f64 {
        if self.timestamp >= origin {
            self.timestamp.duration_since(origin).as_secs_f64()
        } else {
            -origin.duration_since(self.timestamp).as_secs_f64()
        }
    }
}

/// Serializable form of a sample for report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Sequence number.
    pub sequence_number: u64,
    /// Seconds since the first sample of the exported series.
    pub elapsed_s: f64,
    /// Pressure.
    pub pressure: f64,
    /// Temperature, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl SampleRecord {
    /// Export an ordered series, with time relative to its first sample.
    pub fn from_samples(samples: &[MeasurementSample]) -> Vec<SampleRecord> {
        let Some(origin) = samples.first().map(|s| s.timestamp) else {
            return Vec::new();
        };
        samples
            .iter()
            .map(|s| SampleRecord {
                sequence_number: s.sequence_number,
                elapsed_s: s.seconds_since(origin),
                pressure: s.pressure,
                temperature: s.temperature,
            })
            .collect()
    }
}
