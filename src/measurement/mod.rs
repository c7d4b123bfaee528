//! Measurement data: samples, the append-only stream, units and calibration.

pub mod calibration;
pub mod sample;
pub mod stream;
pub mod units;

pub use calibration::{LinearCalibration, ValidRange};
pub use sample::{MeasurementSample, SampleRecord};
pub use stream::{MeasurementVectorStream, StreamReader, StreamSnapshot};
pub use units::{PressureUnit, RuskaUnit};
