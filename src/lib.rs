//! # Pressure Integrity Core Library
//!
//! Core of a pressure-integrity test rig: talks to a Ruska-class pressure
//! instrument over a serial link, collects timestamped readings into an
//! append-only measurement stream, and estimates the leak rate of the
//! enclosure under test with a pass/fail verdict.
//!
//! ## Crate Structure
//!
//! - **`error`**: `thiserror` enums for every layer plus the `PitError` aggregate.
//! - **`protocol`**: Frame decoder, typed command set, response decoding and the
//!   single-outstanding-command `ProtocolEngine` with timeouts, retries and
//!   cancellation.
//! - **`transport`**: The `SerialPortIO` abstraction, real serial ports
//!   (feature `serial`) and the `mock_serial` test harness.
//! - **`measurement`**: `MeasurementVectorStream` (single writer, snapshot
//!   readers), samples, pressure units and calibration.
//! - **`analysis`**: Least-squares leak-rate estimation and two-point
//!   containment leakage.
//! - **`acquisition`**: The polling loop tying the engine to the stream.
//! - **`clock`**: Monotonic time source, swappable in tests.
//! - **`config`**: Figment-based settings loading and validation.
//! - **`tracing_setup`**: Subscriber installation for binaries. The library
//!   itself only emits `tracing` events.

pub mod acquisition;
pub mod analysis;
pub mod clock;
pub mod config;
pub mod error;
pub mod measurement;
pub mod protocol;
pub mod tracing_setup;
pub mod transport;

pub use error::{PitError, PitResult};
