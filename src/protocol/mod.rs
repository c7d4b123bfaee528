//! Ruska serial protocol: framing, typed commands, response decoding and the
//! command/response engine.
//!
//! The layering mirrors the wire: [`FrameDecoder`] turns a byte stream into
//! [`RawFrame`]s, [`Response::decode`] turns a frame into a typed value for a
//! given [`RuskaCommand`], and [`ProtocolEngine`] owns the port and runs the
//! send/await/retry cycle for one outstanding command at a time.

pub mod cancel;
pub mod command;
pub mod engine;
pub mod frame;
pub mod integrity;
pub mod response;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use command::{CommandRequest, ResponseShape, RuskaCommand, UnitSlot};
pub use engine::{EngineState, ProtocolConfig, ProtocolEngine};
pub use frame::{FrameBoundary, FrameDecoder, FramingConfig, RawFrame};
pub use integrity::FrameIntegrity;
pub use response::{DecodedReading, ReadingLimits, Response};
