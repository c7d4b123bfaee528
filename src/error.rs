//! Custom error types for the pressure-integrity core.
//!
//! Every layer of the core reports failures through its own `thiserror` enum so
//! callers can match on exactly the cases that layer can produce:
//!
//! ## Error Hierarchy
//!
//! - **`DecodeError`**: Produced by the frame decoder. Both variants are recoverable
//!   by resynchronization and never reach the caller of a command directly; the
//!   protocol engine counts them as failed attempts.
//! - **`ResponseError`**: A frame was received but does not decode into the
//!   response the command expects. Also counted as a failed attempt.
//! - **`ProtocolError`**: Produced by the command/response engine. `Busy` is a
//!   caller error and is never retried, `Cancelled` reflects an external
//!   cancellation signal, `CommandFailed` means the retry budget is exhausted.
//!   A timed-out attempt is an `AttemptFailure::NoResponse` and reaches the
//!   caller only as the cause of `CommandFailed`.
//!   `Transport` and `Disconnected` are fatal for the session.
//! - **`StreamError`**: A reading with a non-finite value was handed to the
//!   measurement stream. This is a caller/decoder bug and is surfaced, not dropped.
//! - **`CommandError`**: A text command (e.g. from an operator console) could not
//!   be turned into a typed [`CommandRequest`](crate::protocol::CommandRequest).
//! - **`ConfigError`**: Configuration loading or validation failed. Only the
//!   configuration layer produces it; the core accepts validated structures.
//!
//! `PitError` consolidates all of the above with `#[from]` conversions so
//! collaborators can use `?` across layers.
//!
//! An `Inconclusive` leak-rate verdict is a normal result value and has no error
//! variant.

use thiserror::Error;

/// Convenience alias for results using the top-level error type.
pub type PitResult<T> = std::result::Result<T, PitError>;

/// Why a terminated frame failed its integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptReason {
    /// A byte outside printable ASCII appeared in a frame without checksum.
    NonAscii { offset: usize, byte: u8 },
    /// The frame carried no `*` checksum separator.
    MissingChecksum,
    /// The checksum suffix had the wrong length or was not hexadecimal.
    MalformedChecksum,
    /// Checksum present and well formed, but wrong.
    Mismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for CorruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptReason::NonAscii { offset, byte } => {
                write!(f, "non-ASCII byte 0x{:02X} at offset {}", byte, offset)
            }
            CorruptReason::MissingChecksum => write!(f, "missing checksum suffix"),
            CorruptReason::MalformedChecksum => write!(f, "malformed checksum suffix"),
            CorruptReason::Mismatch { expected, actual } => write!(
                f,
                "checksum mismatch (expected 0x{:X}, computed 0x{:X})",
                expected, actual
            ),
        }
    }
}

/// Frame-level decode failures. Both are recovered locally by resynchronization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A complete frame was received but failed its integrity check.
    #[error("Corrupt frame ({len} bytes): {reason}")]
    CorruptFrame { reason: CorruptReason, len: usize },

    /// The accumulation buffer grew past its bound without a frame boundary.
    #[error("Frame exceeded {limit} bytes without a terminator")]
    FrameTooLarge { limit: usize },
}

/// A frame arrived for a command but could not be decoded into its response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    /// The frame did not have the shape the command expects (wrong id or field count).
    #[error("expected {expected} response, received {received:?}")]
    Mismatch {
        expected: &'static str,
        received: String,
    },

    /// The frame had the right shape but carried an unusable value.
    #[error("invalid reading: {0}")]
    InvalidReading(String),
}

/// Why a single command attempt failed. Every cause is eligible for retry.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// No frame arrived within the per-attempt timeout.
    NoResponse,
    /// The decoder reported a corrupt or oversized frame while waiting.
    Decode(DecodeError),
    /// A frame arrived but did not decode into the expected response.
    Response(ResponseError),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::NoResponse => write!(f, "no response"),
            AttemptFailure::Decode(e) => write!(f, "{}", e),
            AttemptFailure::Response(e) => write!(f, "{}", e),
        }
    }
}

impl From<DecodeError> for AttemptFailure {
    fn from(err: DecodeError) -> Self {
        AttemptFailure::Decode(err)
    }
}

impl From<ResponseError> for AttemptFailure {
    fn from(err: ResponseError) -> Self {
        AttemptFailure::Response(err)
    }
}

/// Errors surfaced by the command/response protocol engine.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Another command is still awaiting its response. Not retried by the engine.
    #[error("Protocol engine busy: a command is already awaiting its response")]
    Busy,

    /// The wait was abandoned because the cancellation signal was raised. The
    /// command bytes may already have reached the instrument.
    #[error("Command cancelled")]
    Cancelled,

    /// Every attempt failed; `cause` is the failure of the last attempt.
    #[error("Command {command} failed after {attempts} attempt(s): {cause}")]
    CommandFailed {
        command: &'static str,
        attempts: u32,
        cause: AttemptFailure,
    },

    /// The command succeeded but its response does not carry what the caller asked for.
    #[error("Command {command} returned an unexpected response: {response}")]
    UnexpectedResponse {
        command: &'static str,
        response: String,
    },

    /// Writing to or reading from the transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The transport reported end-of-stream.
    #[error("Transport closed by the instrument side")]
    Disconnected,
}

impl ProtocolError {
    /// Whether the cause of a `CommandFailed` was a timeout on the last attempt.
    pub fn is_no_response(&self) -> bool {
        matches!(
            self,
            ProtocolError::CommandFailed {
                cause: AttemptFailure::NoResponse,
                ..
            }
        )
    }

    /// Errors after which the acquisition path must halt and the operator must
    /// check the hardware.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::CommandFailed { .. }
                | ProtocolError::Transport(_)
                | ProtocolError::Disconnected
        )
    }
}

/// Errors raised when appending to the measurement stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Rejected sample: {field} is not finite ({value})")]
    NonFinite { field: &'static str, value: f64 },
}

/// Errors building a typed command from text input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command id '{0}'")]
    UnknownCommand(String),

    #[error("Command {command} takes {expected} parameter(s), got {actual}")]
    ParameterCount {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid value '{value}' for parameter of {command}: {reason}")]
    InvalidParameter {
        command: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration loading/validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Top-level error for collaborators that drive the whole pipeline.
#[derive(Error, Debug)]
pub enum PitError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
