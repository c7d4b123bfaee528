//! Command/response protocol engine.
//!
//! Gives request/response semantics over a half-duplex serial channel:
//!
//! - one outstanding command at a time; a second caller gets
//!   [`ProtocolError::Busy`] immediately and the outstanding command is not
//!   disturbed;
//! - every attempt clears the decoder, drains stale input, writes the command
//!   and waits for the next frame, bounded by the per-attempt timeout;
//! - timeouts, corrupt frames and unexpected responses are attempt failures,
//!   retried up to [`ProtocolConfig::max_attempts`]; I/O errors and
//!   end-of-stream are fatal at once;
//! - a raised [`CancelSignal`] abandons the wait with
//!   [`ProtocolError::Cancelled`].
//!
//! The port and decoder live in a slot that a command takes out for its whole
//! exchange and puts back on drop, so no lock is held across an await and the
//! engine returns to [`EngineState::Idle`] even when the caller drops the future.

use crate::error::{AttemptFailure, ProtocolError};
use crate::protocol::cancel::CancelSignal;
use crate::protocol::command::{CommandRequest, RuskaCommand};
use crate::protocol::frame::{FrameDecoder, FramingConfig};
use crate::protocol::response::{DecodedReading, ReadingLimits, Response};
use crate::transport::{drain_pending, DynSerial, SerialPortIO};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

const READ_CHUNK: usize = 256;

/// Retry/timeout policy and decode limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Attempts per command, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-attempt response timeout in milliseconds.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    /// Fixed pause between attempts in milliseconds.
    #[serde(default)]
    pub retry_backoff_ms: u64,
    /// How long to keep draining stale input before a write, in milliseconds.
    /// Zero drains only what is immediately readable.
    #[serde(default)]
    pub drain_window_ms: u64,
    /// Reportable pressure range.
    #[serde(default)]
    pub limits: ReadingLimits,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_response_timeout() -> u64 {
    1000
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            response_timeout_ms: default_response_timeout(),
            retry_backoff_ms: 0,
            drain_window_ms: 0,
            limits: ReadingLimits::default(),
        }
    }
}

impl ProtocolConfig {
    /// Per-attempt timeout.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Pause between attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Drain window before each write.
    pub fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_window_ms)
    }

    /// Check the policy is usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.response_timeout_ms == 0 {
            return Err("response_timeout_ms must be positive".into());
        }
        self.limits.validate()
    }

    /// Worst-case duration of one `send`.
    pub fn worst_case_latency(&self, timeout: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        timeout * attempts + self.retry_backoff() * (attempts - 1)
    }
}

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No command outstanding.
    Idle,
    /// A command was written and its response is awaited.
    AwaitingResponse,
    /// An attempt failed; the next one is about to start.
    Retrying,
}

struct EngineIo {
    port: DynSerial,
    decoder: FrameDecoder,
}

struct Slot {
    state: EngineState,
    io: Option<EngineIo>,
}

/// Request/response engine bound to one instrument channel.
pub struct ProtocolEngine {
    slot: Mutex<Slot>,
    config: ProtocolConfig,
    framing: FramingConfig,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("framing", &self.framing)
            .finish()
    }
}

/// An exchange in progress. Owns the port until dropped.
struct Exchange<'a> {
    engine: &'a ProtocolEngine,
    io: Option<EngineIo>,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        let mut slot = self.engine.slot.lock();
        if let Some(io) = self.io.take() {
            slot.io = Some(io);
        }
        slot.state = EngineState::Idle;
    }
}

impl ProtocolEngine {
    /// Create an engine over `port`.
    pub fn new<P: SerialPortIO + 'static>(
        port: P,
        config: ProtocolConfig,
        framing: FramingConfig,
    ) -> Self {
        Self::from_dyn(Box::new(port), config, framing)
    }

    /// Create an engine over an already boxed port.
    pub fn from_dyn(port: DynSerial, config: ProtocolConfig, framing: FramingConfig) -> Self {
        let decoder = FrameDecoder::new(framing.clone());
        Self {
            slot: Mutex::new(Slot {
                state: EngineState::Idle,
                io: Some(EngineIo { port, decoder }),
            }),
            config,
            framing,
        }
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.slot.lock().state
    }

    /// Retry policy in use.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Framing in use.
    pub fn framing(&self) -> &FramingConfig {
        &self.framing
    }

    /// Send `request` and wait for its response, retrying per the policy.
    pub async fn send(
        &self,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<Response, ProtocolError> {
        self.send_with_cancel(request, timeout, &CancelSignal::never())
            .await
    }

    /// [`send`](Self::send) that gives up as soon as `cancel` is raised.
    ///
    /// Bytes already written are not retracted; the instrument may still act
    /// on the command.
    #[instrument(skip(self, request, cancel), fields(cmd = %request))]
    pub async fn send_with_cancel(
        &self,
        request: &CommandRequest,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<Response, ProtocolError> {
        let mut exchange = self.begin()?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(cmd = %request, "Command cancelled while awaiting response");
                Err(ProtocolError::Cancelled)
            }
            result = self.run_attempts(&mut exchange, request, timeout) => result,
        }
    }

    /// Send a pressure-bearing command and return its reading.
    ///
    /// Fails with [`ProtocolError::UnexpectedResponse`] when the instrument
    /// answers without a pressure (e.g. `PT,?`).
    pub async fn read_pressure(
        &self,
        command: RuskaCommand,
        timeout: Duration,
    ) -> Result<DecodedReading, ProtocolError> {
        self.read_pressure_with_cancel(command, timeout, &CancelSignal::never())
            .await
    }

    /// [`read_pressure`](Self::read_pressure) honoring `cancel`.
    pub async fn read_pressure_with_cancel(
        &self,
        command: RuskaCommand,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<DecodedReading, ProtocolError> {
        let request = CommandRequest::new(command);
        match self.send_with_cancel(&request, timeout, cancel).await? {
            Response::Pressure(reading) => Ok(reading),
            other => Err(ProtocolError::UnexpectedResponse {
                command: command.id(),
                response: format!("{:?}", other),
            }),
        }
    }

    fn begin(&self) -> Result<Exchange<'_>, ProtocolError> {
        let mut slot = self.slot.lock();
        let io = slot.io.take().ok_or(ProtocolError::Busy)?;
        slot.state = EngineState::AwaitingResponse;
        Ok(Exchange {
            engine: self,
            io: Some(io),
        })
    }

    fn set_state(&self, state: EngineState) {
        self.slot.lock().state = state;
    }

    async fn run_attempts(
        &self,
        exchange: &mut Exchange<'_>,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<Response, ProtocolError> {
        let io = exchange.io.as_mut().ok_or(ProtocolError::Busy)?;
        let command = request.command();
        let wire = request.encode(&self.framing);
        let echo = request.payload();
        let max_attempts = self.config.max_attempts.max(1);
        let backoff = self.config.retry_backoff();

        let mut last_failure = AttemptFailure::NoResponse;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.set_state(EngineState::Retrying);
                tracing::debug!(
                    cmd = %request,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying command"
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                self.set_state(EngineState::AwaitingResponse);
            }

            match self
                .attempt(io, command, &wire, &echo, timeout)
                .await?
            {
                Ok(response) => {
                    tracing::trace!(cmd = %request, attempt, "Command succeeded");
                    return Ok(response);
                }
                Err(failure) => {
                    tracing::debug!(
                        cmd = %request,
                        attempt,
                        error = %failure,
                        "Command attempt failed"
                    );
                    last_failure = failure;
                }
            }
        }

        tracing::warn!(
            cmd = %request,
            attempts = max_attempts,
            cause = %last_failure,
            "Command failed, retries exhausted"
        );
        Err(ProtocolError::CommandFailed {
            command: command.id(),
            attempts: max_attempts,
            cause: last_failure,
        })
    }

    /// One write/wait cycle. The outer error is fatal; the inner one is retryable.
    async fn attempt(
        &self,
        io: &mut EngineIo,
        command: RuskaCommand,
        wire: &[u8],
        echo: &str,
        timeout: Duration,
    ) -> Result<Result<Response, AttemptFailure>, ProtocolError> {
        io.decoder.clear();
        let drained = drain_pending(&mut io.port, self.config.drain_window()).await;
        if drained.closed {
            return Err(ProtocolError::Disconnected);
        }
        if drained.discarded > 0 {
            tracing::debug!(
                bytes = drained.discarded,
                "Discarded stale input before command"
            );
        }

        io.port.write_all(wire).await?;
        io.port.flush().await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            while let Some(item) = io.decoder.next_frame() {
                let frame = match item {
                    Ok(frame) => frame,
                    Err(e) => return Ok(Err(AttemptFailure::Decode(e))),
                };
                if frame.as_str() == echo {
                    tracing::trace!(echo = %frame, "Skipping command echo");
                    continue;
                }
                tracing::trace!(frame = %frame, "Received frame");
                return Ok(Response::decode(command, &frame, &self.config.limits)
                    .map_err(AttemptFailure::from));
            }

            match tokio::time::timeout_at(deadline, io.port.read(&mut buf)).await {
                Err(_) => return Ok(Err(AttemptFailure::NoResponse)),
                Ok(Ok(0)) => return Err(ProtocolError::Disconnected),
                Ok(Ok(n)) => io.decoder.feed(&buf[..n]),
                Ok(Err(e)) => return Err(ProtocolError::Transport(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::FramingConfig;
    use crate::transport::mock_serial;

    fn engine(port: mock_serial::MockSerialPort) -> ProtocolEngine {
        ProtocolEngine::new(port, ProtocolConfig::default(), FramingConfig::default())
    }

    #[tokio::test]
    async fn pressure_round_trip() {
        let (port, mut instrument) = mock_serial::new();
        let engine = engine(port);

        let responder = tokio::spawn(async move {
            instrument.expect_and_respond(b"PA\r", b"PA,101.325\r\n").await;
            instrument
        });

        let reading = engine
            .read_pressure(RuskaCommand::Pressure, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(reading.pressure, 101.325);
        assert_eq!(engine.state(), EngineState::Idle);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn echo_is_skipped() {
        let (port, instrument) = mock_serial::new();
        let engine = engine(port);

        let task = tokio::spawn(async move {
            let mut instrument = instrument;
            instrument.expect_and_respond(b"ET\r", b"ET\rET,42\r").await;
            instrument
        });

        let response = engine
            .send(
                &CommandRequest::new(RuskaCommand::ElapsedTime),
                Duration::from_millis(500),
            )
            .await
            .unwrap();
        assert_eq!(response, Response::ElapsedTime(Duration::from_millis(4_200)));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn tare_unavailable_is_unexpected_for_read_pressure() {
        let (port, mut instrument) = mock_serial::new();
        let engine = engine(port);

        let task = tokio::spawn(async move {
            instrument.expect_and_respond(b"PT\r", b"PT,?\r").await;
            instrument
        });

        let err = engine
            .read_pressure(RuskaCommand::TaredPressure, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedResponse { command: "PT", .. }
        ));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_port_is_disconnected() {
        let (port, instrument) = mock_serial::new();
        let engine = engine(port);
        drop(instrument);

        let err = engine
            .send(
                &CommandRequest::new(RuskaCommand::Pressure),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Disconnected));
        assert!(err.is_fatal());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn worst_case_latency_counts_backoff_between_attempts() {
        let config = ProtocolConfig {
            retry_backoff_ms: 10,
            ..ProtocolConfig::default()
        };
        assert_eq!(
            config.worst_case_latency(Duration::from_millis(100)),
            Duration::from_millis(320)
        );
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let config = ProtocolConfig {
            max_attempts: 0,
            ..ProtocolConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
