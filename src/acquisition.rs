//! Acquisition session: periodic pressure polling into the measurement stream.
//!
//! One session is the single producer of a [`MeasurementVectorStream`]. Each
//! tick it reads a pressure through the [`ProtocolEngine`], applies the
//! calibration, flags believability-range violations and appends the reading.
//!
//! The session stops when the cancel signal is raised or the configured
//! duration elapses. It halts with an error when the engine reports a fatal
//! failure (retries exhausted, transport error, disconnect) or the stream
//! rejects a reading.

use crate::error::{PitError, ProtocolError};
use crate::measurement::calibration::{LinearCalibration, ValidRange};
use crate::measurement::stream::MeasurementVectorStream;
use crate::protocol::cancel::CancelSignal;
use crate::protocol::command::RuskaCommand;
use crate::protocol::engine::ProtocolEngine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::instrument;

/// Acquisition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Pressure command to poll (`PA`, `PS`, `PT`, `PB` or `PF`).
    #[serde(default = "default_command")]
    pub command: String,
    /// Polling period in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Stop after this many seconds; run until cancelled when absent.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Correction applied to every reading.
    #[serde(default)]
    pub calibration: LinearCalibration,
    /// Believable pressure range; readings outside are kept and counted.
    #[serde(default)]
    pub valid_range: Option<ValidRange>,
}

fn default_command() -> String {
    "PA".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            poll_interval_ms: default_poll_interval(),
            duration_secs: None,
            calibration: LinearCalibration::default(),
            valid_range: None,
        }
    }
}

impl AcquisitionConfig {
    /// The polled command, checked to be pressure-bearing.
    pub fn pressure_command(&self) -> Result<RuskaCommand, String> {
        let command = RuskaCommand::from_id(&self.command)
            .ok_or_else(|| format!("Unknown acquisition command '{}'", self.command))?;
        if !command.response_shape().carries_pressure() {
            return Err(format!(
                "Acquisition command '{}' does not return a pressure",
                command.id()
            ));
        }
        Ok(command)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), String> {
        self.pressure_command()?;
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be positive".into());
        }
        self.calibration.validate()?;
        if let Some(range) = &self.valid_range {
            range.validate()?;
        }
        Ok(())
    }
}

/// Why a session ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The cancel signal was raised.
    Cancelled,
    /// The configured duration elapsed.
    DurationElapsed,
}

/// Summary of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Readings appended to the stream.
    pub samples_appended: u64,
    /// Appended readings outside the valid range.
    pub out_of_range: u64,
    /// Polls that produced no reading without halting the session.
    pub failed_reads: u64,
    /// Wall time of the session.
    pub elapsed: Duration,
    /// How the session ended.
    pub stop_reason: StopReason,
}

/// A configured polling loop.
#[derive(Debug, Clone)]
pub struct AcquisitionSession {
    command: RuskaCommand,
    poll_interval: Duration,
    duration: Option<Duration>,
    response_timeout: Duration,
    calibration: LinearCalibration,
    valid_range: Option<ValidRange>,
}

impl AcquisitionSession {
    /// Build a session from validated settings.
    pub fn new(config: &AcquisitionConfig, response_timeout: Duration) -> Result<Self, String> {
        config.validate()?;
        Ok(Self {
            command: config.pressure_command()?,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            duration: config.duration_secs.map(Duration::from_secs),
            response_timeout,
            calibration: config.calibration,
            valid_range: config.valid_range,
        })
    }

    /// Override the run duration.
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Poll until cancelled, the duration elapses, or a fatal error.
    #[instrument(skip_all, fields(cmd = %self.command))]
    pub async fn run(
        &self,
        engine: &ProtocolEngine,
        stream: &mut MeasurementVectorStream,
        cancel: &CancelSignal,
    ) -> Result<AcquisitionReport, PitError> {
        let started = Instant::now();
        let deadline = self.duration.map(|d| tokio::time::Instant::now() + d);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut samples_appended = 0u64;
        let mut out_of_range = 0u64;
        let mut failed_reads = 0u64;

        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            duration_s = self.duration.map(|d| d.as_secs()),
            "Acquisition started"
        );

        let stop_reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = ticker.tick() => {}
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                break StopReason::DurationElapsed;
            }

            let mut reading = match engine
                .read_pressure_with_cancel(self.command, self.response_timeout, cancel)
                .await
            {
                Ok(reading) => reading,
                Err(ProtocolError::Cancelled) => break StopReason::Cancelled,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Acquisition halted, check the instrument");
                    return Err(e.into());
                }
                Err(e) => {
                    failed_reads += 1;
                    tracing::warn!(error = %e, "Poll produced no reading");
                    continue;
                }
            };

            reading.pressure = self.calibration.apply(reading.pressure);
            let in_range = self
                .valid_range
                .map_or(true, |range| range.contains(reading.pressure));

            let sample = stream.append(reading)?;
            samples_appended += 1;

            if !in_range {
                out_of_range += 1;
                tracing::warn!(
                    seq = sample.sequence_number,
                    pressure = sample.pressure,
                    "Reading outside valid range"
                );
            } else {
                tracing::trace!(
                    seq = sample.sequence_number,
                    pressure = sample.pressure,
                    "Sample appended"
                );
            }
        };

        let report = AcquisitionReport {
            samples_appended,
            out_of_range,
            failed_reads,
            elapsed: started.elapsed(),
            stop_reason,
        };
        tracing::info!(
            samples = report.samples_appended,
            out_of_range = report.out_of_range,
            failed_reads = report.failed_reads,
            reason = ?report.stop_reason,
            "Acquisition stopped"
        );
        Ok(report)
    }
}
