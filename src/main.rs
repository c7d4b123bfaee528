//! CLI entry point for pressure-integrity acquisition.
//!
//! # Usage
//!
//! Run an acquisition and print the leak-rate report:
//! ```bash
//! pit-acquire --config config/pit.toml acquire --duration-secs 600
//! ```
//!
//! Send a single command to the instrument:
//! ```bash
//! pit-acquire --port /dev/ttyUSB0 send UD,2
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pressure_integrity::acquisition::{AcquisitionSession, StopReason};
use pressure_integrity::analysis::{LeakRateEstimator, LeakRateResult};
use pressure_integrity::config::{Settings, DEFAULT_CONFIG_PATH};
use pressure_integrity::measurement::{MeasurementVectorStream, SampleRecord};
use pressure_integrity::protocol::{cancel_pair, CommandRequest, ProtocolEngine};
use pressure_integrity::tracing_setup::{self, OutputFormat, TracingConfig};
use pressure_integrity::transport::open_serial_async;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pit-acquire")]
#[command(about = "Pressure-integrity acquisition against a Ruska-class instrument", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the serial port from the configuration
    #[arg(long)]
    port: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll pressures, then estimate the leak rate
    Acquire {
        /// Stop after this many seconds (default: until Ctrl-C or the configured duration)
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Include every sample in the report
        #[arg(long)]
        samples: bool,
    },

    /// Send one command, e.g. `PA` or `UD,2`, and print the response
    Send {
        /// Command with comma-separated parameters
        message: String,
    },
}

#[derive(Serialize)]
struct Report {
    port: String,
    pressure_unit: String,
    samples_appended: u64,
    out_of_range: u64,
    failed_reads: u64,
    elapsed_s: f64,
    stop_reason: StopReason,
    leak_rate: LeakRateResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    containment_leakage: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<Vec<SampleRecord>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        settings.instrument.port = port;
    }
    if let Some(format) = cli.format {
        settings.application.log_format = format;
    }

    tracing_setup::init(
        TracingConfig::from_settings(&settings)
            .map_err(anyhow::Error::msg)?
            .with_ansi(settings.application.log_format == OutputFormat::Pretty),
    )
    .map_err(anyhow::Error::msg)?;

    let port = open_serial_async(
        &settings.instrument.port,
        settings.instrument.baud_rate,
        &settings.application.name,
    )
    .await?;
    let engine = ProtocolEngine::new(
        port,
        settings.protocol.clone(),
        settings.framing.clone(),
    );

    match cli.command {
        Commands::Acquire {
            duration_secs,
            samples,
        } => acquire(&settings, &engine, duration_secs, samples).await,
        Commands::Send { message } => send_once(&settings, &engine, &message).await,
    }
}

async fn acquire(
    settings: &Settings,
    engine: &ProtocolEngine,
    duration_secs: Option<u64>,
    include_samples: bool,
) -> Result<()> {
    let mut session =
        AcquisitionSession::new(&settings.acquisition, settings.protocol.response_timeout())
            .map_err(anyhow::Error::msg)?;
    if let Some(secs) = duration_secs {
        session = session.with_duration(Some(Duration::from_secs(secs)));
    }

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping acquisition");
            cancel.cancel();
        }
    });

    let mut stream = MeasurementVectorStream::new();
    let reader = stream.reader();
    let outcome = session
        .run(engine, &mut stream, &signal)
        .await
        .context("Acquisition failed")?;

    let snapshot = reader.snapshot();
    let series = snapshot.to_vec();
    let leak_rate = LeakRateEstimator::new(settings.tolerance).estimate(&series);
    tracing::info!(
        verdict = %leak_rate.verdict,
        slope = ?leak_rate.slope,
        residual = ?leak_rate.residual_metric,
        "Leak rate estimated"
    );

    let report = Report {
        port: settings.instrument.port.clone(),
        pressure_unit: settings.instrument.pressure_unit.symbol().to_string(),
        samples_appended: outcome.samples_appended,
        out_of_range: outcome.out_of_range,
        failed_reads: outcome.failed_reads,
        elapsed_s: outcome.elapsed.as_secs_f64(),
        stop_reason: outcome.stop_reason,
        leak_rate,
        containment_leakage: settings
            .containment
            .map(|containment| containment.leakage_series(&series)),
        samples: include_samples.then(|| SampleRecord::from_samples(&series)),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn send_once(settings: &Settings, engine: &ProtocolEngine, message: &str) -> Result<()> {
    let request = CommandRequest::parse_message(message)?;
    let response = engine
        .send(&request, settings.protocol.response_timeout())
        .await
        .with_context(|| format!("Command {} failed", request))?;
    println!("{} ({}): {:?}", request, request.command().name(), response);
    Ok(())
}
