//! Configuration loading using Figment.
//!
//! Settings are read from a TOML file and then overridden by environment
//! variables prefixed with `PIT_`. Nested keys are separated by a double
//! underscore, so `PIT_PROTOCOL__MAX_ATTEMPTS=5` sets `protocol.max_attempts`.
//!
//! The core components take the validated sub-structures; only binaries
//! deal with [`Settings`] as a whole.
//!
//! # Example
//! ```no_run
//! use pressure_integrity::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load_from("config/pit.toml")?;
//! println!("Instrument on {}", settings.instrument.port);
//! # Ok(())
//! # }
//! ```

use crate::acquisition::AcquisitionConfig;
use crate::analysis::containment::ContainmentConfig;
use crate::analysis::leak_rate::ToleranceConfig;
use crate::error::ConfigError;
use crate::measurement::units::PressureUnit;
use crate::protocol::engine::ProtocolConfig;
use crate::protocol::frame::FramingConfig;
use crate::tracing_setup::{parse_log_level, OutputFormat};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/pit.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PIT_";

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial connection to the instrument.
    pub instrument: InstrumentConfig,
    /// Wire framing.
    #[serde(default)]
    pub framing: FramingConfig,
    /// Retry and timeout policy.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Leak-rate acceptance thresholds.
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    /// Polling loop.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Two-point containment leakage; disabled when absent.
    #[serde(default)]
    pub containment: Option<ContainmentConfig>,
}

/// Application-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name, used in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Unit the instrument reports pressures in.
    #[serde(default = "default_pressure_unit")]
    pub pressure_unit: PressureUnit,
}

fn default_name() -> String {
    "pressure-integrity".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_pressure_unit() -> PressureUnit {
    PressureUnit::Kilopascal
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` plus environment overrides, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Settings = Self::figment(path.as_ref()).extract()?;
        settings.validate().map_err(ConfigError::Validation)?;
        Ok(settings)
    }

    /// The provider chain, for callers that want to merge more sources.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), String> {
        parse_log_level(&self.application.log_level)?;

        if self.instrument.port.trim().is_empty() {
            return Err("instrument.port must not be empty".into());
        }
        if self.instrument.baud_rate == 0 {
            return Err("instrument.baud_rate must be positive".into());
        }

        self.framing
            .validate()
            .map_err(|e| format!("framing: {}", e))?;
        self.protocol
            .validate()
            .map_err(|e| format!("protocol: {}", e))?;
        self.tolerance
            .validate()
            .map_err(|e| format!("tolerance: {}", e))?;
        self.acquisition
            .validate()
            .map_err(|e| format!("acquisition: {}", e))?;

        if let Some(containment) = &self.containment {
            if !(containment.gas_constant > 0.0 && containment.gas_constant.is_finite()) {
                return Err("containment.gas_constant must be positive".into());
            }
            if !containment.ambient_temperature_c.is_finite() {
                return Err("containment.ambient_temperature_c must be finite".into());
            }
        }

        Ok(())
    }
}
