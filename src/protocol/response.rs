//! Response decoding: validated frame to typed [`Response`].
//!
//! A frame is accepted for a command only when its first field is one of the
//! command's response ids and the field count matches the command's
//! [`ResponseShape`]. Pressure-bearing responses go through the reading checks
//! in [`ReadingLimits`]; a frame failing them is rejected, never turned into a
//! [`DecodedReading`].

use crate::error::ResponseError;
use crate::measurement::units::RuskaUnit;
use crate::protocol::command::{ResponseShape, RuskaCommand};
use crate::protocol::frame::RawFrame;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Instrument-reportable pressure range used on the decode path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingLimits {
    /// Lowest pressure the instrument can report.
    #[serde(default = "default_min_pressure")]
    pub min_pressure: f64,
    /// Highest pressure the instrument can report.
    #[serde(default = "default_max_pressure")]
    pub max_pressure: f64,
}

fn default_min_pressure() -> f64 {
    -1.0e6
}

fn default_max_pressure() -> f64 {
    1.0e6
}

impl Default for ReadingLimits {
    fn default() -> Self {
        Self {
            min_pressure: default_min_pressure(),
            max_pressure: default_max_pressure(),
        }
    }
}

impl ReadingLimits {
    /// Check bounds are finite and ordered.
    pub fn validate(&self) -> Result<(), String> {
        if !self.min_pressure.is_finite() || !self.max_pressure.is_finite() {
            return Err("reading limits must be finite".into());
        }
        if self.min_pressure >= self.max_pressure {
            return Err(format!(
                "min_pressure ({}) must be below max_pressure ({})",
                self.min_pressure, self.max_pressure
            ));
        }
        Ok(())
    }

    fn check(&self, pressure: f64) -> Result<f64, ResponseError> {
        if !pressure.is_finite() {
            return Err(ResponseError::InvalidReading(format!(
                "pressure is not finite ({})",
                pressure
            )));
        }
        if pressure < self.min_pressure || pressure > self.max_pressure {
            return Err(ResponseError::InvalidReading(format!(
                "pressure {} outside reportable range [{}, {}]",
                pressure, self.min_pressure, self.max_pressure
            )));
        }
        Ok(pressure)
    }
}

/// Transducer data carried by `PF`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransducerData {
    /// Transducer frequency.
    pub frequency: f64,
    /// Transducer diode voltage.
    pub diode_voltage: f64,
}

/// Status flags attached to a reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingStatus {
    /// The value is relative to the tare pressure.
    pub tared: bool,
}

/// A validated pressure reading.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    /// Pressure in instrument units. Always finite.
    pub pressure: f64,
    /// Temperature, when the source reports one.
    pub temperature: Option<f64>,
    /// Instrument elapsed-time clock at the reading (`PB`, `PF`).
    pub elapsed: Option<Duration>,
    /// Transducer data (`PF`).
    pub transducer: Option<TransducerData>,
    /// Status flags.
    pub status: ReadingStatus,
    /// Frame the reading was decoded from.
    pub source_frame: Option<RawFrame>,
}

impl DecodedReading {
    /// A reading built outside the decode path (replay, manual entry, tests).
    pub fn new(pressure: f64) -> Self {
        Self {
            pressure,
            temperature: None,
            elapsed: None,
            transducer: None,
            status: ReadingStatus::default(),
            source_frame: None,
        }
    }

    /// Attach a temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Rate period reported by `RP` and implied by `RS`/`RM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePeriod {
    /// Rate per second.
    PerSecond,
    /// Rate per minute.
    PerMinute,
}

/// Pressure medium reported by `MD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureMedium {
    /// Code 0.
    Air,
    /// Code 1.
    Nitrogen,
}

/// Typed response to a read command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// PA, PS, PB, PF and a tared PT.
    Pressure(DecodedReading),
    /// `PT,?`: no tare taken since power-up.
    TareUnavailable,
    /// RS / RM.
    Rate {
        /// Latest rate in current units per period.
        value: f64,
        /// Period the rate refers to.
        period: RatePeriod,
    },
    /// PC, RC, RO, ECHO.
    Flag(bool),
    /// PI, RI.
    Interval(Duration),
    /// RP.
    RatePeriod(RatePeriod),
    /// UN.
    Units(RuskaUnit),
    /// UD.
    UserUnit {
        /// Slot 1-4.
        slot: u8,
        /// Conversion constant relative to kPa.
        factor_kpa: f64,
        /// Front panel abbreviation.
        label: String,
    },
    /// ET.
    ElapsedTime(Duration),
    /// TM, ER, ST.
    Code(i64),
    /// XB, V1, V2.
    Decimal(f64),
    /// MD.
    Medium(PressureMedium),
}

impl Response {
    /// Decode `frame` as the response to `command`.
    pub fn decode(
        command: RuskaCommand,
        frame: &RawFrame,
        limits: &ReadingLimits,
    ) -> Result<Response, ResponseError> {
        let shape = command.response_shape();
        let fields: Vec<&str> = frame.fields().collect();
        let mismatch = || ResponseError::Mismatch {
            expected: shape.label(),
            received: frame.as_str().to_string(),
        };

        let id = fields.first().copied().unwrap_or_default();
        if !command
            .response_ids()
            .iter()
            .any(|known| known.eq_ignore_ascii_case(id))
        {
            return Err(mismatch());
        }
        if fields.len() != shape.field_count() {
            return Err(mismatch());
        }

        match shape {
            ResponseShape::Pressure => {
                let pressure = limits.check(parse_f64(fields[1])?)?;
                Ok(Response::Pressure(reading(pressure, frame)))
            }
            ResponseShape::TaredPressure => {
                if fields[1] == "?" {
                    return Ok(Response::TareUnavailable);
                }
                let pressure = limits.check(parse_f64(fields[1])?)?;
                let mut r = reading(pressure, frame);
                r.status.tared = true;
                Ok(Response::Pressure(r))
            }
            ResponseShape::PressureWithElapsed => {
                let pressure = limits.check(parse_f64(fields[1])?)?;
                let mut r = reading(pressure, frame);
                r.elapsed = Some(parse_tenths(fields[2])?);
                Ok(Response::Pressure(r))
            }
            ResponseShape::PressureWithTransducer => {
                let pressure = limits.check(parse_f64(fields[1])?)?;
                let mut r = reading(pressure, frame);
                r.elapsed = Some(parse_tenths(fields[2])?);
                r.transducer = Some(TransducerData {
                    frequency: parse_finite(fields[3])?,
                    diode_voltage: parse_finite(fields[4])?,
                });
                Ok(Response::Pressure(r))
            }
            ResponseShape::Flag => Ok(Response::Flag(parse_bit(fields[1])?)),
            ResponseShape::Interval => Ok(Response::Interval(parse_tenths(fields[1])?)),
            ResponseShape::Rate => {
                let period = if id.eq_ignore_ascii_case("RM") {
                    RatePeriod::PerMinute
                } else {
                    RatePeriod::PerSecond
                };
                Ok(Response::Rate {
                    value: parse_finite(fields[1])?,
                    period,
                })
            }
            ResponseShape::RatePeriod => Ok(Response::RatePeriod(if parse_bit(fields[1])? {
                RatePeriod::PerMinute
            } else {
                RatePeriod::PerSecond
            })),
            ResponseShape::Units => {
                let code: u8 = fields[1]
                    .parse()
                    .map_err(|_| invalid("units code", fields[1]))?;
                Ok(Response::Units(RuskaUnit::from_code(code)))
            }
            ResponseShape::UserUnit => {
                let slot: u8 = fields[1].parse().map_err(|_| invalid("slot", fields[1]))?;
                if let RuskaCommand::UserUnit(requested) = command {
                    if requested.get() != slot {
                        return Err(mismatch());
                    }
                }
                Ok(Response::UserUnit {
                    slot,
                    factor_kpa: parse_finite(fields[2])?,
                    label: fields[3].to_string(),
                })
            }
            ResponseShape::ElapsedTime => Ok(Response::ElapsedTime(parse_tenths(fields[1])?)),
            ResponseShape::Code => {
                let code: i64 = fields[1].parse().map_err(|_| invalid("code", fields[1]))?;
                Ok(Response::Code(code))
            }
            ResponseShape::Decimal => Ok(Response::Decimal(parse_finite(fields[1])?)),
            ResponseShape::Medium => Ok(Response::Medium(if parse_bit(fields[1])? {
                PressureMedium::Nitrogen
            } else {
                PressureMedium::Air
            })),
        }
    }

    /// The reading, when this response carries a pressure.
    pub fn into_reading(self) -> Option<DecodedReading> {
        match self {
            Response::Pressure(reading) => Some(reading),
            _ => None,
        }
    }
}

fn reading(pressure: f64, frame: &RawFrame) -> DecodedReading {
    DecodedReading {
        source_frame: Some(frame.clone()),
        ..DecodedReading::new(pressure)
    }
}

fn invalid(what: &str, value: &str) -> ResponseError {
    ResponseError::InvalidReading(format!("{} '{}' is not valid", what, value))
}

fn parse_f64(value: &str) -> Result<f64, ResponseError> {
    value.parse::<f64>().map_err(|_| invalid("number", value))
}

fn parse_finite(value: &str) -> Result<f64, ResponseError> {
    let v = parse_f64(value)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(invalid("number", value))
    }
}

fn parse_bit(value: &str) -> Result<bool, ResponseError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(invalid("flag", other)),
    }
}

fn parse_tenths(value: &str) -> Result<Duration, ResponseError> {
    let tenths: u64 = value.parse().map_err(|_| invalid("tenths of seconds", value))?;
    Ok(Duration::from_millis(tenths.saturating_mul(100)))
}
