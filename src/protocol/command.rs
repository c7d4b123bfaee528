//! Ruska read command set.
//!
//! Every read command documented for Ruska-class PPG instruments is a variant of
//! [`RuskaCommand`]. Each variant knows its wire id and the [`ResponseShape`] the
//! instrument answers with, so response matching in the engine is an exhaustive
//! `match` instead of string dispatch.
//!
//! Wire messages are `ID` or `ID,param`, followed by the framing terminator.

use crate::error::CommandError;
use crate::protocol::frame::FramingConfig;
use std::fmt;

/// Slot number of a user-defined unit (`UD,x`), 1 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitSlot(u8);

impl UnitSlot {
    /// Lowest valid slot.
    pub const MIN: u8 = 1;
    /// Highest valid slot.
    pub const MAX: u8 = 4;

    /// Validate a slot number.
    pub fn new(slot: u8) -> Result<Self, CommandError> {
        if (Self::MIN..=Self::MAX).contains(&slot) {
            Ok(Self(slot))
        } else {
            Err(CommandError::InvalidParameter {
                command: "UD",
                value: slot.to_string(),
                reason: format!("slot must be between {} and {}", Self::MIN, Self::MAX),
            })
        }
    }

    /// Slot number.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for UnitSlot {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

/// Shape of the response a command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `ID,pressure` (PA, PS).
    Pressure,
    /// `PT,pressure` or `PT,?` when no tare has been taken.
    TaredPressure,
    /// `PB,pressure,elapsed`.
    PressureWithElapsed,
    /// `PF,pressure,elapsed,frequency,diode_voltage`.
    PressureWithTransducer,
    /// `ID,0|1`.
    Flag,
    /// `ID,tenths_of_seconds`.
    Interval,
    /// `RS,rate` (per second) or `RM,rate` (per minute).
    Rate,
    /// `RP,0|1`.
    RatePeriod,
    /// `UN,code`.
    Units,
    /// `UD,slot,factor,label`.
    UserUnit,
    /// `ET,tenths_of_seconds`.
    ElapsedTime,
    /// `ID,integer`.
    Code,
    /// `ID,decimal`.
    Decimal,
    /// `MD,0|1`.
    Medium,
}

impl ResponseShape {
    /// Number of comma-separated fields, including the id.
    pub fn field_count(self) -> usize {
        match self {
            ResponseShape::PressureWithElapsed => 3,
            ResponseShape::PressureWithTransducer => 5,
            ResponseShape::UserUnit => 4,
            _ => 2,
        }
    }

    /// Short human description used in mismatch errors.
    pub fn label(self) -> &'static str {
        match self {
            ResponseShape::Pressure => "pressure",
            ResponseShape::TaredPressure => "tared pressure",
            ResponseShape::PressureWithElapsed => "pressure/elapsed",
            ResponseShape::PressureWithTransducer => "pressure/transducer",
            ResponseShape::Flag => "flag",
            ResponseShape::Interval => "interval",
            ResponseShape::Rate => "rate",
            ResponseShape::RatePeriod => "rate period",
            ResponseShape::Units => "units",
            ResponseShape::UserUnit => "user unit",
            ResponseShape::ElapsedTime => "elapsed time",
            ResponseShape::Code => "code",
            ResponseShape::Decimal => "decimal",
            ResponseShape::Medium => "medium",
        }
    }

    /// Whether a successful response of this shape can carry a pressure.
    pub fn carries_pressure(self) -> bool {
        matches!(
            self,
            ResponseShape::Pressure
                | ResponseShape::TaredPressure
                | ResponseShape::PressureWithElapsed
                | ResponseShape::PressureWithTransducer
        )
    }
}

/// Ruska read commands in manual order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuskaCommand {
    /// `PA`: current pressure, unaffected by tare.
    Pressure,
    /// `PB`: pressure and elapsed time.
    PressureWithElapsed,
    /// `PF`: pressure, elapsed time and transducer data.
    PressureWithTransducer,
    /// `PT`: pressure less tare.
    TaredPressure,
    /// `PS`: pressure as shown on the upper display.
    DisplayPressure,
    /// `PC`: continuous pressure transmission state.
    ContinuousPressure,
    /// `PI`: continuous pressure interval.
    PressureInterval,
    /// `RS`: latest rate.
    Rate,
    /// `RC`: continuous rate transmission state.
    ContinuousRate,
    /// `RI`: continuous rate interval.
    RateInterval,
    /// `RP`: rate period.
    RatePeriod,
    /// `RO`: rate display state.
    RateDisplay,
    /// `UN`: current units code.
    Units,
    /// `UD,x`: user-defined unit in slot x.
    UserUnit(UnitSlot),
    /// `ET`: elapsed time.
    ElapsedTime,
    /// `TM`: tare mode.
    TareMode,
    /// `ER`: next code from the error buffer.
    ErrorCode,
    /// `ST`: run self-test, first result.
    SelfTest,
    /// `XB`: battery voltage.
    BatteryVoltage,
    /// `V1`: main board software version.
    MainBoardVersion,
    /// `V2`: front panel software version.
    FrontPanelVersion,
    /// `ECHO`: echo mode state.
    EchoMode,
    /// `MD`: pressure medium.
    Medium,
}

impl RuskaCommand {
    /// Every command in manual order. `UD` is listed with slot 1.
    pub const ALL: [RuskaCommand; 23] = [
        RuskaCommand::Pressure,
        RuskaCommand::PressureWithElapsed,
        RuskaCommand::PressureWithTransducer,
        RuskaCommand::TaredPressure,
        RuskaCommand::DisplayPressure,
        RuskaCommand::ContinuousPressure,
        RuskaCommand::PressureInterval,
        RuskaCommand::Rate,
        RuskaCommand::ContinuousRate,
        RuskaCommand::RateInterval,
        RuskaCommand::RatePeriod,
        RuskaCommand::RateDisplay,
        RuskaCommand::Units,
        RuskaCommand::UserUnit(UnitSlot(UnitSlot::MIN)),
        RuskaCommand::ElapsedTime,
        RuskaCommand::TareMode,
        RuskaCommand::ErrorCode,
        RuskaCommand::SelfTest,
        RuskaCommand::BatteryVoltage,
        RuskaCommand::MainBoardVersion,
        RuskaCommand::FrontPanelVersion,
        RuskaCommand::EchoMode,
        RuskaCommand::Medium,
    ];

    /// Wire id.
    pub fn id(self) -> &'static str {
        match self {
            RuskaCommand::Pressure => "PA",
            RuskaCommand::PressureWithElapsed => "PB",
            RuskaCommand::PressureWithTransducer => "PF",
            RuskaCommand::TaredPressure => "PT",
            RuskaCommand::DisplayPressure => "PS",
            RuskaCommand::ContinuousPressure => "PC",
            RuskaCommand::PressureInterval => "PI",
            RuskaCommand::Rate => "RS",
            RuskaCommand::ContinuousRate => "RC",
            RuskaCommand::RateInterval => "RI",
            RuskaCommand::RatePeriod => "RP",
            RuskaCommand::RateDisplay => "RO",
            RuskaCommand::Units => "UN",
            RuskaCommand::UserUnit(_) => "UD",
            RuskaCommand::ElapsedTime => "ET",
            RuskaCommand::TareMode => "TM",
            RuskaCommand::ErrorCode => "ER",
            RuskaCommand::SelfTest => "ST",
            RuskaCommand::BatteryVoltage => "XB",
            RuskaCommand::MainBoardVersion => "V1",
            RuskaCommand::FrontPanelVersion => "V2",
            RuskaCommand::EchoMode => "ECHO",
            RuskaCommand::Medium => "MD",
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            RuskaCommand::Pressure => "Pressure (absolute)",
            RuskaCommand::PressureWithElapsed => "Pressure and elapsed time",
            RuskaCommand::PressureWithTransducer => "Pressure and transducer data",
            RuskaCommand::TaredPressure => "Pressure (tare)",
            RuskaCommand::DisplayPressure => "Pressure (display)",
            RuskaCommand::ContinuousPressure => "Continuous pressure state",
            RuskaCommand::PressureInterval => "Pressure interval",
            RuskaCommand::Rate => "Rate",
            RuskaCommand::ContinuousRate => "Continuous rate state",
            RuskaCommand::RateInterval => "Rate interval",
            RuskaCommand::RatePeriod => "Rate period",
            RuskaCommand::RateDisplay => "Rate display",
            RuskaCommand::Units => "Units",
            RuskaCommand::UserUnit(_) => "User-defined unit",
            RuskaCommand::ElapsedTime => "Elapsed time",
            RuskaCommand::TareMode => "Tare mode",
            RuskaCommand::ErrorCode => "Error code",
            RuskaCommand::SelfTest => "Self-test",
            RuskaCommand::BatteryVoltage => "Battery voltage",
            RuskaCommand::MainBoardVersion => "Main board version",
            RuskaCommand::FrontPanelVersion => "Front panel version",
            RuskaCommand::EchoMode => "Echo mode",
            RuskaCommand::Medium => "Pressure medium",
        }
    }

    /// One-line description of what the instrument returns.
    pub fn description(self) -> &'static str {
        match self {
            RuskaCommand::Pressure => {
                "Current pressure in current units, as displayed on the front panel; not affected by tare."
            }
            RuskaCommand::PressureWithElapsed => {
                "Current pressure and elapsed time in tenths of seconds."
            }
            RuskaCommand::PressureWithTransducer => {
                "Pressure, elapsed time, transducer frequency and transducer diode voltage."
            }
            RuskaCommand::TaredPressure => {
                "Current pressure less the tare pressure; '?' if no tare was taken since power-up."
            }
            RuskaCommand::DisplayPressure => {
                "Current pressure; less tare if the upper display is in tare mode."
            }
            RuskaCommand::ContinuousPressure => "1 if continuous pressure transmission is enabled, 0 if not.",
            RuskaCommand::PressureInterval => {
                "Continuous pressure transmission interval in tenths of seconds."
            }
            RuskaCommand::Rate => "Latest rate value; RS per second or RM per minute.",
            RuskaCommand::ContinuousRate => "1 if continuous rate transmission is enabled, 0 if not.",
            RuskaCommand::RateInterval => "Continuous rate transmission interval in tenths of seconds.",
            RuskaCommand::RatePeriod => "Rate period: 0 = seconds, 1 = minutes.",
            RuskaCommand::RateDisplay => "1 if the rate display is on, 0 if off.",
            RuskaCommand::Units => "Current units code (0 = inHg, 1 = psi, 2 = mbar, 3 = kPa, ...).",
            RuskaCommand::UserUnit(_) => {
                "User-defined unit: slot, conversion constant relative to kPa and display label."
            }
            RuskaCommand::ElapsedTime => {
                "Elapsed time in tenths of seconds since the clock was started; wraps after 24 hours."
            }
            RuskaCommand::TareMode => "Tare mode: 0 = off, 1 = upper display, 2 = lower display.",
            RuskaCommand::ErrorCode => "Next error code from the error buffer.",
            RuskaCommand::SelfTest => "Runs a self test and returns the first result code.",
            RuskaCommand::BatteryVoltage => "Battery voltage.",
            RuskaCommand::MainBoardVersion => "Main board software version.",
            RuskaCommand::FrontPanelVersion => "Front panel software version; 0.00 if absent.",
            RuskaCommand::EchoMode => "1 if echo mode is on, 0 if off.",
            RuskaCommand::Medium => "Pressure medium: 1 = N2, 0 = air.",
        }
    }

    /// Response shape the instrument answers this command with.
    pub fn response_shape(self) -> ResponseShape {
        match self {
            RuskaCommand::Pressure | RuskaCommand::DisplayPressure => ResponseShape::Pressure,
            RuskaCommand::TaredPressure => ResponseShape::TaredPressure,
            RuskaCommand::PressureWithElapsed => ResponseShape::PressureWithElapsed,
            RuskaCommand::PressureWithTransducer => ResponseShape::PressureWithTransducer,
            RuskaCommand::ContinuousPressure
            | RuskaCommand::ContinuousRate
            | RuskaCommand::RateDisplay
            | RuskaCommand::EchoMode => ResponseShape::Flag,
            RuskaCommand::PressureInterval | RuskaCommand::RateInterval => ResponseShape::Interval,
            RuskaCommand::Rate => ResponseShape::Rate,
            RuskaCommand::RatePeriod => ResponseShape::RatePeriod,
            RuskaCommand::Units => ResponseShape::Units,
            RuskaCommand::UserUnit(_) => ResponseShape::UserUnit,
            RuskaCommand::ElapsedTime => ResponseShape::ElapsedTime,
            RuskaCommand::TareMode | RuskaCommand::ErrorCode | RuskaCommand::SelfTest => {
                ResponseShape::Code
            }
            RuskaCommand::BatteryVoltage
            | RuskaCommand::MainBoardVersion
            | RuskaCommand::FrontPanelVersion => ResponseShape::Decimal,
            RuskaCommand::Medium => ResponseShape::Medium,
        }
    }

    /// Ids a valid response may start with.
    pub fn response_ids(self) -> &'static [&'static str] {
        match self {
            RuskaCommand::Rate => &["RS", "RM"],
            RuskaCommand::Pressure => &["PA"],
            RuskaCommand::PressureWithElapsed => &["PB"],
            RuskaCommand::PressureWithTransducer => &["PF"],
            RuskaCommand::TaredPressure => &["PT"],
            RuskaCommand::DisplayPressure => &["PS"],
            RuskaCommand::ContinuousPressure => &["PC"],
            RuskaCommand::PressureInterval => &["PI"],
            RuskaCommand::ContinuousRate => &["RC"],
            RuskaCommand::RateInterval => &["RI"],
            RuskaCommand::RatePeriod => &["RP"],
            RuskaCommand::RateDisplay => &["RO"],
            RuskaCommand::Units => &["UN"],
            RuskaCommand::UserUnit(_) => &["UD"],
            RuskaCommand::ElapsedTime => &["ET"],
            RuskaCommand::TareMode => &["TM"],
            RuskaCommand::ErrorCode => &["ER"],
            RuskaCommand::SelfTest => &["ST"],
            RuskaCommand::BatteryVoltage => &["XB"],
            RuskaCommand::MainBoardVersion => &["V1"],
            RuskaCommand::FrontPanelVersion => &["V2"],
            RuskaCommand::EchoMode => &["ECHO"],
            RuskaCommand::Medium => &["MD"],
        }
    }

    /// Number of parameters the wire message carries.
    pub fn parameter_count(self) -> usize {
        match self {
            RuskaCommand::UserUnit(_) => 1,
            _ => 0,
        }
    }

    /// Look up a parameterless command by id, or the `UD` family with its default slot.
    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.id().eq_ignore_ascii_case(id))
    }
}

impl fmt::Display for RuskaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuskaCommand::UserUnit(slot) => write!(f, "UD,{}", slot.get()),
            other => f.write_str(other.id()),
        }
    }
}

/// A command ready to be written to the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    command: RuskaCommand,
}

impl CommandRequest {
    /// Wrap a typed command.
    pub fn new(command: RuskaCommand) -> Self {
        Self { command }
    }

    /// Build a request from a text id and parameters, e.g. `("UD", &["2"])`.
    pub fn parse(id: &str, params: &[&str]) -> Result<Self, CommandError> {
        let base = RuskaCommand::from_id(id)
            .ok_or_else(|| CommandError::UnknownCommand(id.trim().to_string()))?;

        let expected = base.parameter_count();
        if params.len() != expected {
            return Err(CommandError::ParameterCount {
                command: base.id(),
                expected,
                actual: params.len(),
            });
        }

        let command = match base {
            RuskaCommand::UserUnit(_) => {
                let raw = params[0].trim();
                let slot: u8 = raw.parse().map_err(|_| CommandError::InvalidParameter {
                    command: "UD",
                    value: raw.to_string(),
                    reason: "not an integer".to_string(),
                })?;
                RuskaCommand::UserUnit(UnitSlot::new(slot)?)
            }
            other => other,
        };
        Ok(Self { command })
    }

    /// Parse a full text message such as `"UD,2"` or `"pa"`.
    pub fn parse_message(message: &str) -> Result<Self, CommandError> {
        let mut parts = message.trim().split(',');
        let id = parts.next().unwrap_or_default();
        let params: Vec<&str> = parts.collect();
        Self::parse(id, &params)
    }

    /// The typed command.
    pub fn command(&self) -> RuskaCommand {
        self.command
    }

    /// Expected response shape.
    pub fn expected_shape(&self) -> ResponseShape {
        self.command.response_shape()
    }

    /// Wire payload without checksum or terminator.
    pub fn payload(&self) -> String {
        self.command.to_string()
    }

    /// Full wire encoding for the given framing.
    pub fn encode(&self, framing: &FramingConfig) -> Vec<u8> {
        framing.encode(self.payload().as_bytes())
    }
}

impl From<RuskaCommand> for CommandRequest {
    fn from(command: RuskaCommand) -> Self {
        Self::new(command)
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.command, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_commands_have_unique_ids_in_manual_order() {
        let ids: Vec<&str> = RuskaCommand::ALL.iter().map(|c| c.id()).collect();
        assert_eq!(ids.first(), Some(&"PA"));
        assert_eq!(ids.last(), Some(&"MD"));
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), RuskaCommand::ALL.len());
    }

    #[test]
    fn encodes_with_default_terminator() {
        let framing = FramingConfig::default();
        let req = CommandRequest::new(RuskaCommand::Pressure);
        assert_eq!(req.encode(&framing), b"PA\r");

        let ud = CommandRequest::parse("UD", &["3"]).unwrap();
        assert_eq!(ud.encode(&framing), b"UD,3\r");
        assert_eq!(ud.expected_shape(), ResponseShape::UserUnit);
    }

    #[test]
    fn parse_is_case_insensitive() {
        let req = CommandRequest::parse_message(" echo ").unwrap();
        assert_eq!(req.command(), RuskaCommand::EchoMode);
    }

    #[test]
    fn parse_rejects_unknown_and_bad_parameters() {
        assert_eq!(
            CommandRequest::parse("ZZ", &[]),
            Err(CommandError::UnknownCommand("ZZ".into()))
        );
        assert_eq!(
            CommandRequest::parse("PA", &["1"]),
            Err(CommandError::ParameterCount {
                command: "PA",
                expected: 0,
                actual: 1
            })
        );
        assert!(matches!(
            CommandRequest::parse("UD", &[]),
            Err(CommandError::ParameterCount { expected: 1, .. })
        ));
        assert!(matches!(
            CommandRequest::parse("UD", &["5"]),
            Err(CommandError::InvalidParameter { .. })
        ));
        assert!(matches!(
            CommandRequest::parse_message("UD,x"),
            Err(CommandError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn shapes_for_pressure_commands() {
        for cmd in [
            RuskaCommand::Pressure,
            RuskaCommand::PressureWithElapsed,
            RuskaCommand::PressureWithTransducer,
            RuskaCommand::TaredPressure,
            RuskaCommand::DisplayPressure,
        ] {
            assert!(cmd.response_shape().carries_pressure(), "{}", cmd);
        }
        assert!(!RuskaCommand::Units.response_shape().carries_pressure());
        assert_eq!(RuskaCommand::Rate.response_ids(), &["RS", "RM"]);
    }
}
