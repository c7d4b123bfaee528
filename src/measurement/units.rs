//! Pressure units and Ruska unit codes.

use serde::{Deserialize, Serialize};
use std::fmt;

const PA_PER_KPA: f64 = 1_000.0;
const PA_PER_BAR: f64 = 100_000.0;
const PA_PER_MBAR: f64 = 100.0;
const PA_PER_PSI: f64 = 6_894.757_293_168;
const PA_PER_INHG: f64 = 3_386.388_666_6;

/// Physical pressure unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureUnit {
    /// Pascal.
    #[serde(rename = "Pa", alias = "pa")]
    Pascal,
    /// Kilopascal.
    #[serde(rename = "kPa", alias = "kpa")]
    Kilopascal,
    /// Bar.
    Bar,
    /// Millibar.
    Mbar,
    /// Pounds per square inch.
    Psi,
    /// Inches of mercury.
    #[serde(rename = "inHg", alias = "inhg")]
    InHg,
}

impl PressureUnit {
    /// Pascals per one unit.
    pub fn pascals_per_unit(self) -> f64 {
        match self {
            PressureUnit::Pascal => 1.0,
            PressureUnit::Kilopascal => PA_PER_KPA,
            PressureUnit::Bar => PA_PER_BAR,
            PressureUnit::Mbar => PA_PER_MBAR,
            PressureUnit::Psi => PA_PER_PSI,
            PressureUnit::InHg => PA_PER_INHG,
        }
    }

    /// Convert a value in this unit to pascals.
    pub fn to_pascal(self, value: f64) -> f64 {
        value * self.pascals_per_unit()
    }

    /// Convert a value in pascals to this unit.
    pub fn from_pascal(self, pascals: f64) -> f64 {
        pascals / self.pascals_per_unit()
    }

    /// Convert `value` from this unit into `target`.
    pub fn convert(self, value: f64, target: PressureUnit) -> f64 {
        if self == target {
            return value;
        }
        target.from_pascal(self.to_pascal(value))
    }

    /// Unit symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            PressureUnit::Pascal => "Pa",
            PressureUnit::Kilopascal => "kPa",
            PressureUnit::Bar => "bar",
            PressureUnit::Mbar => "mbar",
            PressureUnit::Psi => "psi",
            PressureUnit::InHg => "inHg",
        }
    }
}

impl fmt::Display for PressureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Units code reported by `UN`.
///
/// Codes 0-3 map to known units; the rest of the instrument's table is kept as
/// the raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuskaUnit {
    /// Code 0.
    InHg,
    /// Code 1.
    Psi,
    /// Code 2.
    Mbar,
    /// Code 3.
    Kpa,
    /// Any other code from the instrument's table.
    Other(u8),
}

impl RuskaUnit {
    /// Map an instrument code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RuskaUnit::InHg,
            1 => RuskaUnit::Psi,
            2 => RuskaUnit::Mbar,
            3 => RuskaUnit::Kpa,
            other => RuskaUnit::Other(other),
        }
    }

    /// Instrument code.
    pub fn code(self) -> u8 {
        match self {
            RuskaUnit::InHg => 0,
            RuskaUnit::Psi => 1,
            RuskaUnit::Mbar => 2,
            RuskaUnit::Kpa => 3,
            RuskaUnit::Other(code) => code,
        }
    }

    /// Physical unit, when the code is a known one.
    pub fn pressure_unit(self) -> Option<PressureUnit> {
        match self {
            RuskaUnit::InHg => Some(PressureUnit::InHg),
            RuskaUnit::Psi => Some(PressureUnit::Psi),
            RuskaUnit::Mbar => Some(PressureUnit::Mbar),
            RuskaUnit::Kpa => Some(PressureUnit::Kilopascal),
            RuskaUnit::Other(_) => None,
        }
    }
}
