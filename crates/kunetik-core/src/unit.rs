//! Measurement units and the active unit configuration.
//!
//! Each [`Unit`] carries a fixed [`MeasurementRange`]. [`UnitConfig`] stores the
//! active unit together with its range and only ever replaces both at once.

use serde::Serialize;

use crate::error::{DeviceError, Result};

/// Measurement scale reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Degrees Celsius, tag `0`.
    Celsius,
    /// Degrees Fahrenheit, tag `1`.
    Fahrenheit,
}

impl Unit {
    /// Every known unit, in tag order.
    pub const ALL: [Unit; 2] = [Unit::Celsius, Unit::Fahrenheit];

    /// Wire tag used in control payloads and at sample offset 0.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Celsius => 0,
            Self::Fahrenheit => 1,
        }
    }

    /// Inclusive range a normalized measurement falls in for this unit.
    pub const fn range(self) -> MeasurementRange {
        match self {
            Self::Celsius => MeasurementRange { min: 0x00, max: 0x28 },
            Self::Fahrenheit => MeasurementRange { min: 0x20, max: 0x78 },
        }
    }

    /// Short symbol for display (`°C` / `°F`).
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

impl TryFrom<u8> for Unit {
    type Error = DeviceError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Celsius),
            1 => Ok(Self::Fahrenheit),
            other => Err(DeviceError::InvalidArgument(format!(
                "unknown unit tag {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Celsius => write!(f, "celsius"),
            Self::Fahrenheit => write!(f, "fahrenheit"),
        }
    }
}

impl std::str::FromStr for Unit {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "celsius" | "c" | "0" => Ok(Self::Celsius),
            "fahrenheit" | "f" | "1" => Ok(Self::Fahrenheit),
            other => Err(DeviceError::InvalidArgument(format!("unknown unit '{other}'"))),
        }
    }
}

/// Inclusive `[min, max]` bound for normalized measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeasurementRange {
    pub min: u8,
    pub max: u8,
}

impl MeasurementRange {
    /// Number of distinct values in the range.
    pub const fn span(self) -> u16 {
        self.max as u16 - self.min as u16 + 1
    }

    /// Fold a raw byte into the range: `raw mod (max - min + 1) + min`.
    pub const fn normalize(self, raw: u8) -> u8 {
        (raw as u16 % self.span() + self.min as u16) as u8
    }

    pub const fn contains(self, value: u8) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The active unit and its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConfig {
    unit: Unit,
    range: MeasurementRange,
}

impl UnitConfig {
    pub const fn new(unit: Unit) -> Self {
        Self {
            unit,
            range: unit.range(),
        }
    }

    /// Switch to the unit named by `tag`. Unknown tags leave the config untouched.
    pub fn set_unit(&mut self, tag: u8) -> Result<Unit> {
        let unit = Unit::try_from(tag)?;
        *self = Self::new(unit);
        Ok(unit)
    }

    pub fn get_unit(&self) -> u8 {
        self.unit.tag()
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn range(&self) -> MeasurementRange {
        self.range
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self::new(Unit::Celsius)
    }
}
