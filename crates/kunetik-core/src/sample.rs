//! Fixed 4-byte sample layout.
//!
//! ```text
//! offset 0   unit tag
//! offset 1   measurement (normalized into the unit's range)
//! offset 2   humidity (raw 0..=255, fraction of the full byte range)
//! offset 3   reserved, always 0
//! ```

use serde::Serialize;

use crate::error::{DeviceError, Result};
use crate::unit::Unit;

pub const UNIT_OFFSET: usize = 0;
pub const MEASUREMENT_OFFSET: usize = 1;
pub const HUMIDITY_OFFSET: usize = 2;
pub const RESERVED_OFFSET: usize = 3;

/// Size of the sample buffer in bytes.
pub const SAMPLE_SIZE: usize = 4;

/// The shared buffer served to readers. Zeroed until the first capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleBuffer([u8; SAMPLE_SIZE]);

impl SampleBuffer {
    /// Write a full sample. The reserved byte is reset to zero.
    pub fn store(&mut self, unit: Unit, measurement: u8, humidity: u8) {
        self.0[UNIT_OFFSET] = unit.tag();
        self.0[MEASUREMENT_OFFSET] = measurement;
        self.0[HUMIDITY_OFFSET] = humidity;
        self.0[RESERVED_OFFSET] = 0;
    }

    /// Copy up to `dst.len()` bytes out; returns the number copied.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(SAMPLE_SIZE);
        dst[..n].copy_from_slice(&self.0[..n]);
        n
    }

    pub fn as_bytes(&self) -> &[u8; SAMPLE_SIZE] {
        &self.0
    }
}

/// Decoded view of a sample, as a client would render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub unit: Unit,
    pub measurement: u8,
    pub humidity: u8,
}

impl Sample {
    /// Decode the first [`SAMPLE_SIZE`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SAMPLE_SIZE {
            return Err(DeviceError::InvalidArgument(format!(
                "sample needs {SAMPLE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            unit: Unit::try_from(bytes[UNIT_OFFSET])?,
            measurement: bytes[MEASUREMENT_OFFSET],
            humidity: bytes[HUMIDITY_OFFSET],
        })
    }

    pub fn encode(&self) -> [u8; SAMPLE_SIZE] {
        let mut buf = SampleBuffer::default();
        buf.store(self.unit, self.measurement, self.humidity);
        *buf.as_bytes()
    }

    /// Relative humidity as a percentage of the full byte range.
    pub fn humidity_percent(&self) -> f64 {
        f64::from(self.humidity) / f64::from(u8::MAX) * 100.0
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} | {:.1}% RH",
            self.measurement,
            self.unit.symbol(),
            self.humidity_percent()
        )
    }
}
