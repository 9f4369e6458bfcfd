//! # kunetik-core
//!
//! A single-instance temperature/humidity sensor exposed through a file-like
//! session interface.
//!
//! - exactly one consumer may hold the device open at a time
//! - reads return the most recently captured 4-byte sample, blocking (or
//!   failing with `WouldBlock`) until the first capture completes
//! - control commands switch the measurement unit and trigger captures
//!
//! ## Quick Start
//!
//! ```no_run
//! use kunetik_core::{DeviceConfig, InProcessRegistry, KunetikModule, ReadMode, Unit};
//!
//! let module = KunetikModule::load(DeviceConfig::default(), Box::new(InProcessRegistry::new()))?;
//! let session = module.device().open()?;
//!
//! session.set_unit(Unit::Fahrenheit)?;
//! session.trigger_capture()?;
//! let sample = session.read_sample(ReadMode::NonBlocking)?;
//! println!("{sample}");
//!
//! session.release()?;
//! # Ok::<(), kunetik_core::DeviceError>(())
//! ```
//!
//! ## Architecture
//!
//! Host registry → [`KunetikModule`] → [`Device`] (sessions, control, reads)
//! → [`CaptureEngine`] → [`ReadinessSignal`] → waiting readers
//!
//! The capture backend sits behind the [`SensorBackend`] trait. The bundled
//! [`SimulatedSensor`] draws pseudo-random bytes; a hardware backend can replace
//! it without changing how readiness is signalled.

pub mod capture;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod readiness;
pub mod registry;
pub mod sample;
pub mod unit;

pub use capture::{CaptureEngine, RawReading, ScriptedSensor, SensorBackend, SimulatedSensor};
pub use config::DeviceConfig;
pub use control::{ControlCommand, ControlReply};
pub use device::{Device, DeviceHealth, ReadMode, Session};
pub use error::{CaptureError, DeviceError, Result};
pub use readiness::{CancelToken, NotReady, ReadinessSignal};
pub use registry::{
    DevNumber, HostError, HostEvent, HostRegistry, InProcessRegistry, Journal, KunetikModule,
    Stage,
};
pub use sample::{SAMPLE_SIZE, Sample, SampleBuffer};
pub use unit::{MeasurementRange, Unit, UnitConfig};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
