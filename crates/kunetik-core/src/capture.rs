//! Sample capture: ask a sensor backend for raw bytes, normalize, publish.
//!
//! Every capture follows the same readiness contract:
//! 1. drop readiness ([`CaptureEngine::begin`])
//! 2. obtain a raw reading from the backend
//! 3. write unit tag, normalized measurement and raw humidity, then raise
//!    readiness and wake waiters in one critical section ([`CaptureEngine::complete`])
//!
//! A backend that answers asynchronously can call `begin` when the request goes
//! out and `complete` from its completion path; readers see the same behavior.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::CaptureError;
use crate::readiness::ReadinessSignal;
use crate::sample::{Sample, SampleBuffer, UNIT_OFFSET};
use crate::unit::UnitConfig;

/// Raw bytes as delivered by the sensor, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReading {
    pub measurement: u8,
    pub humidity: u8,
}

/// Something that can produce a raw reading on request.
pub trait SensorBackend: Send {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Perform one measurement.
    fn sample(&mut self) -> Result<RawReading, CaptureError>;
}

// ---------------------------------------------------------------------------
// Simulated sensor
// ---------------------------------------------------------------------------

/// Pseudo-random sensor. With a seed the reading sequence is reproducible.
pub struct SimulatedSensor {
    rng: StdRng,
}

impl SimulatedSensor {
    /// Seed from `seed`, or from OS entropy when `None`.
    pub fn new(seed: Option<u64>) -> Result<Self, getrandom::Error> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => {
                let mut os_seed = [0u8; 32];
                getrandom::fill(&mut os_seed)?;
                StdRng::from_seed(os_seed)
            }
        };
        Ok(Self { rng })
    }
}

impl SensorBackend for SimulatedSensor {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn sample(&mut self) -> Result<RawReading, CaptureError> {
        let mut bytes = [0u8; 2];
        self.rng.fill_bytes(&mut bytes);
        Ok(RawReading {
            measurement: bytes[0],
            humidity: bytes[1],
        })
    }
}

/// Replays a fixed script of outcomes, then repeats the last one.
///
/// Useful for demos and tests that need exact raw bytes or injected faults.
pub struct ScriptedSensor {
    script: VecDeque<Result<RawReading, CaptureError>>,
    last: Result<RawReading, CaptureError>,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Result<RawReading, CaptureError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: Err(CaptureError::NoResponse),
        }
    }

    /// Always answer with the same reading.
    pub fn constant(measurement: u8, humidity: u8) -> Self {
        Self::new([Ok(RawReading {
            measurement,
            humidity,
        })])
    }
}

impl SensorBackend for ScriptedSensor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn sample(&mut self) -> Result<RawReading, CaptureError> {
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        self.last.clone()
    }
}

// ---------------------------------------------------------------------------
// Capture engine
// ---------------------------------------------------------------------------

/// Drives a backend and publishes normalized samples into the shared buffer.
pub struct CaptureEngine {
    backend: Mutex<Box<dyn SensorBackend>>,
    captures: AtomicU64,
    failures: AtomicU64,
    stale: AtomicBool,
}

impl CaptureEngine {
    pub fn new(backend: Box<dyn SensorBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
            captures: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            stale: AtomicBool::new(false),
        }
    }

    /// Mark a capture as in flight.
    pub fn begin(&self, signal: &ReadinessSignal<SampleBuffer>) {
        signal.clear();
    }

    /// Normalize `reading` under `config`, store it and raise readiness.
    pub fn complete(
        &self,
        signal: &ReadinessSignal<SampleBuffer>,
        config: UnitConfig,
        reading: RawReading,
    ) -> Sample {
        let sample = Sample {
            unit: config.unit(),
            measurement: config.range().normalize(reading.measurement),
            humidity: reading.humidity,
        };
        signal.publish(|buf| buf.store(sample.unit, sample.measurement, sample.humidity));
        self.captures.fetch_add(1, Ordering::Relaxed);
        self.stale.store(false, Ordering::Relaxed);
        sample
    }

    /// Record a failed capture.
    ///
    /// If an earlier capture succeeded in the unit `config` selects, readiness
    /// is restored so readers keep getting that sample; otherwise readers keep
    /// waiting.
    pub fn abort(
        &self,
        signal: &ReadinessSignal<SampleBuffer>,
        config: UnitConfig,
        err: &CaptureError,
    ) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if self.captures.load(Ordering::Relaxed) == 0 {
            log::warn!(target: "kunetik", "capture failed ({err}); no sample captured yet");
            return;
        }
        let held_unit = signal.peek(|buf| buf.as_bytes()[UNIT_OFFSET]);
        if held_unit == config.get_unit() {
            self.stale.store(true, Ordering::Relaxed);
            log::warn!(target: "kunetik", "capture failed ({err}); serving last good sample");
            signal.signal_ready();
        } else {
            log::warn!(
                target: "kunetik",
                "capture failed ({err}); last good sample is in another unit"
            );
        }
    }

    /// Run one synchronous capture.
    pub fn capture(
        &self,
        signal: &ReadinessSignal<SampleBuffer>,
        config: UnitConfig,
    ) -> Result<Sample, CaptureError> {
        let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        self.begin(signal);
        match backend.sample() {
            Ok(reading) => {
                let sample = self.complete(signal, config, reading);
                log::debug!(
                    target: "kunetik",
                    "captured via {}: raw {} -> {}, humidity {}",
                    backend.name(),
                    reading.measurement,
                    sample.measurement,
                    sample.humidity
                );
                Ok(sample)
            }
            Err(e) => {
                self.abort(signal, config, &e);
                Err(e)
            }
        }
    }

    /// Successful captures so far.
    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::Relaxed)
    }

    /// Failed captures so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// True when the most recent capture failed and an older sample is being served.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_stats(&self) {
        self.captures.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.stale.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;

    fn reading(measurement: u8, humidity: u8) -> RawReading {
        RawReading {
            measurement,
            humidity,
        }
    }

    // -----------------------------------------------------------------------
    // Backends
    // -----------------------------------------------------------------------

    #[test]
    fn test_seeded_simulation_is_reproducible() {
        let mut a = SimulatedSensor::new(Some(7)).unwrap();
        let mut b = SimulatedSensor::new(Some(7)).unwrap();
        for _ in 0..16 {
            assert_eq!(a.sample().unwrap(), b.sample().unwrap());
        }
    }

    #[test]
    fn test_os_seeded_simulation_produces_readings() {
        let mut s = SimulatedSensor::new(None).unwrap();
        assert!(s.sample().is_ok());
    }

    #[test]
    fn test_scripted_sensor_repeats_last() {
        let mut s = ScriptedSensor::new([Ok(reading(1, 2)), Err(CaptureError::NoResponse)]);
        assert_eq!(s.sample(), Ok(reading(1, 2)));
        assert_eq!(s.sample(), Err(CaptureError::NoResponse));
        assert_eq!(s.sample(), Err(CaptureError::NoResponse));
    }

    // -----------------------------------------------------------------------
    // Engine
    // -----------------------------------------------------------------------

    #[test]
    fn test_capture_fahrenheit_200() {
        let engine = CaptureEngine::new(Box::new(ScriptedSensor::constant(200, 77)));
        let signal = ReadinessSignal::new(SampleBuffer::default());
        let sample = engine
            .capture(&signal, UnitConfig::new(Unit::Fahrenheit))
            .unwrap();
        assert_eq!(sample.measurement, 55);
        assert_eq!(signal.try_with(|b| *b.as_bytes()), Ok([1, 55, 77, 0]));
        assert_eq!(engine.captures(), 1);
    }

    #[test]
    fn test_capture_measurement_always_in_range() {
        let engine = CaptureEngine::new(Box::new(SimulatedSensor::new(Some(1)).unwrap()));
        let signal = ReadinessSignal::new(SampleBuffer::default());
        for unit in Unit::ALL {
            for _ in 0..200 {
                let s = engine.capture(&signal, UnitConfig::new(unit)).unwrap();
                assert!(unit.range().contains(s.measurement));
                assert_eq!(s.unit, unit);
            }
        }
    }

    #[test]
    fn test_begin_clears_readiness() {
        let engine = CaptureEngine::new(Box::new(ScriptedSensor::constant(1, 1)));
        let signal = ReadinessSignal::new(SampleBuffer::default());
        engine.capture(&signal, UnitConfig::default()).unwrap();
        engine.begin(&signal);
        assert!(!signal.is_ready());
        engine.complete(&signal, UnitConfig::default(), reading(3, 4));
        assert_eq!(signal.try_with(|b| *b.as_bytes()), Ok([0, 3, 4, 0]));
    }

    #[test]
    fn test_failure_before_any_sample_stays_not_ready() {
        let engine = CaptureEngine::new(Box::new(ScriptedSensor::new([Err(
            CaptureError::NoResponse,
        )])));
        let signal = ReadinessSignal::new(SampleBuffer::default());
        assert!(engine.capture(&signal, UnitConfig::default()).is_err());
        assert!(!signal.is_ready());
        assert_eq!(engine.failures(), 1);
        assert!(!engine.is_stale());
    }

    #[test]
    fn test_failure_after_sample_serves_last_good() {
        let engine = CaptureEngine::new(Box::new(ScriptedSensor::new([
            Ok(reading(10, 20)),
            Err(CaptureError::Fault("bus".into())),
        ])));
        let signal = ReadinessSignal::new(SampleBuffer::default());
        engine.capture(&signal, UnitConfig::default()).unwrap();
        assert!(engine.capture(&signal, UnitConfig::default()).is_err());
        assert!(signal.is_ready());
        assert!(engine.is_stale());
        assert_eq!(signal.try_with(|b| *b.as_bytes()), Ok([0, 10, 20, 0]));
    }

    #[test]
    fn test_failure_after_unit_change_stays_not_ready() {
        let engine = CaptureEngine::new(Box::new(ScriptedSensor::new([
            Ok(reading(10, 20)),
            Err(CaptureError::NoResponse),
        ])));
        let signal = ReadinessSignal::new(SampleBuffer::default());
        engine.capture(&signal, UnitConfig::new(Unit::Celsius)).unwrap();
        assert!(engine
            .capture(&signal, UnitConfig::new(Unit::Fahrenheit))
            .is_err());
        // The Celsius sample is out of the Fahrenheit range; readers must wait.
        assert!(!signal.is_ready());
        assert!(!engine.is_stale());
        assert_eq!(engine.failures(), 1);
    }
}
