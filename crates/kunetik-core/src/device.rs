//! Session manager: the single shared device instance and its entry points.
//!
//! One [`Device`] exists per loaded module. A host opens it to get a
//! [`Session`]; only one session may be open at a time. Reads copy the most
//! recent sample out without consuming it, blocking (or failing with
//! [`DeviceError::WouldBlock`]) until the first capture completes. Control
//! commands change the unit or trigger a capture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use uuid::Uuid;

use crate::capture::{CaptureEngine, SensorBackend};
use crate::control::{ControlCommand, ControlReply};
use crate::error::{DeviceError, Result};
use crate::readiness::{CancelToken, NotReady, ReadinessSignal};
use crate::sample::{Sample, SampleBuffer};
use crate::unit::{Unit, UnitConfig};

/// How a read behaves when no sample is ready yet.
#[derive(Debug, Clone, Copy)]
pub enum ReadMode<'a> {
    /// Fail with [`DeviceError::WouldBlock`].
    NonBlocking,
    /// Park until a capture completes or the token is cancelled.
    Blocking(&'a CancelToken),
}

/// The shared device state.
pub struct Device {
    name: String,
    owner: Mutex<Option<Uuid>>,
    config: Mutex<UnitConfig>,
    signal: ReadinessSignal<SampleBuffer>,
    engine: CaptureEngine,
    sessions_opened: AtomicU64,
}

impl Device {
    /// Build a closed, not-ready device around `backend`.
    pub fn new(
        name: impl Into<String>,
        initial_unit: Unit,
        backend: Box<dyn SensorBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            owner: Mutex::new(None),
            config: Mutex::new(UnitConfig::new(initial_unit)),
            signal: ReadinessSignal::new(SampleBuffer::default()),
            engine: CaptureEngine::new(backend),
            sessions_opened: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> MutexGuard<'_, Option<Uuid>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unit_config(&self) -> MutexGuard<'_, UnitConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_session(&self, session: &Session) -> Result<()> {
        let bound_here = std::ptr::eq(Arc::as_ptr(&session.device), self);
        if bound_here && *self.owner() == Some(session.id) {
            Ok(())
        } else {
            Err(DeviceError::InvalidSession)
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Claim exclusive access.
    pub fn open(self: &Arc<Self>) -> Result<Session> {
        let mut owner = self.owner();
        if owner.is_some() {
            log::debug!(target: "kunetik", "{}: open rejected, already in use", self.name);
            return Err(DeviceError::AlreadyInUse);
        }
        let id = Uuid::new_v4();
        *owner = Some(id);
        drop(owner);
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        log::info!(target: "kunetik", "{}: session {id} opened", self.name);
        Ok(Session {
            id,
            device: Arc::clone(self),
        })
    }

    /// Give up exclusive access. Readiness, the last sample and the unit persist.
    pub fn release(&self, session: &Session) -> Result<()> {
        let mut owner = self.owner();
        if *owner != Some(session.id) {
            return Err(DeviceError::InvalidSession);
        }
        *owner = None;
        log::info!(target: "kunetik", "{}: session {} released", self.name, session.id);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.owner().is_some()
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Dispatch a typed control command.
    ///
    /// A capture that fails in the backend still reports success here: the
    /// fault is logged and counted, and reads keep serving the last good sample
    /// while it is in the active unit.
    pub fn control(&self, session: &Session, cmd: ControlCommand) -> Result<ControlReply> {
        self.check_session(session)?;
        log::debug!(target: "kunetik", "{}: control {}", self.name, cmd.name());
        match cmd {
            ControlCommand::SetUnit(tag) => {
                let unit = self.unit_config().set_unit(tag)?;
                log::info!(target: "kunetik", "{}: unit set to {unit}", self.name);
                Ok(ControlReply::Done)
            }
            ControlCommand::GetUnit => Ok(ControlReply::Unit(self.unit_config().get_unit())),
            ControlCommand::TriggerCapture => {
                // SetUnit waits for the capture, so the published sample always
                // matches the unit in force when readiness rises.
                let config = self.unit_config();
                match self.engine.capture(&self.signal, *config) {
                    Ok(sample) => {
                        log::debug!(target: "kunetik", "{}: captured {sample}", self.name);
                    }
                    Err(e) => log::debug!(
                        target: "kunetik",
                        "{}: capture failed, reporting done: {e}",
                        self.name
                    ),
                }
                Ok(ControlReply::Done)
            }
        }
    }

    /// Decode a raw opcode + payload and dispatch it; returns the outbound payload.
    pub fn ioctl(&self, session: &Session, opcode: u32, payload: &[u8]) -> Result<Vec<u8>> {
        let cmd = ControlCommand::decode(opcode, payload)?;
        self.control(session, cmd).map(|reply| reply.payload())
    }

    // -----------------------------------------------------------------------
    // Data path
    // -----------------------------------------------------------------------

    /// Copy up to `dst.len()` bytes of the current sample into `dst`.
    pub fn read(&self, session: &Session, dst: &mut [u8], mode: ReadMode<'_>) -> Result<usize> {
        self.check_session(session)?;
        let copied = match mode {
            ReadMode::NonBlocking => self.signal.try_with(|buf| buf.copy_to(dst)),
            ReadMode::Blocking(cancel) => self.signal.wait_with(cancel, |buf| buf.copy_to(dst)),
        };
        match copied {
            Ok(n) => {
                log::debug!(target: "kunetik", "{}: read {n} bytes", self.name);
                Ok(n)
            }
            Err(NotReady::Pending) => Err(DeviceError::WouldBlock),
            Err(NotReady::Cancelled) => {
                log::debug!(target: "kunetik", "{}: blocked read interrupted", self.name);
                Err(DeviceError::Interrupted)
            }
            Err(NotReady::Closed) => {
                log::debug!(target: "kunetik", "{}: read on torn-down device", self.name);
                Err(DeviceError::InvalidSession)
            }
        }
    }

    /// The device does not accept data.
    pub fn write(&self, _session: &Session, _src: &[u8]) -> Result<usize> {
        Err(DeviceError::NotSupported)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn unit(&self) -> Unit {
        self.unit_config().unit()
    }

    pub fn is_ready(&self) -> bool {
        self.signal.is_ready()
    }

    /// The decoded sample currently in the buffer, if one is ready.
    pub fn current_sample(&self) -> Option<Sample> {
        self.signal
            .try_with(|buf| Sample::decode(buf.as_bytes()))
            .ok()
            .and_then(|decoded| decoded.ok())
    }

    pub fn health(&self) -> DeviceHealth {
        DeviceHealth {
            name: self.name.clone(),
            open: self.is_open(),
            ready: self.is_ready(),
            stale: self.engine.is_stale(),
            unit: self.unit(),
            captures: self.engine.captures(),
            failures: self.engine.failures(),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
        }
    }

    /// Teardown: drop any session, zero the buffer and clear every flag.
    ///
    /// Readers parked in a blocking read wake with [`DeviceError::InvalidSession`].
    pub(crate) fn shutdown(&self) {
        *self.owner() = None;
        self.signal.close(SampleBuffer::default());
        self.engine.reset_stats();
    }
}

/// Exclusive-access handle returned by [`Device::open`].
///
/// The handle stays bound to its device; once released, every operation
/// through it fails with [`DeviceError::InvalidSession`].
pub struct Session {
    id: Uuid,
    device: Arc<Device>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn release(&self) -> Result<()> {
        self.device.release(self)
    }

    pub fn control(&self, cmd: ControlCommand) -> Result<ControlReply> {
        self.device.control(self, cmd)
    }

    pub fn ioctl(&self, opcode: u32, payload: &[u8]) -> Result<Vec<u8>> {
        self.device.ioctl(self, opcode, payload)
    }

    pub fn read(&self, dst: &mut [u8], mode: ReadMode<'_>) -> Result<usize> {
        self.device.read(self, dst, mode)
    }

    pub fn write(&self, src: &[u8]) -> Result<usize> {
        self.device.write(self, src)
    }

    /// Set the unit by value.
    pub fn set_unit(&self, unit: Unit) -> Result<()> {
        self.control(unit.into()).map(|_| ())
    }

    /// Current unit.
    pub fn get_unit(&self) -> Result<Unit> {
        match self.control(ControlCommand::GetUnit)? {
            ControlReply::Unit(tag) => Unit::try_from(tag),
            ControlReply::Done => Err(DeviceError::InvalidArgument("GetUnit returned no tag".into())),
        }
    }

    pub fn trigger_capture(&self) -> Result<()> {
        self.control(ControlCommand::TriggerCapture).map(|_| ())
    }

    /// Read a full sample and decode it.
    pub fn read_sample(&self, mode: ReadMode<'_>) -> Result<Sample> {
        let mut buf = [0u8; crate::sample::SAMPLE_SIZE];
        self.read(&mut buf, mode)?;
        Sample::decode(&buf)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("device", &self.device.name)
            .finish()
    }
}

/// Point-in-time device status.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceHealth {
    pub name: String,
    /// A session currently holds the device.
    pub open: bool,
    /// The buffer holds data from a completed capture.
    pub ready: bool,
    /// The last capture failed and an older sample is being served.
    pub stale: bool,
    pub unit: Unit,
    pub captures: u64,
    pub failures: u64,
    pub sessions_opened: u64,
}
