//! Module load/unload against a host device registry.
//!
//! Loading acquires four host resources in order (device class, device numbers,
//! character device, device node) and then builds the [`Device`]. If any step
//! fails, everything acquired so far is released in strict reverse order before
//! the error is returned. Unloading (explicit or on drop) resets the device and
//! releases the same resources, again in reverse order.

use std::sync::{Arc, Mutex, PoisonError};

use crate::capture::{SensorBackend, SimulatedSensor};
use crate::config::DeviceConfig;
use crate::device::Device;
use crate::error::{DeviceError, Result};

/// One step of module registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Class,
    Numbers,
    CharDevice,
    Node,
    DeviceState,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Class => write!(f, "device class"),
            Self::Numbers => write!(f, "device numbers"),
            Self::CharDevice => write!(f, "character device"),
            Self::Node => write!(f, "device node"),
            Self::DeviceState => write!(f, "device state"),
        }
    }
}

/// Why the host refused a registration step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("{0}")]
    Refused(String),
}

impl HostError {
    fn at(self, stage: Stage) -> DeviceError {
        match self {
            Self::OutOfMemory => DeviceError::ResourceExhausted(stage.to_string()),
            Self::Refused(reason) => DeviceError::Registration { stage, reason },
        }
    }
}

/// Major/minor pair handed out by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevNumber {
    pub major: u32,
    pub minor: u32,
}

impl std::fmt::Display for DevNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// The operating-system side of device registration.
///
/// Each `create`/`alloc`/`add` has a release counterpart; release methods are
/// infallible because teardown has nowhere to report to.
pub trait HostRegistry: Send {
    fn create_class(&mut self, class: &str) -> std::result::Result<(), HostError>;
    fn destroy_class(&mut self, class: &str);

    fn alloc_numbers(&mut self, name: &str) -> std::result::Result<DevNumber, HostError>;
    fn free_numbers(&mut self, devt: DevNumber);

    fn add_char_device(&mut self, devt: DevNumber) -> std::result::Result<(), HostError>;
    fn remove_char_device(&mut self, devt: DevNumber);

    fn create_node(
        &mut self,
        class: &str,
        devt: DevNumber,
        name: &str,
    ) -> std::result::Result<(), HostError>;
    fn destroy_node(&mut self, class: &str, devt: DevNumber);
}

/// A host resource the module currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    Class,
    Numbers(DevNumber),
    CharDevice(DevNumber),
    Node(DevNumber),
}

/// Acquired resources, released newest-first.
struct Holdings {
    class: String,
    held: Vec<Held>,
}

impl Holdings {
    fn release_all(&mut self, host: &mut dyn HostRegistry) {
        while let Some(h) = self.held.pop() {
            match h {
                Held::Node(devt) => host.destroy_node(&self.class, devt),
                Held::CharDevice(devt) => host.remove_char_device(devt),
                Held::Numbers(devt) => host.free_numbers(devt),
                Held::Class => host.destroy_class(&self.class),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loaded module
// ---------------------------------------------------------------------------

/// A registered device and the host resources backing it.
pub struct KunetikModule {
    config: DeviceConfig,
    host: Box<dyn HostRegistry>,
    holdings: Holdings,
    devt: DevNumber,
    device: Arc<Device>,
}

impl KunetikModule {
    /// Load with the simulated sensor, seeded from `config.seed`.
    pub fn load(config: DeviceConfig, host: Box<dyn HostRegistry>) -> Result<Self> {
        let seed = config.seed;
        Self::load_with(config, host, move || {
            SimulatedSensor::new(seed)
                .map(|s| Box::new(s) as Box<dyn SensorBackend>)
                .map_err(|e| HostError::Refused(format!("no entropy to seed sensor: {e}")))
        })
    }

    /// Load with a caller-supplied backend.
    pub fn load_with_backend(
        config: DeviceConfig,
        host: Box<dyn HostRegistry>,
        backend: Box<dyn SensorBackend>,
    ) -> Result<Self> {
        Self::load_with(config, host, move || Ok(backend))
    }

    fn load_with(
        config: DeviceConfig,
        mut host: Box<dyn HostRegistry>,
        backend: impl FnOnce() -> std::result::Result<Box<dyn SensorBackend>, HostError>,
    ) -> Result<Self> {
        let mut holdings = Holdings {
            class: config.class.clone(),
            held: Vec::with_capacity(4),
        };

        match Self::register(&config, host.as_mut(), &mut holdings, backend) {
            Ok((devt, device)) => {
                log::info!(target: "kunetik", "{}: module loaded ({devt})", config.name);
                Ok(Self {
                    config,
                    host,
                    holdings,
                    devt,
                    device,
                })
            }
            Err(e) => {
                log::error!(target: "kunetik", "{}: load failed: {e}", config.name);
                holdings.release_all(host.as_mut());
                Err(e)
            }
        }
    }

    fn register(
        config: &DeviceConfig,
        host: &mut dyn HostRegistry,
        holdings: &mut Holdings,
        backend: impl FnOnce() -> std::result::Result<Box<dyn SensorBackend>, HostError>,
    ) -> Result<(DevNumber, Arc<Device>)> {
        host.create_class(&config.class)
            .map_err(|e| e.at(Stage::Class))?;
        holdings.held.push(Held::Class);

        let devt = host
            .alloc_numbers(&config.name)
            .map_err(|e| e.at(Stage::Numbers))?;
        holdings.held.push(Held::Numbers(devt));

        host.add_char_device(devt)
            .map_err(|e| e.at(Stage::CharDevice))?;
        holdings.held.push(Held::CharDevice(devt));

        host.create_node(&config.class, devt, &config.name)
            .map_err(|e| e.at(Stage::Node))?;
        holdings.held.push(Held::Node(devt));

        let backend = backend().map_err(|e| e.at(Stage::DeviceState))?;
        let device = Arc::new(Device::new(
            config.name.clone(),
            config.initial_unit,
            backend,
        ));
        Ok((devt, device))
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn dev_number(&self) -> DevNumber {
        self.devt
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Path of the device node this module registered.
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.config.name)
    }

    /// Tear down: reset device state, then release host resources newest-first.
    pub fn unload(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.holdings.held.is_empty() {
            return;
        }
        self.device.shutdown();
        self.holdings.release_all(self.host.as_mut());
        log::info!(target: "kunetik", "{}: module removed", self.config.name);
    }
}

impl Drop for KunetikModule {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ---------------------------------------------------------------------------
// In-process host
// ---------------------------------------------------------------------------

/// Something the in-process host did, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    ClassCreated(String),
    ClassDestroyed(String),
    NumbersAllocated(DevNumber),
    NumbersFreed(DevNumber),
    CharDeviceAdded(DevNumber),
    CharDeviceRemoved(DevNumber),
    NodeCreated(String),
    NodeDestroyed(String),
}

/// Shared view of an [`InProcessRegistry`]'s event log.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<HostEvent>>>);

impl Journal {
    fn push(&self, event: HostEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// First major number handed out; the range commonly left for local use.
const FIRST_MAJOR: u32 = 240;

/// In-memory host registry. Optionally refuses one stage to exercise unwinding.
#[derive(Debug, Default)]
pub struct InProcessRegistry {
    journal: Journal,
    next_major: u32,
    nodes: Vec<(DevNumber, String)>,
    fail_at: Option<(Stage, HostError)>,
}

impl InProcessRegistry {
    pub fn new() -> Self {
        Self {
            next_major: FIRST_MAJOR,
            ..Default::default()
        }
    }

    /// Refuse `stage` with `err`.
    pub fn failing_at(stage: Stage, err: HostError) -> Self {
        Self {
            fail_at: Some((stage, err)),
            ..Self::new()
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn check(&self, stage: Stage) -> std::result::Result<(), HostError> {
        match &self.fail_at {
            Some((s, err)) if *s == stage => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

impl HostRegistry for InProcessRegistry {
    fn create_class(&mut self, class: &str) -> std::result::Result<(), HostError> {
        self.check(Stage::Class)?;
        self.journal.push(HostEvent::ClassCreated(class.to_string()));
        Ok(())
    }

    fn destroy_class(&mut self, class: &str) {
        self.journal.push(HostEvent::ClassDestroyed(class.to_string()));
    }

    fn alloc_numbers(&mut self, _name: &str) -> std::result::Result<DevNumber, HostError> {
        self.check(Stage::Numbers)?;
        let devt = DevNumber {
            major: self.next_major,
            minor: 0,
        };
        self.next_major += 1;
        self.journal.push(HostEvent::NumbersAllocated(devt));
        Ok(devt)
    }

    fn free_numbers(&mut self, devt: DevNumber) {
        self.journal.push(HostEvent::NumbersFreed(devt));
    }

    fn add_char_device(&mut self, devt: DevNumber) -> std::result::Result<(), HostError> {
        self.check(Stage::CharDevice)?;
        self.journal.push(HostEvent::CharDeviceAdded(devt));
        Ok(())
    }

    fn remove_char_device(&mut self, devt: DevNumber) {
        self.journal.push(HostEvent::CharDeviceRemoved(devt));
    }

    fn create_node(
        &mut self,
        _class: &str,
        devt: DevNumber,
        name: &str,
    ) -> std::result::Result<(), HostError> {
        self.check(Stage::Node)?;
        self.nodes.push((devt, name.to_string()));
        self.journal.push(HostEvent::NodeCreated(name.to_string()));
        Ok(())
    }

    fn destroy_node(&mut self, _class: &str, devt: DevNumber) {
        if let Some(pos) = self.nodes.iter().position(|(d, _)| *d == devt) {
            let (_, name) = self.nodes.remove(pos);
            self.journal.push(HostEvent::NodeDestroyed(name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ScriptedSensor;
    use crate::device::ReadMode;
    use crate::readiness::CancelToken;
    use std::time::Duration;

    fn seeded() -> DeviceConfig {
        DeviceConfig {
            seed: Some(11),
            ..Default::default()
        }
    }

    fn created(journal: &Journal) -> usize {
        journal
            .events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    HostEvent::ClassCreated(_)
                        | HostEvent::NumbersAllocated(_)
                        | HostEvent::CharDeviceAdded(_)
                        | HostEvent::NodeCreated(_)
                )
            })
            .count()
    }

    // -----------------------------------------------------------------------
    // Load / unload
    // -----------------------------------------------------------------------

    #[test]
    fn test_load_registers_in_order() {
        let host = InProcessRegistry::new();
        let journal = host.journal();
        let module = KunetikModule::load(seeded(), Box::new(host)).unwrap();
        let devt = module.dev_number();
        assert_eq!(devt.major, FIRST_MAJOR);
        assert_eq!(
            journal.events(),
            vec![
                HostEvent::ClassCreated("kunetik_class".into()),
                HostEvent::NumbersAllocated(devt),
                HostEvent::CharDeviceAdded(devt),
                HostEvent::NodeCreated("kunetik".into()),
            ]
        );
        assert_eq!(module.device_path(), "/dev/kunetik");
        assert_eq!(module.device().name(), "kunetik");
    }

    #[test]
    fn test_unload_releases_in_reverse() {
        let host = InProcessRegistry::new();
        let journal = host.journal();
        let module = KunetikModule::load(seeded(), Box::new(host)).unwrap();
        let devt = module.dev_number();
        module.unload();
        let events = journal.events();
        assert_eq!(
            &events[4..],
            &[
                HostEvent::NodeDestroyed("kunetik".into()),
                HostEvent::CharDeviceRemoved(devt),
                HostEvent::NumbersFreed(devt),
                HostEvent::ClassDestroyed("kunetik_class".into()),
            ]
        );
    }

    #[test]
    fn test_drop_unloads_once() {
        let host = InProcessRegistry::new();
        let journal = host.journal();
        {
            let _module = KunetikModule::load(seeded(), Box::new(host)).unwrap();
        }
        assert_eq!(journal.events().len(), 8);
    }

    #[test]
    fn test_unload_resets_device_state() {
        let module = KunetikModule::load_with_backend(
            seeded(),
            Box::new(InProcessRegistry::new()),
            Box::new(ScriptedSensor::constant(5, 5)),
        )
        .unwrap();
        let device = Arc::clone(module.device());
        let session = device.open().unwrap();
        session.trigger_capture().unwrap();
        assert!(device.is_ready());
        module.unload();
        assert!(!device.is_open());
        assert!(!device.is_ready());
        let mut buf = [0u8; 4];
        assert_eq!(
            session.read(&mut buf, ReadMode::NonBlocking).unwrap_err(),
            DeviceError::InvalidSession
        );
    }

    #[test]
    fn test_unload_wakes_blocked_reader() {
        let module = KunetikModule::load_with_backend(
            seeded(),
            Box::new(InProcessRegistry::new()),
            Box::new(ScriptedSensor::constant(5, 5)),
        )
        .unwrap();
        let device = Arc::clone(module.device());
        let session = device.open().unwrap();
        // Never cancelled: only teardown can release the reader.
        let token = CancelToken::new();
        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let mut buf = [0u8; 4];
                session.read(&mut buf, ReadMode::Blocking(&token))
            });
            std::thread::sleep(Duration::from_millis(30));
            assert!(!reader.is_finished());
            module.unload();
            assert_eq!(
                reader.join().unwrap().unwrap_err(),
                DeviceError::InvalidSession
            );
        });
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_drop_wakes_blocked_reader() {
        let module = KunetikModule::load(seeded(), Box::new(InProcessRegistry::new())).unwrap();
        let device = Arc::clone(module.device());
        let session = device.open().unwrap();
        let token = CancelToken::new();
        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let mut buf = [0u8; 4];
                session.read(&mut buf, ReadMode::Blocking(&token))
            });
            std::thread::sleep(Duration::from_millis(30));
            drop(module);
            assert_eq!(
                reader.join().unwrap().unwrap_err(),
                DeviceError::InvalidSession
            );
        });
    }

    // -----------------------------------------------------------------------
    // Failure unwinding
    // -----------------------------------------------------------------------

    #[test]
    fn test_backend_failure_unwinds_every_stage() {
        let host = InProcessRegistry::new();
        let journal = host.journal();
        let err = KunetikModule::load_with(seeded(), Box::new(host), || {
            Err(HostError::Refused("sensor unavailable".into()))
        })
        .err()
        .unwrap();
        assert_eq!(
            err,
            DeviceError::Registration {
                stage: Stage::DeviceState,
                reason: "sensor unavailable".into()
            }
        );
        let devt = DevNumber {
            major: FIRST_MAJOR,
            minor: 0,
        };
        assert_eq!(
            journal.events(),
            vec![
                HostEvent::ClassCreated("kunetik_class".into()),
                HostEvent::NumbersAllocated(devt),
                HostEvent::CharDeviceAdded(devt),
                HostEvent::NodeCreated("kunetik".into()),
                HostEvent::NodeDestroyed("kunetik".into()),
                HostEvent::CharDeviceRemoved(devt),
                HostEvent::NumbersFreed(devt),
                HostEvent::ClassDestroyed("kunetik_class".into()),
            ]
        );
    }

    #[test]
    fn test_backend_out_of_memory_is_resource_exhausted() {
        let host = InProcessRegistry::new();
        let journal = host.journal();
        let err = KunetikModule::load_with(seeded(), Box::new(host), || {
            Err(HostError::OutOfMemory)
        })
        .err()
        .unwrap();
        assert_eq!(err, DeviceError::ResourceExhausted("device state".into()));
        assert_eq!(journal.events().len(), created(&journal) * 2);
    }

    #[test]
    fn test_class_failure_acquires_nothing() {
        let host = InProcessRegistry::failing_at(Stage::Class, HostError::OutOfMemory);
        let journal = host.journal();
        let err = KunetikModule::load(seeded(), Box::new(host)).err().unwrap();
        assert_eq!(err, DeviceError::ResourceExhausted("device class".into()));
        assert!(journal.events().is_empty());
    }

    #[test]
    fn test_node_failure_unwinds_in_reverse() {
        let host = InProcessRegistry::failing_at(Stage::Node, HostError::OutOfMemory);
        let journal = host.journal();
        let err = KunetikModule::load(seeded(), Box::new(host)).err().unwrap();
        assert!(matches!(err, DeviceError::ResourceExhausted(_)));
        let devt = DevNumber {
            major: FIRST_MAJOR,
            minor: 0,
        };
        assert_eq!(
            journal.events(),
            vec![
                HostEvent::ClassCreated("kunetik_class".into()),
                HostEvent::NumbersAllocated(devt),
                HostEvent::CharDeviceAdded(devt),
                HostEvent::CharDeviceRemoved(devt),
                HostEvent::NumbersFreed(devt),
                HostEvent::ClassDestroyed("kunetik_class".into()),
            ]
        );
    }

    #[test]
    fn test_every_stage_failure_releases_everything() {
        for stage in [Stage::Class, Stage::Numbers, Stage::CharDevice, Stage::Node] {
            let host = InProcessRegistry::failing_at(stage, HostError::Refused("busy".into()));
            let journal = host.journal();
            let err = KunetikModule::load(seeded(), Box::new(host)).err().unwrap();
            assert_eq!(
                err,
                DeviceError::Registration {
                    stage,
                    reason: "busy".into()
                }
            );
            let events = journal.events();
            assert_eq!(events.len(), created(&journal) * 2, "{stage}: {events:?}");
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Numbers.to_string(), "device numbers");
        assert_eq!(Stage::DeviceState.to_string(), "device state");
    }
}
