//! Device configuration.

use crate::unit::Unit;

/// Default device node name.
pub const DEFAULT_DEVICE_NAME: &str = "kunetik";
/// Default device class name.
pub const DEFAULT_CLASS_NAME: &str = "kunetik_class";

/// Configuration for loading the device module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Name registered for the device numbers and the device node.
    pub name: String,
    /// Device class the node is created under.
    pub class: String,
    /// Unit active right after load.
    pub initial_unit: Unit,
    /// Seed for the simulated sensor. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            class: DEFAULT_CLASS_NAME.to_string(),
            initial_unit: Unit::Celsius,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = DeviceConfig::default();
        assert_eq!(c.name, "kunetik");
        assert_eq!(c.class, "kunetik_class");
        assert_eq!(c.initial_unit, Unit::Celsius);
        assert!(c.seed.is_none());
    }

    #[test]
    fn test_struct_update_syntax() {
        let c = DeviceConfig {
            seed: Some(42),
            initial_unit: Unit::Fahrenheit,
            ..Default::default()
        };
        assert_eq!(c.seed, Some(42));
        assert_eq!(c.name, DEFAULT_DEVICE_NAME);
    }
}
