//! Typed outcomes for every device entry point.
//!
//! Session, control and read failures are returned to the immediate caller and
//! never retried internally. Capture faults live in their own type because they
//! never escape a capture trigger: the device logs them and keeps serving the
//! last good sample.

use crate::registry::Stage;

/// Errors returned by the session manager and module lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Open attempted while another session holds the device.
    #[error("device is already in use")]
    AlreadyInUse,

    /// Operation on (or release of) a session that is not the open one.
    #[error("session is not open")]
    InvalidSession,

    /// Unknown unit tag, unknown control command or malformed payload.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-blocking read with no captured sample available.
    #[error("no sample ready, operation would block")]
    WouldBlock,

    /// Blocking read cancelled before a sample became ready.
    #[error("read interrupted before a sample was ready")]
    Interrupted,

    /// The device is read/control-only.
    #[error("write is not supported by this device")]
    NotSupported,

    /// Allocation failure while loading the module.
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The host registry refused a registration step for a reason other than memory.
    #[error("registration failed at {stage}: {reason}")]
    Registration { stage: Stage, reason: String },
}

impl DeviceError {
    /// Negative errno equivalent for hosts that speak the classic character-device ABI.
    pub fn errno(&self) -> i32 {
        match self {
            Self::AlreadyInUse => -16,          // EBUSY
            Self::InvalidSession => -22,        // EINVAL
            Self::InvalidArgument(_) => -22,    // EINVAL
            Self::WouldBlock => -11,            // EAGAIN
            Self::Interrupted => -512,          // ERESTARTSYS
            Self::NotSupported => -14,          // EFAULT
            Self::ResourceExhausted(_) => -12,  // ENOMEM
            Self::Registration { .. } => -19,   // ENODEV
        }
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// A sensor backend failed to produce a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("sensor did not respond")]
    NoResponse,

    #[error("sensor fault: {0}")]
    Fault(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(DeviceError::AlreadyInUse.errno(), -16);
        assert_eq!(DeviceError::WouldBlock.errno(), -11);
        assert_eq!(DeviceError::Interrupted.errno(), -512);
        assert_eq!(DeviceError::NotSupported.errno(), -14);
        assert_eq!(DeviceError::InvalidArgument("x".into()).errno(), -22);
        assert_eq!(DeviceError::ResourceExhausted("buf".into()).errno(), -12);
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(DeviceError::AlreadyInUse.to_string(), "device is already in use");
        assert_eq!(
            DeviceError::InvalidArgument("unit tag 7".into()).to_string(),
            "invalid argument: unit tag 7"
        );
        let e = DeviceError::Registration {
            stage: Stage::Node,
            reason: "busy".into(),
        };
        assert_eq!(e.to_string(), "registration failed at device node: busy");
    }
}
