//! Out-of-band control commands and their opcode encoding.
//!
//! Opcodes follow the classic `_IOC(dir, type, nr, size)` layout with type
//! `'V'`, so hosts that forward raw ioctl numbers can decode them directly.
//!
//! | opcode        | command        | payload               |
//! |---------------|----------------|-----------------------|
//! | `0x4001_5600` | SetUnit        | in: 1 byte unit tag   |
//! | `0x8001_5601` | GetUnit        | out: 1 byte unit tag  |
//! | `0x0000_5602` | TriggerCapture | none                  |

use crate::error::{DeviceError, Result};
use crate::unit::Unit;

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

/// Magic type byte shared by every Kunetik opcode.
pub const IOC_MAGIC: u8 = b'V';

const fn ioc(dir: u32, nr: u32, size: u32) -> u32 {
    (dir << IOC_DIRSHIFT)
        | (size << IOC_SIZESHIFT)
        | ((IOC_MAGIC as u32) << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)
}

pub const SET_UNIT: u32 = ioc(IOC_WRITE, 0, 1);
pub const GET_UNIT: u32 = ioc(IOC_READ, 1, 1);
pub const TRIGGER_CAPTURE: u32 = ioc(IOC_NONE, 2, 0);

/// A decoded control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Switch units. The tag is validated by the configuration, not here.
    SetUnit(u8),
    GetUnit,
    TriggerCapture,
}

impl ControlCommand {
    /// Decode an opcode plus its inbound payload.
    pub fn decode(opcode: u32, payload: &[u8]) -> Result<Self> {
        match opcode {
            SET_UNIT => payload
                .first()
                .copied()
                .map(Self::SetUnit)
                .ok_or_else(|| DeviceError::InvalidArgument("SetUnit needs a 1-byte payload".into())),
            GET_UNIT => Ok(Self::GetUnit),
            TRIGGER_CAPTURE => Ok(Self::TriggerCapture),
            other => Err(DeviceError::InvalidArgument(format!(
                "unknown control opcode {other:#010x}"
            ))),
        }
    }

    pub fn opcode(&self) -> u32 {
        match self {
            Self::SetUnit(_) => SET_UNIT,
            Self::GetUnit => GET_UNIT,
            Self::TriggerCapture => TRIGGER_CAPTURE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetUnit(_) => "set_unit",
            Self::GetUnit => "get_unit",
            Self::TriggerCapture => "trigger_capture",
        }
    }
}

impl From<Unit> for ControlCommand {
    fn from(unit: Unit) -> Self {
        Self::SetUnit(unit.tag())
    }
}

/// What a control command hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    /// Nothing to copy out.
    Done,
    /// Current unit tag for GetUnit.
    Unit(u8),
}

impl ControlReply {
    /// Outbound payload bytes for the host to copy back.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Done => Vec::new(),
            Self::Unit(tag) => vec![*tag],
        }
    }
}
