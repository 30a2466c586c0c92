//! Device abstraction.
//!
//! Every character device, real hardware or pseudo, implements
//! [`CharDevice`]. Hooks a device does not provide fall through to default
//! bodies returning `NotSupported`; an unset hook is never a fault.
//! Devices are registered once under a (major, minor) pair and never
//! unregistered.

pub mod kmsg;
pub mod manager;
pub mod pseudo;
pub mod queue;

use crate::error::{KernelError, Result};
use crate::vm::MapProt;

/// Reserved major numbers for the built-in device classes.
pub mod major {
    pub const CONSOLE: u8 = 1;
    pub const PTY: u8 = 2;
    pub const SERIAL: u8 = 3;
    pub const PSEUDO: u8 = 4;
    pub const MOUSE: u8 = 5;
    pub const KEYBOARD: u8 = 6;
    pub const RTC: u8 = 7;
    pub const DISK: u8 = 8;
    pub const KMSG: u8 = 9;
}

/// Device identity: a (major, minor) byte pair packed into 16 bits.
/// High byte selects the class, low byte the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub major: u8,
    pub minor: u8,
}

impl DeviceId {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub const fn packed(&self) -> u16 {
        ((self.major as u16) << 8) | self.minor as u16
    }

    pub const fn from_packed(raw: u16) -> Self {
        Self {
            major: (raw >> 8) as u8,
            minor: (raw & 0xff) as u8,
        }
    }
}

/// Character device operation table.
pub trait CharDevice: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once when the device is registered.
    fn init(&self) {}

    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn read(&self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        Err(KernelError::NotSupported)
    }

    fn write(&self, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(KernelError::NotSupported)
    }

    fn ioctl(&self, _request: u32, _arg: usize) -> Result<usize> {
        Err(KernelError::NotSupported)
    }

    fn is_tty(&self) -> bool {
        false
    }

    fn mmap(&self, _addr: usize, _len: usize, _prot: MapProt, _offset: u64) -> Result<usize> {
        Err(KernelError::NotSupported)
    }
}
