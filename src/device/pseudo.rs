//! Pseudo devices: null, full, zero.
//!
//! These define the edge-case semantics of the device contract:
//! null drains writes and reads as end-of-stream, full refuses writes with
//! `NoSpace` and reads as end-of-stream, zero satisfies any read with
//! zeroes of exactly the requested length and discards writes.

use crate::error::{KernelError, Result};

use super::CharDevice;

pub struct NullDevice;

impl CharDevice for NullDevice {
    fn name(&self) -> &'static str {
        "null"
    }

    fn read(&self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        Ok(0)
    }

    fn write(&self, buf: &[u8], _offset: u64) -> Result<usize> {
        Ok(buf.len())
    }
}

pub struct FullDevice;

impl CharDevice for FullDevice {
    fn name(&self) -> &'static str {
        "full"
    }

    fn read(&self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        Ok(0)
    }

    fn write(&self, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(KernelError::NoSpace)
    }
}

pub struct ZeroDevice;

impl CharDevice for ZeroDevice {
    fn name(&self) -> &'static str {
        "zero"
    }

    fn read(&self, buf: &mut [u8], _offset: u64) -> Result<usize> {
        for b in buf.iter_mut() {
            *b = 0;
        }
        Ok(buf.len())
    }

    fn write(&self, buf: &[u8], _offset: u64) -> Result<usize> {
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_device_fills_requested_length() {
        let dev = ZeroDevice;
        let mut buf = [0xffu8; 16];
        assert_eq!(dev.read(&mut buf, 0).unwrap(), 16);
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn full_device_reports_no_space_and_stays_unchanged() {
        let dev = FullDevice;
        assert_eq!(dev.write(b"x", 0), Err(KernelError::NoSpace));
        let mut buf = [0u8; 4];
        // Reads still behave: end of stream.
        assert_eq!(dev.read(&mut buf, 0).unwrap(), 0);
    }

    #[test]
    fn null_device_drains_writes() {
        let dev = NullDevice;
        assert_eq!(dev.write(b"discarded", 0).unwrap(), 9);
        let mut buf = [0u8; 4];
        assert_eq!(dev.read(&mut buf, 0).unwrap(), 0);
    }
}
