//! Kernel message log device.
//!
//! A read-only view of the append-only klog ring. Reads honor the supplied
//! offset so a log follower can resume from wherever it left off.

use crate::error::{KernelError, Result};
use crate::klog::kernel_log;

use super::CharDevice;

pub struct KmsgDevice;

impl CharDevice for KmsgDevice {
    fn name(&self) -> &'static str {
        "kmsg"
    }

    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(kernel_log().read_at(offset, buf))
    }

    fn write(&self, _buf: &[u8], _offset: u64) -> Result<usize> {
        // The ring is written by the kernel itself, not through the device.
        Err(KernelError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinfo;

    #[test]
    fn kmsg_reads_from_offset() {
        let mark = kernel_log().end_offset();
        kinfo!("kmsg device test marker");
        let dev = KmsgDevice;
        let mut buf = [0u8; 4096];
        let n = dev.read(&mut buf, mark).unwrap();
        assert!(n > 0);
        let text = core::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.contains("kmsg device test marker"));
    }
}
