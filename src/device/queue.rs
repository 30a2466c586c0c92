//! FIFO-backed blocking input device.
//!
//! The shape shared by the raw keyboard, mouse and RTC drivers: an interrupt
//! handler deposits bytes into a backing FIFO, and a reading thread polls
//! that FIFO in a cooperative yield loop. The loop re-checks the calling
//! thread's exit-requested flag every iteration so a signaled thread
//! unblocks with `Interrupted` instead of spinning forever.

extern crate alloc;

use alloc::sync::Arc;

use crate::collections::Fifo;
use crate::environment::FIFO_CAPACITY;
use crate::error::{KernelError, Result};
use crate::sched::{current_thread, yield_now};
use crate::task::Thread;

use super::CharDevice;

pub struct QueueDevice {
    device_name: &'static str,
    queue: Fifo,
    tty: bool,
}

impl QueueDevice {
    pub fn new(device_name: &'static str) -> Self {
        Self {
            device_name,
            queue: Fifo::new(FIFO_CAPACITY),
            tty: false,
        }
    }

    pub fn new_tty(device_name: &'static str) -> Self {
        Self {
            device_name,
            queue: Fifo::new(FIFO_CAPACITY),
            tty: true,
        }
    }

    /// Interrupt-side entry point: deposit input for blocked readers.
    /// Bytes that do not fit are dropped, as real input queues do.
    pub fn push_input(&self, data: &[u8]) -> usize {
        self.queue.push_slice(data)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Blocking read on behalf of `thread`. Returns as soon as at least one
    /// byte is available, or `Interrupted` once the thread is asked to exit.
    pub fn read_blocking(&self, thread: &Arc<Thread>, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.queue.pop_slice(buf);
            if n > 0 {
                return Ok(n);
            }
            if thread.exit_requested() {
                return Err(KernelError::Interrupted);
            }
            yield_now();
        }
    }
}

impl CharDevice for QueueDevice {
    fn name(&self) -> &'static str {
        self.device_name
    }

    /// Contract read: blocks in the cooperative yield loop on behalf of
    /// the current thread. Without a thread context (interrupt side, early
    /// boot) an empty FIFO reports `WouldBlock` instead.
    fn read(&self, buf: &mut [u8], _offset: u64) -> Result<usize> {
        match current_thread() {
            Some(thread) => self.read_blocking(&thread, buf),
            None => {
                let n = self.queue.pop_slice(buf);
                if n == 0 {
                    return Err(KernelError::WouldBlock);
                }
                Ok(n)
            }
        }
    }

    fn is_tty(&self) -> bool {
        self.tty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Process;
    use std::thread as host;

    #[test]
    fn read_returns_deposited_input() {
        let dev = QueueDevice::new("kbd-test");
        assert_eq!(dev.push_input(b"abc"), 3);
        let mut buf = [0u8; 8];
        assert_eq!(dev.read(&mut buf, 0).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn trait_read_blocks_until_input_in_thread_context() {
        use crate::sched::get_scheduler;

        let dev = Arc::new(QueueDevice::new("kbd-trait"));
        let proc = Process::create("trait-reader", None);
        get_scheduler().set_current(Some(proc.main_thread()));

        let reader = {
            let dev = Arc::clone(&dev);
            host::spawn(move || {
                let mut buf = [0u8; 4];
                let n = CharDevice::read(dev.as_ref(), &mut buf, 0)?;
                Ok::<_, KernelError>(buf[..n].to_vec())
            })
        };
        host::yield_now();
        dev.push_input(b"z");
        assert_eq!(reader.join().unwrap().unwrap(), alloc::vec![b'z']);
        get_scheduler().set_current(None);
        crate::task::get_process_table().remove(proc.pid());
    }

    #[test]
    fn blocking_read_wakes_on_interrupt_delivery() {
        let dev = Arc::new(QueueDevice::new("mouse-test"));
        let proc = Process::create("queue-reader", None);
        let thread = proc.main_thread();

        let reader = {
            let dev = Arc::clone(&dev);
            let thread = Arc::clone(&thread);
            host::spawn(move || {
                let mut buf = [0u8; 4];
                let n = dev.read_blocking(&thread, &mut buf)?;
                Ok::<_, KernelError>(buf[..n].to_vec())
            })
        };

        // Simulate the interrupt handler depositing data.
        host::yield_now();
        dev.push_input(&[0x42]);
        assert_eq!(reader.join().unwrap().unwrap(), alloc::vec![0x42]);
    }

    #[test]
    fn blocking_read_honors_exit_request() {
        let dev = Arc::new(QueueDevice::new("rtc-test"));
        let proc = Process::create("queue-cancel", None);
        let thread = proc.main_thread();

        let reader = {
            let dev = Arc::clone(&dev);
            let thread = Arc::clone(&thread);
            host::spawn(move || {
                let mut buf = [0u8; 4];
                dev.read_blocking(&thread, &mut buf)
            })
        };
        host::yield_now();
        thread.request_exit();
        assert_eq!(reader.join().unwrap(), Err(KernelError::Interrupted));
    }
}
