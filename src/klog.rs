//! Kernel message log.
//!
//! An append-only byte ring the kernel itself writes into. Old data is
//! dropped from the front when the ring overflows, but offsets stay
//! monotonic so a reader can follow the stream from any position it last
//! saw. The kmsg device (`device::kmsg`) is a read-only view of this ring.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::string::String;
use spin::{Mutex, Once};

use crate::environment::KLOG_CAPACITY;

struct LogInner {
    data: VecDeque<u8>,
    /// Byte offset of the front of `data` in the overall stream.
    head: u64,
}

/// The kernel message ring.
pub struct KernelLog {
    inner: Mutex<LogInner>,
}

impl KernelLog {
    const fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                data: VecDeque::new(),
                head: 0,
            }),
        }
    }

    /// Append a line to the ring, evicting from the front on overflow.
    pub fn append(&self, line: &str) {
        let mut inner = self.inner.lock();
        for &b in line.as_bytes() {
            inner.data.push_back(b);
        }
        inner.data.push_back(b'\n');
        while inner.data.len() > KLOG_CAPACITY {
            inner.data.pop_front();
            inner.head += 1;
        }
    }

    /// Read from the stream starting at `offset`. Offsets older than the
    /// ring's retained window are clamped to the oldest available byte.
    /// Returns the number of bytes copied; 0 means end of stream.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        let start = if offset < inner.head {
            0
        } else {
            (offset - inner.head) as usize
        };
        if start >= inner.data.len() {
            return 0;
        }
        let mut copied = 0;
        for (i, &b) in inner.data.iter().skip(start).enumerate() {
            if i >= buf.len() {
                break;
            }
            buf[i] = b;
            copied += 1;
        }
        copied
    }

    /// Offset one past the last byte written so far.
    pub fn end_offset(&self) -> u64 {
        let inner = self.inner.lock();
        inner.head + inner.data.len() as u64
    }
}

static KLOG: Once<KernelLog> = Once::new();

pub fn kernel_log() -> &'static KernelLog {
    KLOG.call_once(KernelLog::new)
}

#[doc(hidden)]
pub fn log_line(level: &str, args: core::fmt::Arguments) {
    let line: String = alloc::format!("[{}] {}", level, args);
    kernel_log().append(&line);
    #[cfg(test)]
    std::eprintln!("{}", line);
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {
        $crate::klog::log_line("info", ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::klog::log_line("warn", ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::klog::log_line("error", ::core::format_args!($($arg)*))
    };
}
