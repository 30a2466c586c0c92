//! Syscall dispatch.
//!
//! The trap path hands a [`SyscallFrame`] (trap number plus the five
//! argument words, fetched unconditionally) to [`SyscallTable::dispatch`],
//! which demuxes through a fixed 256-entry table. Handlers get the frame
//! and a backpointer to the trapping thread; an empty slot answers with a
//! negated `NotSupported` errno instead of faulting.

extern crate alloc;

use alloc::sync::Arc;
use spin::{Mutex, Once};

use crate::environment::SYSCALL_TABLE_SIZE;
use crate::error::{KernelError, Result};
use crate::task::Thread;

/// Register file view of a syscall trap: number plus five argument words.
#[derive(Debug, Clone)]
pub struct SyscallFrame {
    pub number: usize,
    pub args: [usize; 5],
}

impl SyscallFrame {
    pub fn new(number: usize, args: [usize; 5]) -> Self {
        Self { number, args }
    }
}

pub type SyscallHandler = fn(&SyscallFrame, &Arc<Thread>) -> isize;

#[derive(Clone, Copy)]
struct SyscallEntry {
    /// Declared arity, kept for introspection; dispatch always passes all
    /// five words.
    argc: u8,
    handler: SyscallHandler,
}

pub struct SyscallTable {
    entries: Mutex<[Option<SyscallEntry>; SYSCALL_TABLE_SIZE]>,
}

impl SyscallTable {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new([None; SYSCALL_TABLE_SIZE]),
        }
    }

    /// Register `handler` for syscall `number`.
    pub fn register(&self, number: usize, argc: u8, handler: SyscallHandler) -> Result<()> {
        if number >= SYSCALL_TABLE_SIZE || argc > 5 {
            return Err(KernelError::InvalidArgument);
        }
        let mut entries = self.entries.lock();
        if entries[number].is_some() {
            return Err(KernelError::AlreadyExists);
        }
        entries[number] = Some(SyscallEntry { argc, handler });
        Ok(())
    }

    pub fn is_registered(&self, number: usize) -> bool {
        number < SYSCALL_TABLE_SIZE && self.entries.lock()[number].is_some()
    }

    pub fn argc(&self, number: usize) -> Option<u8> {
        if number >= SYSCALL_TABLE_SIZE {
            return None;
        }
        self.entries.lock()[number].map(|e| e.argc)
    }

    /// Demux `frame` to its handler.
    pub fn dispatch(&self, frame: &SyscallFrame, thread: &Arc<Thread>) -> isize {
        let entry = if frame.number < SYSCALL_TABLE_SIZE {
            self.entries.lock()[frame.number]
        } else {
            None
        };
        match entry {
            Some(entry) => (entry.handler)(frame, thread),
            None => -(KernelError::NotSupported.errno() as isize),
        }
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::new()
    }
}

static SYSCALL_TABLE: Once<SyscallTable> = Once::new();

pub fn get_syscall_table() -> &'static SyscallTable {
    SYSCALL_TABLE.call_once(SyscallTable::new)
}
