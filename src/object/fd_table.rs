//! Per-process file descriptor table.

extern crate alloc;

use alloc::vec::Vec;
use bitflags::bitflags;
use spin::Mutex;

use crate::environment::MAX_FDS;
use crate::error::{KernelError, Result};

use super::KernelObject;

bitflags! {
    /// Per-descriptor flags. These belong to the slot, not the stream:
    /// duplicates of a descriptor start with empty flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FdFlags: u32 {
        const CLOEXEC = 1 << 0;
    }
}

#[derive(Clone)]
struct FdEntry {
    object: KernelObject,
    flags: FdFlags,
}

pub struct FdTable {
    slots: Mutex<Vec<Option<FdEntry>>>,
}

impl FdTable {
    pub fn new() -> Self {
        let mut slots = Vec::new();
        slots.resize_with(MAX_FDS, || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Lowest free descriptor number.
    pub fn get_free_descriptor(&self) -> Result<usize> {
        let slots = self.slots.lock();
        slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(KernelError::TooManyOpenFiles)
    }

    /// Bind `object` to descriptor `fd`. The slot must be free.
    pub fn install(&self, fd: usize, object: KernelObject) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(fd).ok_or(KernelError::BadDescriptor)?;
        if slot.is_some() {
            return Err(KernelError::AlreadyExists);
        }
        *slot = Some(FdEntry {
            object,
            flags: FdFlags::empty(),
        });
        Ok(())
    }

    /// Allocate the lowest free descriptor and bind `object` to it.
    pub fn open(&self, object: KernelObject) -> Result<usize> {
        let mut slots = self.slots.lock();
        let fd = slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(KernelError::TooManyOpenFiles)?;
        slots[fd] = Some(FdEntry {
            object,
            flags: FdFlags::empty(),
        });
        Ok(fd)
    }

    pub fn get(&self, fd: usize) -> Result<KernelObject> {
        let slots = self.slots.lock();
        slots
            .get(fd)
            .and_then(|s| s.as_ref())
            .map(|e| e.object.clone())
            .ok_or(KernelError::BadDescriptor)
    }

    pub fn close(&self, fd: usize) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(fd).ok_or(KernelError::BadDescriptor)?;
        slot.take().map(|_| ()).ok_or(KernelError::BadDescriptor)
    }

    /// `dup`: clone the stream handle into the lowest free slot.
    pub fn duplicate(&self, fd: usize) -> Result<usize> {
        let mut slots = self.slots.lock();
        let entry = slots
            .get(fd)
            .and_then(|s| s.as_ref())
            .ok_or(KernelError::BadDescriptor)?
            .clone();
        let new_fd = slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(KernelError::TooManyOpenFiles)?;
        slots[new_fd] = Some(FdEntry {
            object: entry.object,
            flags: FdFlags::empty(),
        });
        Ok(new_fd)
    }

    /// `dup2`: clone `old_fd` onto `new_fd`, closing whatever occupied it.
    pub fn duplicate_onto(&self, old_fd: usize, new_fd: usize) -> Result<usize> {
        if old_fd == new_fd {
            // POSIX: a no-op as long as old_fd is valid.
            self.get(old_fd)?;
            return Ok(new_fd);
        }
        let mut slots = self.slots.lock();
        let entry = slots
            .get(old_fd)
            .and_then(|s| s.as_ref())
            .ok_or(KernelError::BadDescriptor)?
            .clone();
        let slot = slots.get_mut(new_fd).ok_or(KernelError::BadDescriptor)?;
        *slot = Some(FdEntry {
            object: entry.object,
            flags: FdFlags::empty(),
        });
        Ok(new_fd)
    }

    pub fn flags(&self, fd: usize) -> Result<FdFlags> {
        let slots = self.slots.lock();
        slots
            .get(fd)
            .and_then(|s| s.as_ref())
            .map(|e| e.flags)
            .ok_or(KernelError::BadDescriptor)
    }

    pub fn set_flags(&self, fd: usize, flags: FdFlags) -> Result<()> {
        let mut slots = self.slots.lock();
        let entry = slots
            .get_mut(fd)
            .and_then(|s| s.as_mut())
            .ok_or(KernelError::BadDescriptor)?;
        entry.flags = flags;
        Ok(())
    }

    /// Exec-time sweep: drop every descriptor marked close-on-exec.
    pub fn close_exec(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|e| e.flags.contains(FdFlags::CLOEXEC)) {
                *slot = None;
            }
        }
    }

    pub fn close_all(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            *slot = None;
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Descriptor numbers currently in use, with their flags.
    pub fn descriptors(&self) -> Vec<(usize, FdFlags)> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(fd, s)| s.as_ref().map(|e| (fd, e.flags)))
            .collect()
    }

    /// Fork-time copy: every descriptor of `parent`, with its flags, is
    /// cloned into this table, sharing the streams.
    pub fn clone_from(&self, parent: &FdTable) {
        let src = parent.slots.lock();
        let mut dst = self.slots.lock();
        for (fd, slot) in src.iter().enumerate() {
            dst[fd] = slot.clone();
        }
    }

    /// Fork-time copy into a fresh table.
    pub fn clone_table(&self) -> Self {
        let table = Self::new();
        table.clone_from(self);
        table
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
