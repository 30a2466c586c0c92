//! Kernel objects.
//!
//! A [`FileObject`] is one open stream: a tmpfs file with its cursor, a
//! device endpoint, a pipe end. [`KernelObject`] is the reference-counted
//! handle the descriptor layer hands out; duplicating a descriptor clones
//! the handle, and the stream's `release` hook runs exactly once when the
//! last handle is dropped.

pub mod fd_table;

pub use fd_table::{FdFlags, FdTable};

extern crate alloc;

use alloc::sync::Arc;

use crate::device::CharDevice;
use crate::error::{KernelError, Result};
use crate::fs::vfs::core::VfsNode;
use crate::fs::{FileMetadata, SeekFrom};
use crate::vm::MapProt;

/// One open stream. Every operation defaults to `NotSupported` so a
/// backend only implements what it can actually do.
pub trait FileObject: Send + Sync {
    fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(KernelError::NotSupported)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(KernelError::NotSupported)
    }

    fn seek(&self, _whence: SeekFrom) -> Result<u64> {
        Err(KernelError::NotSupported)
    }

    fn metadata(&self) -> Result<FileMetadata> {
        Err(KernelError::NotSupported)
    }

    fn ioctl(&self, _request: u32, _arg: usize) -> Result<usize> {
        Err(KernelError::NotSupported)
    }

    fn truncate(&self, _length: usize) -> Result<()> {
        Err(KernelError::NotSupported)
    }

    fn chmod(&self, _mode: u32) -> Result<()> {
        Err(KernelError::NotSupported)
    }

    fn chown(&self, _uid: u32, _gid: u32) -> Result<()> {
        Err(KernelError::NotSupported)
    }

    fn mmap(&self, _addr: usize, _length: usize, _prot: MapProt, _offset: usize) -> Result<usize> {
        Err(KernelError::NotSupported)
    }

    fn is_tty(&self) -> bool {
        false
    }

    /// The VFS node behind this stream, when there is one.
    fn node(&self) -> Option<Arc<VfsNode>> {
        None
    }

    /// The device behind this stream, when there is one.
    fn device(&self) -> Option<Arc<dyn CharDevice>> {
        None
    }

    /// Close hook. Runs exactly once, when the last [`KernelObject`]
    /// referencing this stream is dropped.
    fn release(&self) {}
}

struct ObjectInner {
    file: Arc<dyn FileObject>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        self.file.release();
    }
}

/// Reference-counted handle to a [`FileObject`].
#[derive(Clone)]
pub struct KernelObject {
    inner: Arc<ObjectInner>,
}

impl KernelObject {
    pub fn new(file: Arc<dyn FileObject>) -> Self {
        Self {
            inner: Arc::new(ObjectInner { file }),
        }
    }

    pub fn file(&self) -> &Arc<dyn FileObject> {
        &self.inner.file
    }

    /// Number of live handles sharing this stream.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
