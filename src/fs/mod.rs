//! Filesystem layer.
//!
//! Common types shared by the VFS core, the filesystem drivers and the file
//! object layer, plus the driver registry that `mount` consults by name.

pub mod fifo;
pub mod initramfs;
pub mod tmpfs;
pub mod vfs;

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use bitflags::bitflags;
use hashbrown::HashMap;
use spin::{Mutex, Once};

use crate::device::CharDevice;
use crate::device::DeviceId;
use crate::error::{KernelError, Result};
use crate::fs::vfs::core::FileSystemOperations;

/// What a VFS node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    RegularFile,
    Directory,
    CharDevice(DeviceId),
    Fifo,
    SymbolicLink,
    Socket,
}

bitflags! {
    /// Open flags carried by `open` and stored on the file object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
        const TRUNCATE = 1 << 3;
        const APPEND = 1 << 4;
        const NONBLOCK = 1 << 5;
    }
}

/// Node attributes reported by `stat`-style operations.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file_type: FileType,
    pub size: usize,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub inode: u64,
    pub modified_time: u64,
}

/// One entry reported by `readdir`.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub file_type: FileType,
    pub inode: u64,
}

/// Seek origin for file objects.
#[derive(Debug, Clone, Copy)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}

/// A filesystem driver knows how to instantiate a filesystem, optionally on
/// top of a backing device.
pub trait FileSystemDriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(
        &self,
        device: Option<Arc<dyn CharDevice>>,
        options: Option<&str>,
    ) -> Result<Arc<dyn FileSystemOperations>>;
}

/// Registry of filesystem drivers, keyed by name.
pub struct FileSystemDriverManager {
    drivers: Mutex<HashMap<String, Box<dyn FileSystemDriver>>>,
}

impl FileSystemDriverManager {
    fn new() -> Self {
        Self {
            drivers: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, driver: Box<dyn FileSystemDriver>) {
        let mut drivers = self.drivers.lock();
        drivers.insert(driver.name().to_string(), driver);
    }

    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.lock().contains_key(name)
    }

    /// Instantiate the named filesystem against `device`.
    pub fn create_filesystem(
        &self,
        name: &str,
        device: Option<Arc<dyn CharDevice>>,
        options: Option<&str>,
    ) -> Result<Arc<dyn FileSystemOperations>> {
        let drivers = self.drivers.lock();
        let driver = drivers.get(name).ok_or(KernelError::NoSuchEntry)?;
        driver.create(device, options)
    }
}

static DRIVER_MANAGER: Once<FileSystemDriverManager> = Once::new();

pub fn get_fs_driver_manager() -> &'static FileSystemDriverManager {
    DRIVER_MANAGER.call_once(FileSystemDriverManager::new)
}
