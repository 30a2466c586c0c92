//! In-memory filesystem.
//!
//! The root filesystem of the kernel and the target the initramfs archive
//! unpacks into. Regular-file contents live in chunked buffers so appends
//! never copy; directories keep their entries in an insertion-ordered
//! dictionary; FIFO and device nodes carry no data of their own, only the
//! state needed to open them.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use spin::Once;

use crate::collections::{ChunkBuffer, Dict};
use crate::device::manager::get_device_manager;
use crate::device::CharDevice;
use crate::error::{KernelError, Result};
use crate::fs::fifo::FifoState;
use crate::fs::vfs::core::{FileSystemOperations, VfsNode};
use crate::fs::{
    get_fs_driver_manager, DirectoryEntry, FileMetadata, FileSystemDriver, FileType, OpenFlags,
    SeekFrom,
};
use crate::object::FileObject;
use crate::sched::current_thread;
use crate::vm::MapProt;

/// Per-node payload, stored as the node's private data.
struct TmpNode {
    data: TmpData,
}

enum TmpData {
    File(ChunkBuffer),
    Directory(Dict<Arc<VfsNode>>),
    Symlink(String),
    Fifo(Arc<FifoState>),
    Device,
}

impl TmpNode {
    fn for_type(file_type: FileType) -> Result<Self> {
        let data = match file_type {
            FileType::RegularFile => TmpData::File(ChunkBuffer::new()),
            FileType::Directory => TmpData::Directory(Dict::new()),
            FileType::Fifo => TmpData::Fifo(Arc::new(FifoState::new())),
            FileType::CharDevice(_) => TmpData::Device,
            // Symlinks need a target; they go through `TmpFs::symlink`.
            FileType::SymbolicLink | FileType::Socket => {
                return Err(KernelError::InvalidArgument)
            }
        };
        Ok(Self { data })
    }

    fn entries(&self) -> Result<&Dict<Arc<VfsNode>>> {
        match &self.data {
            TmpData::Directory(entries) => Ok(entries),
            _ => Err(KernelError::NotADirectory),
        }
    }
}

pub struct TmpFs {
    fs_ref: Once<Weak<dyn FileSystemOperations>>,
    root: Once<Arc<VfsNode>>,
    next_inode: AtomicU64,
}

impl TmpFs {
    pub fn new() -> Arc<Self> {
        let fs = Arc::new(Self {
            fs_ref: Once::new(),
            root: Once::new(),
            next_inode: AtomicU64::new(1),
        });
        let concrete: Weak<TmpFs> = Arc::downgrade(&fs);
        let weak: Weak<dyn FileSystemOperations> = concrete;
        fs.fs_ref.call_once(|| weak.clone());
        let root = VfsNode::with_private(
            weak,
            "/",
            fs.alloc_inode(),
            FileType::Directory,
            0o755,
            Arc::new(TmpNode {
                data: TmpData::Directory(Dict::new()),
            }),
        );
        fs.root.call_once(|| root);
        fs
    }

    fn alloc_inode(&self) -> u64 {
        self.next_inode.fetch_add(1, Ordering::Relaxed)
    }

    fn weak_ref(&self) -> Weak<dyn FileSystemOperations> {
        // Set in `new` before the filesystem is visible anywhere.
        match self.fs_ref.get() {
            Some(weak) => weak.clone(),
            None => Weak::<TmpFs>::new(),
        }
    }

    fn payload(node: &VfsNode) -> Result<Arc<TmpNode>> {
        node.private_as::<TmpNode>()
            .ok_or(KernelError::InvalidArgument)
    }

    /// The FIFO state carried by `node`, when it is a FIFO node.
    pub fn fifo_state(node: &VfsNode) -> Option<Arc<FifoState>> {
        match &Self::payload(node).ok()?.data {
            TmpData::Fifo(state) => Some(Arc::clone(state)),
            _ => None,
        }
    }
}

impl FileSystemOperations for TmpFs {
    fn name(&self) -> &'static str {
        "tmpfs"
    }

    fn root_node(&self) -> Arc<VfsNode> {
        // Set in `new` before the filesystem is visible anywhere.
        Arc::clone(self.root.get().expect("tmpfs root"))
    }

    fn lookup(&self, parent: &Arc<VfsNode>, name: &str) -> Result<Arc<VfsNode>> {
        Self::payload(parent)?
            .entries()?
            .get(name)
            .ok_or(KernelError::NoSuchEntry)
    }

    fn create(
        &self,
        parent: &Arc<VfsNode>,
        name: &str,
        file_type: FileType,
        mode: u32,
    ) -> Result<Arc<VfsNode>> {
        if name.is_empty() || name.contains('/') {
            return Err(KernelError::InvalidArgument);
        }
        let payload = Self::payload(parent)?;
        let entries = payload.entries()?;
        if entries.contains_key(name) {
            return Err(KernelError::AlreadyExists);
        }
        let node = VfsNode::with_private(
            self.weak_ref(),
            name,
            self.alloc_inode(),
            file_type,
            mode,
            Arc::new(TmpNode::for_type(file_type)?),
        );
        node.set_parent(parent);
        entries.set(name, Arc::clone(&node));
        Ok(node)
    }

    fn remove(&self, parent: &Arc<VfsNode>, name: &str) -> Result<()> {
        let payload = Self::payload(parent)?;
        let entries = payload.entries()?;
        let node = entries.get(name).ok_or(KernelError::NoSuchEntry)?;
        if node.is_directory() && !Self::payload(&node)?.entries()?.is_empty() {
            return Err(KernelError::Busy);
        }
        entries.remove(name);
        Ok(())
    }

    fn readdir(&self, node: &Arc<VfsNode>) -> Result<Vec<DirectoryEntry>> {
        let payload = Self::payload(node)?;
        let entries = payload.entries()?;
        let mut out = Vec::new();
        for name in entries.keys() {
            if let Some(child) = entries.get(&name) {
                out.push(DirectoryEntry {
                    name,
                    file_type: child.file_type(),
                    inode: child.inode(),
                });
            }
        }
        Ok(out)
    }

    fn metadata(&self, node: &Arc<VfsNode>) -> Result<FileMetadata> {
        let payload = Self::payload(node)?;
        let size = match &payload.data {
            TmpData::File(buf) => buf.len(),
            TmpData::Symlink(target) => target.len(),
            _ => 0,
        };
        let (uid, gid) = node.owner();
        Ok(FileMetadata {
            file_type: node.file_type(),
            size,
            mode: node.mode(),
            uid,
            gid,
            inode: node.inode(),
            modified_time: 0,
        })
    }

    fn open(&self, node: &Arc<VfsNode>, flags: OpenFlags) -> Result<Arc<dyn FileObject>> {
        let payload = Self::payload(node)?;
        match &payload.data {
            TmpData::File(_) => {
                if flags.contains(OpenFlags::TRUNCATE) && flags.contains(OpenFlags::WRITE) {
                    if let TmpData::File(buf) = &payload.data {
                        buf.truncate(0);
                    }
                }
                Ok(Arc::new(TmpFileObject {
                    node: Arc::clone(node),
                    payload,
                    position: AtomicUsize::new(0),
                    flags,
                }))
            }
            TmpData::Directory(_) => Ok(Arc::new(DirectoryFileObject {
                node: Arc::clone(node),
            })),
            TmpData::Fifo(state) => {
                let thread = current_thread();
                let end: Arc<dyn FileObject> = if flags.contains(OpenFlags::WRITE) {
                    state.open_write(node, flags, thread.as_ref())?
                } else {
                    state.open_read(node)
                };
                Ok(end)
            }
            TmpData::Device => {
                let id = match node.file_type() {
                    FileType::CharDevice(id) => id,
                    _ => return Err(KernelError::InvalidArgument),
                };
                let device = get_device_manager()
                    .lookup(id)
                    .ok_or(KernelError::NoSuchEntry)?;
                device.open()?;
                Ok(Arc::new(DeviceFileObject {
                    node: Arc::clone(node),
                    device,
                    position: AtomicU64::new(0),
                }))
            }
            TmpData::Symlink(_) => Err(KernelError::InvalidArgument),
        }
    }

    fn symlink(
        &self,
        parent: &Arc<VfsNode>,
        name: &str,
        target: &str,
    ) -> Result<Arc<VfsNode>> {
        let payload = Self::payload(parent)?;
        let entries = payload.entries()?;
        if entries.contains_key(name) {
            return Err(KernelError::AlreadyExists);
        }
        let node = VfsNode::with_private(
            self.weak_ref(),
            name,
            self.alloc_inode(),
            FileType::SymbolicLink,
            0o777,
            Arc::new(TmpNode {
                data: TmpData::Symlink(target.to_string()),
            }),
        );
        node.set_parent(parent);
        entries.set(name, Arc::clone(&node));
        Ok(node)
    }

    fn read_link(&self, node: &Arc<VfsNode>) -> Result<String> {
        match &Self::payload(node)?.data {
            TmpData::Symlink(target) => Ok(target.clone()),
            _ => Err(KernelError::InvalidArgument),
        }
    }
}

/// Open regular file: a cursor over the node's chunk buffer.
struct TmpFileObject {
    node: Arc<VfsNode>,
    payload: Arc<TmpNode>,
    position: AtomicUsize,
    flags: OpenFlags,
}

impl TmpFileObject {
    fn buffer(&self) -> Result<&ChunkBuffer> {
        match &self.payload.data {
            TmpData::File(buf) => Ok(buf),
            _ => Err(KernelError::InvalidArgument),
        }
    }
}

impl FileObject for TmpFileObject {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(KernelError::NotSupported);
        }
        let data = self.buffer()?;
        let pos = self.position.load(Ordering::Acquire);
        let n = data.read_at(pos, buf);
        self.position.store(pos + n, Ordering::Release);
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(KernelError::NotSupported);
        }
        let data = self.buffer()?;
        let pos = if self.flags.contains(OpenFlags::APPEND) {
            data.len()
        } else {
            self.position.load(Ordering::Acquire)
        };
        let n = data.write_at(pos, buf);
        self.position.store(pos + n, Ordering::Release);
        Ok(n)
    }

    fn seek(&self, whence: SeekFrom) -> Result<u64> {
        let len = self.buffer()?.len() as i64;
        let pos = self.position.load(Ordering::Acquire) as i64;
        let next = match whence {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(delta) => pos + delta,
            SeekFrom::End(delta) => len + delta,
        };
        if next < 0 {
            return Err(KernelError::InvalidArgument);
        }
        self.position.store(next as usize, Ordering::Release);
        Ok(next as u64)
    }

    fn truncate(&self, length: usize) -> Result<()> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(KernelError::NotSupported);
        }
        self.buffer()?.truncate(length);
        Ok(())
    }

    fn metadata(&self) -> Result<FileMetadata> {
        self.node.metadata()
    }

    fn chmod(&self, mode: u32) -> Result<()> {
        self.node.set_mode(mode);
        Ok(())
    }

    fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        self.node.set_owner(uid, gid);
        Ok(())
    }

    fn node(&self) -> Option<Arc<VfsNode>> {
        Some(Arc::clone(&self.node))
    }
}

/// Open directory. Reads are refused; enumeration goes through `readdir`.
struct DirectoryFileObject {
    node: Arc<VfsNode>,
}

impl FileObject for DirectoryFileObject {
    fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(KernelError::IsADirectory)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(KernelError::IsADirectory)
    }

    fn metadata(&self) -> Result<FileMetadata> {
        self.node.metadata()
    }

    fn chmod(&self, mode: u32) -> Result<()> {
        self.node.set_mode(mode);
        Ok(())
    }

    fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        self.node.set_owner(uid, gid);
        Ok(())
    }

    fn node(&self) -> Option<Arc<VfsNode>> {
        Some(Arc::clone(&self.node))
    }
}

/// Open device node: forwards to the registered driver, tracking a cursor
/// for drivers that honor offsets.
struct DeviceFileObject {
    node: Arc<VfsNode>,
    device: Arc<dyn CharDevice>,
    position: AtomicU64,
}

impl FileObject for DeviceFileObject {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let pos = self.position.load(Ordering::Acquire);
        let n = self.device.read(buf, pos)?;
        self.position.store(pos + n as u64, Ordering::Release);
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let pos = self.position.load(Ordering::Acquire);
        let n = self.device.write(buf, pos)?;
        self.position.store(pos + n as u64, Ordering::Release);
        Ok(n)
    }

    fn ioctl(&self, request: u32, arg: usize) -> Result<usize> {
        self.device.ioctl(request, arg)
    }

    fn mmap(&self, addr: usize, length: usize, prot: MapProt, offset: usize) -> Result<usize> {
        self.device.mmap(addr, length, prot, offset as u64)
    }

    fn is_tty(&self) -> bool {
        self.device.is_tty()
    }

    fn metadata(&self) -> Result<FileMetadata> {
        self.node.metadata()
    }

    fn chmod(&self, mode: u32) -> Result<()> {
        self.node.set_mode(mode);
        Ok(())
    }

    fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        self.node.set_owner(uid, gid);
        Ok(())
    }

    fn node(&self) -> Option<Arc<VfsNode>> {
        Some(Arc::clone(&self.node))
    }

    fn device(&self) -> Option<Arc<dyn CharDevice>> {
        Some(Arc::clone(&self.device))
    }

    fn release(&self) {
        let _ = self.device.close();
    }
}

pub struct TmpFsDriver;

impl FileSystemDriver for TmpFsDriver {
    fn name(&self) -> &'static str {
        "tmpfs"
    }

    fn create(
        &self,
        _device: Option<Arc<dyn CharDevice>>,
        _options: Option<&str>,
    ) -> Result<Arc<dyn FileSystemOperations>> {
        Ok(TmpFs::new())
    }
}

/// Make tmpfs mountable by name.
pub fn register_tmpfs_driver() {
    get_fs_driver_manager().register(alloc::boxed::Box::new(TmpFsDriver));
}
