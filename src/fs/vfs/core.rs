//! VFS node graph and the filesystem operations contract.
//!
//! A [`VfsNode`] is one name in the tree: it knows its parent, caches the
//! children it has already resolved, and may carry a mount. The node holds
//! its filesystem as a `Weak` reference; the strong owner is the mount that
//! installed the filesystem, so nodes and filesystems never keep each other
//! alive in a cycle.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, RwLock};

use crate::collections::Dict;
use crate::error::{KernelError, Result};
use crate::fs::{DirectoryEntry, FileMetadata, FileType, OpenFlags};
use crate::object::FileObject;

/// Operations a mounted filesystem provides to the VFS core.
///
/// All node-addressed operations take the `Arc<VfsNode>` so the filesystem
/// can reach its per-node private data.
pub trait FileSystemOperations: Send + Sync {
    fn name(&self) -> &'static str;

    /// The root node of this filesystem instance.
    fn root_node(&self) -> Arc<VfsNode>;

    /// Look `name` up under `parent`. Called on child-cache misses only.
    fn lookup(&self, parent: &Arc<VfsNode>, name: &str) -> Result<Arc<VfsNode>>;

    /// Produce a file object for `node`.
    fn open(&self, node: &Arc<VfsNode>, flags: OpenFlags) -> Result<Arc<dyn FileObject>>;

    fn metadata(&self, node: &Arc<VfsNode>) -> Result<FileMetadata>;

    fn readdir(&self, node: &Arc<VfsNode>) -> Result<Vec<DirectoryEntry>>;

    fn create(
        &self,
        _parent: &Arc<VfsNode>,
        _name: &str,
        _file_type: FileType,
        _mode: u32,
    ) -> Result<Arc<VfsNode>> {
        Err(KernelError::NotSupported)
    }

    fn remove(&self, _parent: &Arc<VfsNode>, _name: &str) -> Result<()> {
        Err(KernelError::NotSupported)
    }

    fn symlink(
        &self,
        _parent: &Arc<VfsNode>,
        _name: &str,
        _target: &str,
    ) -> Result<Arc<VfsNode>> {
        Err(KernelError::NotSupported)
    }

    fn read_link(&self, _node: &Arc<VfsNode>) -> Result<String> {
        Err(KernelError::NotSupported)
    }

    fn is_read_only(&self) -> bool {
        false
    }
}

/// A filesystem mounted on top of a directory node. Holds the only strong
/// reference to the filesystem instance, so every node's `Weak` back
/// reference stays upgradable for as long as the mount exists.
pub struct MountPoint {
    pub root: Arc<VfsNode>,
    pub fs: Arc<dyn FileSystemOperations>,
    pub fs_name: String,
}

pub struct VfsNode {
    name: String,
    inode: u64,
    file_type: FileType,
    fs: Weak<dyn FileSystemOperations>,
    parent: Mutex<Weak<VfsNode>>,
    mode: AtomicU32,
    uid: AtomicU32,
    gid: AtomicU32,
    /// Positive lookups already answered by the filesystem.
    children: Dict<Arc<VfsNode>>,
    /// Filesystem mounted on this node, if any.
    mounted: RwLock<Option<MountPoint>>,
    /// Driver-private per-node state.
    private: Option<Arc<dyn Any + Send + Sync>>,
}

impl VfsNode {
    pub fn new(
        fs: Weak<dyn FileSystemOperations>,
        name: &str,
        inode: u64,
        file_type: FileType,
        mode: u32,
    ) -> Arc<Self> {
        Self::with_private_opt(fs, name, inode, file_type, mode, None)
    }

    pub fn with_private(
        fs: Weak<dyn FileSystemOperations>,
        name: &str,
        inode: u64,
        file_type: FileType,
        mode: u32,
        private: Arc<dyn Any + Send + Sync>,
    ) -> Arc<Self> {
        Self::with_private_opt(fs, name, inode, file_type, mode, Some(private))
    }

    fn with_private_opt(
        fs: Weak<dyn FileSystemOperations>,
        name: &str,
        inode: u64,
        file_type: FileType,
        mode: u32,
        private: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inode,
            file_type,
            fs,
            parent: Mutex::new(Weak::new()),
            mode: AtomicU32::new(mode),
            uid: AtomicU32::new(0),
            gid: AtomicU32::new(0),
            children: Dict::new(),
            mounted: RwLock::new(None),
            private,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn mode(&self) -> u32 {
        self.mode.load(Ordering::Acquire)
    }

    pub fn set_mode(&self, mode: u32) {
        self.mode.store(mode & 0o7777, Ordering::Release);
    }

    pub fn owner(&self) -> (u32, u32) {
        (self.uid.load(Ordering::Acquire), self.gid.load(Ordering::Acquire))
    }

    pub fn set_owner(&self, uid: u32, gid: u32) {
        self.uid.store(uid, Ordering::Release);
        self.gid.store(gid, Ordering::Release);
    }

    /// The filesystem this node belongs to. Fails once the filesystem has
    /// been torn down and only stale node references remain.
    pub fn filesystem(&self) -> Result<Arc<dyn FileSystemOperations>> {
        self.fs.upgrade().ok_or(KernelError::NotSupported)
    }

    pub fn parent(&self) -> Option<Arc<VfsNode>> {
        self.parent.lock().upgrade()
    }

    pub fn set_parent(&self, parent: &Arc<VfsNode>) {
        *self.parent.lock() = Arc::downgrade(parent);
    }

    /// Driver-private state, downcast to its concrete type.
    pub fn private_as<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.private.clone()?.downcast::<T>().ok()
    }

    // -- child cache ------------------------------------------------------

    pub fn cached_child(&self, name: &str) -> Option<Arc<VfsNode>> {
        self.children.get(name)
    }

    /// Remember a positive lookup. Also wires the child's parent link so
    /// `..` resolution never has to ask the filesystem.
    pub fn cache_child(self: &Arc<Self>, child: &Arc<VfsNode>) {
        child.set_parent(self);
        self.children.set(child.name(), Arc::clone(child));
    }

    pub fn uncache_child(&self, name: &str) {
        self.children.remove(name);
    }

    pub fn cached_count(&self) -> usize {
        self.children.len()
    }

    pub fn clear_cache(&self) {
        self.children.clear();
    }

    // -- mounts -----------------------------------------------------------

    pub fn is_mount_point(&self) -> bool {
        self.mounted.read().is_some()
    }

    pub fn mount(
        self: &Arc<Self>,
        fs_name: &str,
        fs: Arc<dyn FileSystemOperations>,
    ) -> Result<()> {
        if !self.is_directory() {
            return Err(KernelError::NotADirectory);
        }
        let mut mounted = self.mounted.write();
        if mounted.is_some() {
            return Err(KernelError::Busy);
        }
        let root = fs.root_node();
        root.set_parent(self);
        *mounted = Some(MountPoint {
            root,
            fs,
            fs_name: fs_name.to_string(),
        });
        Ok(())
    }

    pub fn mounted_fs_name(&self) -> Option<String> {
        self.mounted.read().as_ref().map(|m| m.fs_name.clone())
    }

    /// Mount substitution: the node path resolution should continue from.
    /// A mount point is transparently replaced by the mounted root.
    pub fn effective(self: &Arc<Self>) -> Arc<VfsNode> {
        match self.mounted.read().as_ref() {
            Some(mp) => Arc::clone(&mp.root),
            None => Arc::clone(self),
        }
    }

    pub fn metadata(self: &Arc<Self>) -> Result<FileMetadata> {
        self.filesystem()?.metadata(self)
    }
}

impl core::fmt::Debug for VfsNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VfsNode")
            .field("name", &self.name)
            .field("inode", &self.inode)
            .field("file_type", &self.file_type)
            .finish()
    }
}
