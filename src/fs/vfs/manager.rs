//! VFS manager: the mount tree and the path-addressed entry points.

extern crate alloc;

use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Once, RwLock};

use crate::device::CharDevice;
use crate::error::{KernelError, Result};
use crate::fs::{get_fs_driver_manager, DirectoryEntry, FileMetadata, FileType, OpenFlags};
use crate::kinfo;
use crate::object::FileObject;

use super::core::{MountPoint, VfsNode};
use super::path::{resolve, split_parent};

pub struct VfsManager {
    /// The root mount. Owns the root filesystem; nested mounts hang off
    /// their mount-point nodes.
    root: RwLock<Option<MountPoint>>,
}

impl VfsManager {
    pub const fn new() -> Self {
        Self {
            root: RwLock::new(None),
        }
    }

    pub fn root(&self) -> Result<Arc<VfsNode>> {
        self.root
            .read()
            .as_ref()
            .map(|m| Arc::clone(&m.root))
            .ok_or(KernelError::NoSuchEntry)
    }

    pub fn has_root(&self) -> bool {
        self.root.read().is_some()
    }

    /// Mount the named filesystem at `path`. Mounting at `/` installs the
    /// root filesystem and is only valid once.
    pub fn mount(
        &self,
        fs_name: &str,
        device: Option<Arc<dyn CharDevice>>,
        path: &str,
    ) -> Result<()> {
        let fs = get_fs_driver_manager().create_filesystem(fs_name, device, None)?;

        if path == "/" {
            let mut root = self.root.write();
            if root.is_some() {
                return Err(KernelError::Busy);
            }
            let fs_root = fs.root_node();
            *root = Some(MountPoint {
                root: fs_root,
                fs,
                fs_name: fs_name.to_string(),
            });
        } else {
            let mount_point = self.resolve_path(path)?;
            mount_point.mount(fs_name, fs)?;
        }
        kinfo!("vfs: mounted {} at {}", fs_name, path);
        Ok(())
    }

    /// Resolve an absolute path from the mount root.
    pub fn resolve_path(&self, path: &str) -> Result<Arc<VfsNode>> {
        resolve(&self.root()?, None, path)
    }

    /// Resolve relative to `cwd` (absolute paths ignore it).
    pub fn resolve_from(&self, cwd: &Arc<VfsNode>, path: &str) -> Result<Arc<VfsNode>> {
        resolve(&self.root()?, Some(cwd), path)
    }

    /// Open `path`, creating a regular file first when `CREATE` is set and
    /// the final component does not exist.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<Arc<dyn FileObject>> {
        let node = match self.resolve_path(path) {
            Ok(node) => node,
            Err(KernelError::NoSuchEntry) if flags.contains(OpenFlags::CREATE) => {
                self.create(path, FileType::RegularFile, 0o644)?
            }
            Err(e) => return Err(e),
        };
        node.filesystem()?.open(&node, flags)
    }

    /// Create a node of `file_type` at `path`.
    pub fn create(&self, path: &str, file_type: FileType, mode: u32) -> Result<Arc<VfsNode>> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self.resolve_path(&parent_path)?;
        if !parent.is_directory() {
            return Err(KernelError::NotADirectory);
        }
        let node = parent.filesystem()?.create(&parent, name, file_type, mode)?;
        parent.cache_child(&node);
        Ok(node)
    }

    pub fn create_dir(&self, path: &str, mode: u32) -> Result<Arc<VfsNode>> {
        self.create(path, FileType::Directory, mode)
    }

    /// Create every missing directory along `path`.
    pub fn create_dir_all(&self, path: &str, mode: u32) -> Result<Arc<VfsNode>> {
        let mut current = self.root()?;
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            current = match self.resolve_from(&current, segment) {
                Ok(node) => node,
                Err(KernelError::NoSuchEntry) => {
                    let node = current
                        .filesystem()?
                        .create(&current, segment, FileType::Directory, mode)?;
                    current.cache_child(&node);
                    node
                }
                Err(e) => return Err(e),
            };
        }
        Ok(current)
    }

    pub fn symlink(&self, path: &str, target: &str) -> Result<Arc<VfsNode>> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self.resolve_path(&parent_path)?;
        let node = parent.filesystem()?.symlink(&parent, name, target)?;
        parent.cache_child(&node);
        Ok(node)
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self.resolve_path(&parent_path)?;
        parent.filesystem()?.remove(&parent, name)?;
        parent.uncache_child(name);
        Ok(())
    }

    pub fn metadata(&self, path: &str) -> Result<FileMetadata> {
        self.resolve_path(path)?.metadata()
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let node = self.resolve_path(path)?;
        if !node.is_directory() {
            return Err(KernelError::NotADirectory);
        }
        node.filesystem()?.readdir(&node)
    }
}

impl Default for VfsManager {
    fn default() -> Self {
        Self::new()
    }
}

static VFS_MANAGER: Once<VfsManager> = Once::new();

/// The kernel-wide mount tree.
pub fn get_vfs_manager() -> &'static VfsManager {
    VFS_MANAGER.call_once(VfsManager::new)
}
