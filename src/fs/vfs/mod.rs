//! Virtual filesystem.
//!
//! `core` defines the node graph and the operations trait filesystems
//! implement, `path` walks paths across mount boundaries, and `manager`
//! ties drivers, mounts and lookups together behind one entry point.

pub mod core;
pub mod manager;
pub mod path;

pub use self::core::{FileSystemOperations, VfsNode};
pub use self::manager::{get_vfs_manager, VfsManager};
pub use self::path::resolve;
