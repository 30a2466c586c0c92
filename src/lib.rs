//! Garnet: a small UNIX-like monolithic kernel core.
//!
//! The crate covers the kernel's portable heart: the heap and pool
//! allocators, the concurrent collections everything above them uses, the
//! character-device contract, the virtual filesystem with mounts and the
//! descriptor layer, named pipes, the process/thread/signal model with its
//! scheduler hooks, syscall dispatch, and sysctl introspection.
//! Architecture trampolines, real drivers and userland are external
//! collaborators behind the traits defined here.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod collections;
pub mod device;
pub mod environment;
pub mod error;
pub mod fs;
pub mod ipc;
pub mod klog;
pub mod mem;
pub mod object;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod sysctl;
pub mod task;
pub mod vm;

use alloc::sync::Arc;

use crate::device::manager::get_device_manager;
use crate::device::{major, DeviceId};
use crate::error::{KernelError, Result};
use crate::fs::vfs::manager::{get_vfs_manager, VfsManager};
use crate::fs::FileType;
use crate::task::Process;

fn ensure_node(vfs: &VfsManager, path: &str, file_type: FileType, mode: u32) -> Result<()> {
    match vfs.create(path, file_type, mode) {
        Ok(_) | Err(KernelError::AlreadyExists) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Bring the kernel services up: filesystem drivers, the root mount, the
/// pseudo devices and their `/dev` nodes, and the init process.
///
/// Idempotent registration failures (a device already present from an
/// earlier call) are not errors here; everything else propagates.
pub fn kernel_init(initramfs: Option<&[u8]>) -> Result<Arc<Process>> {
    fs::tmpfs::register_tmpfs_driver();

    let vfs = get_vfs_manager();
    match vfs.mount("tmpfs", None, "/") {
        // Someone else already brought the root up.
        Ok(()) | Err(KernelError::Busy) => {}
        Err(e) => return Err(e),
    }

    let devices = get_device_manager();
    let null = DeviceId::new(major::PSEUDO, 0);
    let zero = DeviceId::new(major::PSEUDO, 1);
    let full = DeviceId::new(major::PSEUDO, 2);
    let kmsg = DeviceId::new(major::KMSG, 0);
    let _ = devices.register(null, Arc::new(device::pseudo::NullDevice));
    let _ = devices.register(zero, Arc::new(device::pseudo::ZeroDevice));
    let _ = devices.register(full, Arc::new(device::pseudo::FullDevice));
    let _ = devices.register(kmsg, Arc::new(device::kmsg::KmsgDevice));

    ensure_node(vfs, "/dev", FileType::Directory, 0o755)?;
    ensure_node(vfs, "/dev/null", FileType::CharDevice(null), 0o666)?;
    ensure_node(vfs, "/dev/zero", FileType::CharDevice(zero), 0o666)?;
    ensure_node(vfs, "/dev/full", FileType::CharDevice(full), 0o666)?;
    ensure_node(vfs, "/dev/kmsg", FileType::CharDevice(kmsg), 0o444)?;

    if let Some(archive) = initramfs {
        fs::initramfs::load_initramfs(vfs, archive)?;
    }

    let init = Process::create("init", None);
    let root = vfs.root()?;
    init.set_root(Arc::clone(&root));
    init.set_cwd(root);
    kinfo!("kernel: init complete (pid {})", init.pid());
    Ok(init)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use crate::fs::vfs::path::resolve;
    use crate::fs::OpenFlags;
    use crate::object::KernelObject;
    use crate::syscall::{get_syscall_table, SyscallFrame};
    use crate::task::get_process_table;

    #[test]
    fn boot_brings_up_dev_nodes_and_init() {
        let init = kernel_init(None).unwrap();
        assert!(init.cwd().is_some());

        let vfs = get_vfs_manager();
        let zero = vfs.open("/dev/zero", OpenFlags::READ).unwrap();
        let mut buf = [0xffu8; 16];
        assert_eq!(zero.read(&mut buf).unwrap(), 16);
        assert_eq!(buf, [0u8; 16]);

        let full = vfs.open("/dev/full", OpenFlags::WRITE).unwrap();
        assert_eq!(full.write(b"x"), Err(KernelError::NoSpace));
        get_process_table().remove(init.pid());
    }

    #[test]
    fn resolution_fails_at_the_missing_segment() {
        let init = kernel_init(None).unwrap();
        let vfs = get_vfs_manager();
        // Scenario: /a and /a/b exist, c does not.
        let _ = vfs.create_dir_all("/a/b", 0o755).unwrap();
        let root = vfs.root().unwrap();
        let cwd = init.cwd().unwrap();
        assert_eq!(
            resolve(&root, Some(&cwd), "a/b/c").unwrap_err(),
            KernelError::NoSuchEntry
        );
        // The existing prefix still resolves.
        assert!(resolve(&root, Some(&cwd), "a/b").is_ok());
        get_process_table().remove(init.pid());
    }

    #[test]
    fn open_descriptor_write_read_through_the_whole_stack() {
        let init = kernel_init(None).unwrap();
        let vfs = get_vfs_manager();

        let file = vfs
            .open("/stack-test.txt", OpenFlags::WRITE | OpenFlags::CREATE)
            .unwrap();
        let fd = init.fd_table().open(KernelObject::new(file)).unwrap();
        let obj = init.fd_table().get(fd).unwrap();
        assert_eq!(obj.file().write(b"through the stack").unwrap(), 17);
        init.fd_table().close(fd).unwrap();

        let meta = vfs.metadata("/stack-test.txt").unwrap();
        assert_eq!(meta.size, 17);
        get_process_table().remove(init.pid());
    }

    #[test]
    fn syscall_round_trip_against_the_global_table() {
        fn sys_getpid(_frame: &SyscallFrame, thread: &Arc<crate::task::Thread>) -> isize {
            thread
                .process()
                .map(|p| p.pid() as isize)
                .unwrap_or(-(KernelError::NoSuchEntry.errno() as isize))
        }

        let table = get_syscall_table();
        let _ = table.register(172, 0, sys_getpid);

        let proc = Process::create("sys-getpid", None);
        let thread = proc.main_thread();
        let ret = table.dispatch(&SyscallFrame::new(172, [0; 5]), &thread);
        assert_eq!(ret, proc.pid() as isize);
        get_process_table().remove(proc.pid());
    }
}
