//! sysctl-style kernel introspection.
//!
//! A hierarchical integer OID selects what to report: `[KERN, PROC_ALL]`
//! lists every process, `[KERN, PROC_VM, pid]` a process's memory map,
//! `[KERN, PROC_FILES, pid]` its open descriptors. Callers use the
//! two-call sizing protocol: query with no buffer to learn the required
//! size, then again with a buffer at least that large.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{KernelError, Result};
use crate::task::{get_process_table, Pid, Process};

pub const CTL_KERN: i32 = 1;

pub const KERN_PROC_ALL: i32 = 1;
pub const KERN_PROC_VM: i32 = 2;
pub const KERN_PROC_FILES: i32 = 3;

/// Bytes per record in a `KERN_PROC_ALL` report.
pub const PROC_RECORD_LEN: usize = 32;
/// Bytes per record in a `KERN_PROC_VM` report.
pub const VM_RECORD_LEN: usize = 24;
/// Bytes per record in a `KERN_PROC_FILES` report.
pub const FILE_RECORD_LEN: usize = 8;

const PROC_NAME_LEN: usize = 16;

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn proc_record(out: &mut Vec<u8>, process: &Arc<Process>) {
    push_u32(out, process.pid());
    push_u32(out, process.parent().map(|p| p.pid()).unwrap_or(0));
    push_u32(out, process.thread_count() as u32);
    push_u32(out, if process.has_exited() { 1 } else { 0 });
    let mut name = [0u8; PROC_NAME_LEN];
    let bytes = process.name().as_bytes();
    let n = bytes.len().min(PROC_NAME_LEN);
    name[..n].copy_from_slice(&bytes[..n]);
    out.extend_from_slice(&name);
}

fn render(oid: &[i32]) -> Result<Vec<u8>> {
    if oid.first() != Some(&CTL_KERN) {
        return Err(KernelError::NoSuchEntry);
    }
    let mut out = Vec::new();
    match oid.get(1) {
        Some(&KERN_PROC_ALL) => {
            let mut processes = get_process_table().all();
            processes.sort_by_key(|p| p.pid());
            for process in &processes {
                proc_record(&mut out, process);
            }
        }
        Some(&KERN_PROC_VM) => {
            let process = lookup_pid(oid)?;
            for region in process.memory().regions() {
                push_u64(&mut out, region.virt_start as u64);
                push_u64(&mut out, region.size as u64);
                push_u64(&mut out, region.prot.bits() as u64);
            }
        }
        Some(&KERN_PROC_FILES) => {
            let process = lookup_pid(oid)?;
            for (fd, flags) in process.fd_table().descriptors() {
                push_u32(&mut out, fd as u32);
                push_u32(&mut out, flags.bits());
            }
        }
        _ => return Err(KernelError::NoSuchEntry),
    }
    Ok(out)
}

fn lookup_pid(oid: &[i32]) -> Result<Arc<Process>> {
    let pid = *oid.get(2).ok_or(KernelError::InvalidArgument)?;
    if pid < 0 {
        return Err(KernelError::InvalidArgument);
    }
    get_process_table()
        .get(pid as Pid)
        .ok_or(KernelError::NoSuchEntry)
}

/// Query the OID. With `out = None` returns the required byte count;
/// with a buffer, fills it and returns the bytes written. A buffer that
/// is too small fails with `NoSpace` and writes nothing.
pub fn sysctl(oid: &[i32], out: Option<&mut [u8]>) -> Result<usize> {
    let rendered = render(oid)?;
    match out {
        None => Ok(rendered.len()),
        Some(buf) => {
            if buf.len() < rendered.len() {
                return Err(KernelError::NoSpace);
            }
            buf[..rendered.len()].copy_from_slice(&rendered);
            Ok(rendered.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{FileObject, KernelObject};
    use crate::task::Process;
    use crate::vm::{AddressSpace, MapProt, MappedRegion};

    struct Nop;
    impl FileObject for Nop {}

    #[test]
    fn two_call_sizing_for_process_list() {
        let proc = Process::create("sysctl-list", None);
        let oid = [CTL_KERN, KERN_PROC_ALL];
        let needed = sysctl(&oid, None).unwrap();
        assert!(needed >= PROC_RECORD_LEN);
        assert_eq!(needed % PROC_RECORD_LEN, 0);

        let mut small = alloc::vec![0u8; PROC_RECORD_LEN - 1];
        assert_eq!(sysctl(&oid, Some(&mut small)), Err(KernelError::NoSpace));

        let mut buf = alloc::vec![0u8; needed + 64];
        let written = sysctl(&oid, Some(&mut buf)).unwrap();
        // Processes may have been created or reaped between the calls by
        // parallel tests; the report itself stays record-aligned.
        assert_eq!(written % PROC_RECORD_LEN, 0);

        // Our pid appears in the report.
        let found = buf[..written]
            .chunks(PROC_RECORD_LEN)
            .any(|rec| u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]) == proc.pid());
        assert!(found);
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn vm_report_lists_mapped_regions() {
        let proc = Process::create("sysctl-vm", None);
        proc.memory()
            .map(MappedRegion {
                size: 0x2000,
                phys_start: 0x8000_0000,
                virt_start: 0x4000,
                prot: MapProt::READ | MapProt::WRITE,
            })
            .unwrap();

        let oid = [CTL_KERN, KERN_PROC_VM, proc.pid() as i32];
        let needed = sysctl(&oid, None).unwrap();
        assert_eq!(needed, VM_RECORD_LEN);
        let mut buf = alloc::vec![0u8; needed];
        sysctl(&oid, Some(&mut buf)).unwrap();
        let virt = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let size = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        assert_eq!(virt, 0x4000);
        assert_eq!(size, 0x2000);
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn files_report_lists_open_descriptors() {
        let proc = Process::create("sysctl-files", None);
        let fd = proc
            .fd_table()
            .open(KernelObject::new(alloc::sync::Arc::new(Nop)))
            .unwrap();

        let oid = [CTL_KERN, KERN_PROC_FILES, proc.pid() as i32];
        let needed = sysctl(&oid, None).unwrap();
        assert_eq!(needed, FILE_RECORD_LEN);
        let mut buf = alloc::vec![0u8; needed];
        sysctl(&oid, Some(&mut buf)).unwrap();
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), fd as u32);
        get_process_table().remove(proc.pid());
    }

    #[test]
    fn unknown_oids_are_rejected() {
        assert_eq!(sysctl(&[], None), Err(KernelError::NoSuchEntry));
        assert_eq!(sysctl(&[99], None), Err(KernelError::NoSuchEntry));
        assert_eq!(
            sysctl(&[CTL_KERN, 99], None),
            Err(KernelError::NoSuchEntry)
        );
        assert_eq!(
            sysctl(&[CTL_KERN, KERN_PROC_VM, 0x7fff_fffe], None),
            Err(KernelError::NoSuchEntry)
        );
        assert_eq!(
            sysctl(&[CTL_KERN, KERN_PROC_VM], None),
            Err(KernelError::InvalidArgument)
        );
    }
}
