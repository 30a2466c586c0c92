//! Initial ramdisk loader.
//!
//! Unpacks a ustar archive into the mounted root filesystem at boot.
//! Regular files, directories and symlinks are materialized; any other
//! entry type is skipped together with its data blocks. Header checksums
//! are verified, so a corrupt archive fails instead of planting garbage.

extern crate alloc;

use alloc::string::String;

use crate::environment::ARCHIVE_BLOCK_SIZE;
use crate::error::{KernelError, Result};
use crate::fs::vfs::manager::VfsManager;
use crate::fs::vfs::path::split_parent;
use crate::fs::{FileType, OpenFlags};
use crate::{kinfo, kwarn};

const NAME_LEN: usize = 100;
const MODE_OFF: usize = 100;
const UID_OFF: usize = 108;
const GID_OFF: usize = 116;
const SIZE_OFF: usize = 124;
const CHKSUM_OFF: usize = 148;
const TYPE_OFF: usize = 156;
const LINK_OFF: usize = 157;
const MAGIC_OFF: usize = 257;
const PREFIX_OFF: usize = 345;
const PREFIX_LEN: usize = 155;

const TYPE_FILE: u8 = b'0';
const TYPE_FILE_OLD: u8 = 0;
const TYPE_SYMLINK: u8 = b'2';
const TYPE_DIR: u8 = b'5';

struct TarEntry<'a> {
    name: String,
    mode: u32,
    uid: u32,
    gid: u32,
    type_flag: u8,
    link_target: String,
    data: &'a [u8],
}

/// NUL- or space-padded octal field.
fn parse_octal(field: &[u8]) -> Result<u64> {
    let mut value: u64 = 0;
    let mut seen = false;
    for &b in field {
        match b {
            b'0'..=b'7' => {
                value = value * 8 + (b - b'0') as u64;
                seen = true;
            }
            b' ' | 0 => {
                if seen {
                    break;
                }
            }
            _ => return Err(KernelError::InvalidArgument),
        }
    }
    Ok(value)
}

fn parse_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Header checksum: byte sum with the checksum field read as spaces.
fn verify_checksum(header: &[u8]) -> Result<()> {
    let recorded = parse_octal(&header[CHKSUM_OFF..CHKSUM_OFF + 8])?;
    let mut sum: u64 = 0;
    for (i, &b) in header.iter().enumerate() {
        if (CHKSUM_OFF..CHKSUM_OFF + 8).contains(&i) {
            sum += b' ' as u64;
        } else {
            sum += b as u64;
        }
    }
    if sum == recorded {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument)
    }
}

fn parse_header<'a>(archive: &'a [u8], offset: usize) -> Result<Option<TarEntry<'a>>> {
    let header = &archive[offset..offset + ARCHIVE_BLOCK_SIZE];
    if header.iter().all(|&b| b == 0) {
        return Ok(None);
    }
    if &header[MAGIC_OFF..MAGIC_OFF + 5] != b"ustar" {
        return Err(KernelError::InvalidArgument);
    }
    verify_checksum(header)?;

    let mut name = parse_string(&header[..NAME_LEN]);
    let prefix = parse_string(&header[PREFIX_OFF..PREFIX_OFF + PREFIX_LEN]);
    if !prefix.is_empty() {
        name = alloc::format!("{}/{}", prefix, name);
    }

    let size = parse_octal(&header[SIZE_OFF..SIZE_OFF + 12])? as usize;
    let data_start = offset + ARCHIVE_BLOCK_SIZE;
    if data_start + size > archive.len() {
        return Err(KernelError::InvalidArgument);
    }

    Ok(Some(TarEntry {
        name,
        mode: parse_octal(&header[MODE_OFF..MODE_OFF + 8])? as u32,
        uid: parse_octal(&header[UID_OFF..UID_OFF + 8])? as u32,
        gid: parse_octal(&header[GID_OFF..GID_OFF + 8])? as u32,
        type_flag: header[TYPE_OFF],
        link_target: parse_string(&header[LINK_OFF..LINK_OFF + NAME_LEN]),
        data: &archive[data_start..data_start + size],
    }))
}

fn materialize(vfs: &VfsManager, entry: &TarEntry<'_>) -> Result<()> {
    let name = entry.name.trim_matches('/');
    if name.is_empty() {
        return Ok(());
    }
    let path = alloc::format!("/{}", name);

    let node = match entry.type_flag {
        TYPE_DIR => vfs.create_dir_all(&path, entry.mode)?,
        TYPE_FILE | TYPE_FILE_OLD => {
            let (parent_path, _) = split_parent(&path)?;
            vfs.create_dir_all(&parent_path, 0o755)?;
            let node = vfs.create(&path, FileType::RegularFile, entry.mode)?;
            let file = vfs.open(&path, OpenFlags::WRITE)?;
            file.write(entry.data)?;
            node
        }
        TYPE_SYMLINK => {
            let (parent_path, _) = split_parent(&path)?;
            vfs.create_dir_all(&parent_path, 0o755)?;
            vfs.symlink(&path, &entry.link_target)?
        }
        other => {
            kwarn!("initramfs: skipping {} (type {})", path, other as char);
            return Ok(());
        }
    };
    node.set_mode(entry.mode);
    node.set_owner(entry.uid, entry.gid);
    Ok(())
}

/// Unpack `archive` into `vfs`. Returns the number of entries created.
pub fn load_initramfs(vfs: &VfsManager, archive: &[u8]) -> Result<usize> {
    let mut offset = 0;
    let mut created = 0;
    while offset + ARCHIVE_BLOCK_SIZE <= archive.len() {
        let entry = match parse_header(archive, offset)? {
            Some(entry) => entry,
            None => break,
        };
        let data_blocks = entry.data.len().div_ceil(ARCHIVE_BLOCK_SIZE);
        materialize(vfs, &entry)?;
        created += 1;
        offset += ARCHIVE_BLOCK_SIZE * (1 + data_blocks);
    }
    kinfo!("initramfs: loaded {} entries", created);
    Ok(created)
}
