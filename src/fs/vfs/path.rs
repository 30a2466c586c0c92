//! Path walking.
//!
//! Walks one segment at a time: `.` is a no-op resolved without consulting
//! the filesystem, `..` follows the parent link (the root is its own
//! parent), and every other segment is answered from the child cache first
//! and from the filesystem's `lookup` on a miss. Mount points are replaced
//! by the mounted root before descending.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;

use crate::error::{KernelError, Result};
use crate::fs::FileType;

use super::core::VfsNode;

/// Symlink chains longer than this fail the walk.
const MAX_SYMLINK_DEPTH: usize = 8;

/// Resolve `path` to a node.
///
/// Absolute paths start at `root`; relative paths start at `cwd`, falling
/// back to `root` when no working directory is supplied. The returned node
/// has had mount substitution applied.
pub fn resolve(
    root: &Arc<VfsNode>,
    cwd: Option<&Arc<VfsNode>>,
    path: &str,
) -> Result<Arc<VfsNode>> {
    resolve_depth(root, cwd, path, 0)
}

fn resolve_depth(
    root: &Arc<VfsNode>,
    cwd: Option<&Arc<VfsNode>>,
    path: &str,
    depth: usize,
) -> Result<Arc<VfsNode>> {
    if path.is_empty() {
        return Err(KernelError::NoSuchEntry);
    }
    if depth > MAX_SYMLINK_DEPTH {
        return Err(KernelError::InvalidArgument);
    }

    let mut current = if path.starts_with('/') {
        root.effective()
    } else {
        cwd.unwrap_or(root).effective()
    };

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                // The root of the tree is its own parent.
                if let Some(parent) = current.parent() {
                    current = parent.effective();
                }
                continue;
            }
            name => {
                if !current.is_directory() {
                    return Err(KernelError::NotADirectory);
                }
                let child = match current.cached_child(name) {
                    Some(hit) => hit,
                    None => {
                        let found = current.filesystem()?.lookup(&current, name)?;
                        current.cache_child(&found);
                        found
                    }
                };
                let child = if child.file_type() == FileType::SymbolicLink {
                    let target = child.filesystem()?.read_link(&child)?;
                    resolve_depth(root, Some(&current), &target, depth + 1)?
                } else {
                    child
                };
                current = child.effective();
            }
        }
    }
    Ok(current)
}

/// Split a path into its parent directory part and final component.
/// `split_parent("/a/b/c")` is `("/a/b", "c")`.
pub fn split_parent(path: &str) -> Result<(String, &str)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(KernelError::InvalidArgument);
    }
    match trimmed.rfind('/') {
        Some(0) => Ok((String::from("/"), &trimmed[1..])),
        Some(pos) => Ok((String::from(&trimmed[..pos]), &trimmed[pos + 1..])),
        None => Ok((String::from("."), trimmed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::tmpfs::TmpFs;
    use crate::fs::vfs::core::FileSystemOperations;

    fn sample_tree() -> Arc<TmpFs> {
        let fs = TmpFs::new();
        let root = fs.root_node();
        let etc = fs.create(&root, "etc", FileType::Directory, 0o755).unwrap();
        fs.create(&etc, "passwd", FileType::RegularFile, 0o644)
            .unwrap();
        fs.create(&root, "tmp", FileType::Directory, 0o777).unwrap();
        fs
    }

    #[test]
    fn absolute_and_relative_walks_agree() {
        let fs = sample_tree();
        let root = fs.root_node();
        let by_abs = resolve(&root, None, "/etc/passwd").unwrap();
        let etc = resolve(&root, None, "/etc").unwrap();
        let by_rel = resolve(&root, Some(&etc), "passwd").unwrap();
        assert!(Arc::ptr_eq(&by_abs, &by_rel));
    }

    #[test]
    fn dot_and_dotdot_segments() {
        let fs = sample_tree();
        let root = fs.root_node();
        let etc = resolve(&root, None, "/etc").unwrap();
        assert!(Arc::ptr_eq(&resolve(&root, Some(&etc), ".").unwrap(), &etc));
        let back = resolve(&root, Some(&etc), "../tmp").unwrap();
        assert_eq!(back.name(), "tmp");
        // `..` at the root stays at the root.
        let still_root = resolve(&root, None, "/../../etc").unwrap();
        assert_eq!(still_root.name(), "etc");
    }

    #[test]
    fn missing_segment_is_no_such_entry() {
        let fs = sample_tree();
        let root = fs.root_node();
        assert_eq!(
            resolve(&root, None, "/etc/shadow").unwrap_err(),
            KernelError::NoSuchEntry
        );
        assert_eq!(
            resolve(&root, None, "/nope/passwd").unwrap_err(),
            KernelError::NoSuchEntry
        );
    }

    #[test]
    fn file_in_the_middle_is_not_a_directory() {
        let fs = sample_tree();
        let root = fs.root_node();
        assert_eq!(
            resolve(&root, None, "/etc/passwd/deeper").unwrap_err(),
            KernelError::NotADirectory
        );
    }

    #[test]
    fn repeated_resolution_reuses_cached_node() {
        let fs = sample_tree();
        let root = fs.root_node();
        let first = resolve(&root, None, "/etc/passwd").unwrap();
        let second = resolve(&root, None, "/etc/passwd").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn symlinks_are_followed() {
        let fs = sample_tree();
        let root = fs.root_node();
        fs.symlink(&root, "pw", "/etc/passwd").unwrap();
        let via_link = resolve(&root, None, "/pw").unwrap();
        let direct = resolve(&root, None, "/etc/passwd").unwrap();
        assert!(Arc::ptr_eq(&via_link, &direct));
    }

    #[test]
    fn symlink_loop_fails() {
        let fs = TmpFs::new();
        let root = fs.root_node();
        fs.symlink(&root, "a", "/b").unwrap();
        fs.symlink(&root, "b", "/a").unwrap();
        assert_eq!(
            resolve(&root, None, "/a").unwrap_err(),
            KernelError::InvalidArgument
        );
    }

    #[test]
    fn split_parent_forms() {
        assert_eq!(split_parent("/a/b/c").unwrap(), (String::from("/a/b"), "c"));
        assert_eq!(split_parent("/top").unwrap(), (String::from("/"), "top"));
        assert_eq!(split_parent("rel").unwrap(), (String::from("."), "rel"));
        assert!(split_parent("/").is_err());
    }
}
