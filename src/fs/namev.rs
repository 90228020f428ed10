//! Path name resolution.
//!
//! Paths resolve component by component: absolute paths start at the
//! root vnode, relative paths at the caller's working directory.
//! Consecutive separators collapse, "." names the directory itself and
//! ".." its parent; both are ordinary entries of the on-disk directory,
//! and the root's ".." names the root, which clamps ascent there.

use crate::errno::{Errno, KResult};
use crate::fcntl::OpenFlags;

use super::path::{FileName, Path};
use super::{ArcVnode, DevId, VnodeType};

/// One lookup step. The directory's mutex is held only while its
/// `lookup` runs; the child comes back unlocked.
pub fn namev_lookup(dir: &ArcVnode, name: &FileName) -> KResult<ArcVnode> {
    if !dir.vtype().is_dir() {
        return Err(Errno::ENOTDIR);
    }
    dir.lookup(name)
}

fn resolve_base<'a>(root: &'a ArcVnode, cwd: &'a ArcVnode, path: &Path) -> &'a ArcVnode {
    if path.is_absolute() {
        root
    } else {
        cwd
    }
}

/// Resolves `path` up to its last component and returns the containing
/// directory along with the (validated) final name. Fails with `EINVAL`
/// when the path holds no component at all.
pub fn namev_dir<'p>(
    root: &ArcVnode,
    cwd: &ArcVnode,
    path: &'p Path,
) -> KResult<(ArcVnode, &'p FileName)> {
    let mut cur = resolve_base(root, cwd, path).clone();
    let (mut rest, mut name) = path.skipelem().ok_or(Errno::EINVAL)?;
    while let Some((next_rest, next_name)) = rest.skipelem() {
        let fname = FileName::new(name)?;
        cur = namev_lookup(&cur, fname)?;
        rest = next_rest;
        name = next_name;
    }
    if !cur.vtype().is_dir() {
        return Err(Errno::ENOTDIR);
    }
    Ok((cur, FileName::new(name)?))
}

/// Resolves `path` to its final vnode, creating the last component with
/// the parent's `mknod` when `O_CREAT` is present. A path with a
/// trailing separator must land on a directory.
pub fn namev_open(
    root: &ArcVnode,
    cwd: &ArcVnode,
    path: &Path,
    flags: OpenFlags,
    create_type: VnodeType,
    devid: DevId,
) -> KResult<ArcVnode> {
    if path.is_empty() {
        return Err(Errno::EINVAL);
    }
    if path.skipelem().is_none() {
        // Nothing but separators: "/" names the root.
        return if path.is_absolute() {
            Ok(root.clone())
        } else {
            Err(Errno::EINVAL)
        };
    }
    let (dir, name) = namev_dir(root, cwd, path)?;
    match namev_lookup(&dir, name) {
        Ok(found) => {
            if flags.contains(OpenFlags::O_CREAT | OpenFlags::O_EXCL) {
                return Err(Errno::EEXIST);
            }
            if path.has_trailing_slash() && !found.vtype().is_dir() {
                return Err(Errno::ENOTDIR);
            }
            Ok(found)
        }
        Err(Errno::ENOENT) if flags.contains(OpenFlags::O_CREAT) => {
            if path.has_trailing_slash() {
                return Err(Errno::ENOTDIR);
            }
            dir.mknod(name, create_type, devid)
        }
        Err(e) => Err(e),
    }
}
