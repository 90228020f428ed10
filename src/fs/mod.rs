//! The virtual file system. Three layers:
//!   + Vnodes: reference-counted, in-memory images of inodes, polymorphic
//!     over the file system that supplies them.
//!   + Names: component-wise resolution of paths like /usr/bin/sh to
//!     vnodes (`namev`).
//!   + S5FS: the concrete on-disk file system mounted at the root.
//!
//! System-call argument handling lives above, in `sysfile`.

use core::any::Any;

use alloc::sync::Arc;
use arrayvec::ArrayVec;

use crate::errno::KResult;
use crate::mobj::MemObj;
use crate::param::NAME_LEN;
use crate::stat::Stat;

pub mod namev;
pub mod path;
pub mod s5fs;

pub use path::{FileName, Path};

/// Device id of a special file.
pub type DevId = u32;

pub type ArcVnode = Arc<dyn Vnode>;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VnodeType {
    Regular,
    Directory,
    CharDev,
    BlockDev,
}

impl VnodeType {
    pub fn is_dir(self) -> bool {
        self == VnodeType::Directory
    }

    pub fn is_device(self) -> bool {
        matches!(self, VnodeType::CharDev | VnodeType::BlockDev)
    }
}

/// One directory record, as surfaced by `readdir` and `getdents`. The
/// caller-visible record has a fixed shape regardless of how the file
/// system stores entries.
#[derive(Clone, Debug, PartialEq)]
pub struct DirEnt {
    pub ino: u32,
    pub name: ArrayVec<u8, NAME_LEN>,
}

/// The operation table of an in-memory inode.
///
/// Implementations lock the vnode internally; multi-vnode operations
/// (`link`, `rename`) acquire their locks in a canonical order, ancestor
/// first and otherwise by inode number. Operations that do not apply to
/// the vnode's type fail with `ENOTDIR`, `EISDIR`, or `ENODEV`.
pub trait Vnode: Send + Sync {
    fn ino(&self) -> u32;

    fn vtype(&self) -> VnodeType;

    /// Device id for special files, 0 otherwise.
    fn devid(&self) -> DevId;

    /// Current length in bytes, read under the vnode lock.
    fn len(&self) -> u64;

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> KResult<usize>;

    /// Writes at `pos`, or at end of file when `append` is set; the end
    /// position is resolved under the same lock that performs the write.
    /// Returns the byte count written and the position after the write.
    fn write_at(&self, pos: u64, buf: &[u8], append: bool) -> KResult<(usize, u64)>;

    /// Discards the contents of a regular file.
    fn truncate(&self) -> KResult<()>;

    /// Looks `name` up in a directory. The directory's lock is held for
    /// the duration of the search; the returned child is unlocked.
    fn lookup(&self, name: &FileName) -> KResult<ArcVnode>;

    /// Creates and links a new inode of the given type.
    fn mknod(&self, name: &FileName, vtype: VnodeType, devid: DevId) -> KResult<ArcVnode>;

    fn mkdir(&self, name: &FileName) -> KResult<ArcVnode>;

    fn rmdir(&self, name: &FileName) -> KResult<()>;

    /// Links `child` under `name` in this directory.
    fn link(&self, name: &FileName, child: &ArcVnode) -> KResult<()>;

    fn unlink(&self, name: &FileName) -> KResult<()>;

    /// Moves the non-directory `from` to `to` in `dst`, replacing a
    /// non-directory target.
    fn rename(&self, from: &FileName, dst: &ArcVnode, to: &FileName) -> KResult<()>;

    /// Returns the entry at byte position `pos` of a directory together
    /// with the on-disk size consumed, which the caller adds to the file
    /// position. `None` at end of directory.
    fn readdir(&self, pos: u64) -> KResult<Option<(DirEnt, u64)>>;

    fn stat(&self) -> KResult<Stat>;

    /// The memory object backing `mmap` of this vnode.
    fn mmap_obj(&self) -> KResult<Arc<MemObj>>;

    fn as_any(&self) -> &dyn Any;
}
