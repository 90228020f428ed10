//! S5FS vnodes.
//!
//! An `S5Node` is the in-memory image of one on-disk inode. It keeps a
//! cached copy of the inode plus the vnode length under a sleeping lock,
//! with a `dirtied` flag deciding write-back when the node is destroyed
//! or the file system syncs.
//!
//! A typical operation locks the node, works through `NodeGuard`, and
//! unlocks by dropping the guard. Operations touching two nodes take
//! their locks in a canonical order: a parent directory before its
//! child, two directories by inode number.
//!
//! File pages are a thin veneer over the block device's page cache: a
//! page whose file block is backed by a real disk block is served from
//! the device object at that block number, so there is no double
//! buffering and the ordinary device write-back path covers file data.
//! Only sparse pages live in the node's own memory object, zero filled.

use core::any::Any;
use core::cmp;
use core::mem;

use alloc::sync::{Arc, Weak};
use arrayvec::ArrayVec;
use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes, LayoutVerified};

use crate::errno::{Errno, KResult};
use crate::fs::path::FileName;
use crate::fs::{ArcVnode, DevId, DirEnt, Vnode, VnodeType};
use crate::lock::SleepLock;
use crate::mobj::{MemObj, Pager};
use crate::page::Page;
use crate::param::{BSIZE, MAXBLOCKS, MAXFILE, NAME_LEN, NDIRECT};
use crate::pframe::PFrameGuard;
use crate::stat::Stat;

use super::S5Fs;

pub(super) const S5_TYPE_FREE: u16 = 0;
pub(super) const S5_TYPE_DATA: u16 = 1;
pub(super) const S5_TYPE_DIR: u16 = 2;
pub(super) const S5_TYPE_CHR: u16 = 3;
pub(super) const S5_TYPE_BLK: u16 = 4;

pub(super) fn vtype_from_disk(typ: u16) -> VnodeType {
    match typ {
        S5_TYPE_DATA => VnodeType::Regular,
        S5_TYPE_DIR => VnodeType::Directory,
        S5_TYPE_CHR => VnodeType::CharDev,
        S5_TYPE_BLK => VnodeType::BlockDev,
        _ => panic!("s5fs: unknown inode type {}", typ),
    }
}

pub(super) fn vtype_to_disk(vtype: VnodeType) -> u16 {
    match vtype {
        VnodeType::Regular => S5_TYPE_DATA,
        VnodeType::Directory => S5_TYPE_DIR,
        VnodeType::CharDev => S5_TYPE_CHR,
        VnodeType::BlockDev => S5_TYPE_BLK,
    }
}

/// On-disk inode structure.
#[repr(C)]
#[derive(Copy, Clone, AsBytes, FromBytes)]
pub struct Dinode {
    /// File size in bytes; the next free inode number while free.
    pub size: u32,

    /// File type
    pub typ: u16,

    /// Number of links to inode in file system
    pub nlink: u16,

    /// Direct data block addresses
    pub direct: [u32; NDIRECT],

    /// Indirect data block address; the device id of a special file
    pub indirect: u32,

    /// Inode number
    pub ino: u32,
}

const_assert!(mem::size_of::<Dinode>() == super::superblock::INODE_SIZE);

/// Directory entry size.
pub const DIRENT_SIZE: u64 = mem::size_of::<Dirent>() as u64;

const DIRENT_BYTES: usize = mem::size_of::<Dirent>();

/// On-disk directory entry. A directory is a file containing a sequence
/// of these.
#[repr(C)]
#[derive(Copy, Clone, AsBytes, FromBytes)]
pub struct Dirent {
    pub ino: u32,
    name: [u8; NAME_LEN],
}

const_assert!(mem::size_of::<Dirent>() == 32);
const_assert!(BSIZE % mem::size_of::<Dirent>() == 0);

impl Dirent {
    fn empty() -> Self {
        Self {
            ino: 0,
            name: [0; NAME_LEN],
        }
    }

    pub(super) fn new(ino: u32, name: &FileName) -> Self {
        let mut de = Self::empty();
        de.ino = ino;
        de.set_name(name);
        de
    }

    /// Fill in name, NUL terminated. `FileName` guarantees it fits.
    fn set_name(&mut self, name: &FileName) {
        let name = name.as_bytes();
        self.name[..name.len()].copy_from_slice(name);
        self.name[name.len()..].iter_mut().for_each(|b| *b = 0);
    }

    /// Returns the slice which exactly contains the name.
    fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|ch| *ch == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..len]
    }

    /// A zero-length name marks an empty or removed slot.
    fn is_empty(&self) -> bool {
        self.name[0] == 0
    }
}

pub(super) struct NodeInner {
    /// Vnode length. Tracks `inode.size`; both change together under the
    /// node lock.
    pub len: u64,

    /// Cached copy of the on-disk inode.
    pub inode: Dinode,

    /// The cached inode differs from disk.
    pub dirtied: bool,
}

/// In-memory image of an inode.
pub struct S5Node {
    fs: Arc<S5Fs>,
    ino: u32,
    vtype: VnodeType,
    devid: DevId,
    self_ref: Weak<S5Node>,
    /// Content memory object handed out by `mmap`; caches sparse pages.
    content: Arc<MemObj>,
    inner: SleepLock<NodeInner>,
}

impl S5Node {
    pub(super) fn from_dinode(fs: Arc<S5Fs>, dinode: Dinode) -> Arc<Self> {
        let vtype = vtype_from_disk(dinode.typ);
        let devid = if vtype.is_device() { dinode.indirect } else { 0 };
        Arc::new_cyclic(|weak: &Weak<S5Node>| S5Node {
            fs,
            ino: dinode.ino,
            vtype,
            devid,
            self_ref: weak.clone(),
            content: MemObj::new_file(weak.clone()),
            inner: SleepLock::new(
                "s5node",
                NodeInner {
                    len: dinode.size as u64,
                    inode: dinode,
                    dirtied: false,
                },
            ),
        })
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    fn arc(&self) -> Arc<S5Node> {
        self.self_ref.upgrade().expect("s5fs: node self reference is gone")
    }

    /// Writes the cached inode back if it diverged from disk.
    pub(super) fn sync_inode(&self) -> KResult<()> {
        let mut guard = self.lock();
        if guard.inner().dirtied {
            self.fs.write_dinode(self.ino, &guard.inner().inode)?;
            guard.inner_mut().dirtied = false;
        }
        Ok(())
    }

    /// Locks the node.
    pub(super) fn lock(&self) -> NodeGuard<'_> {
        mem::forget(self.inner.lock());
        NodeGuard { node: self }
    }

    fn downcast<'a>(vnode: &'a ArcVnode) -> KResult<&'a S5Node> {
        vnode.as_any().downcast_ref::<S5Node>().ok_or(Errno::EINVAL)
    }

    fn same_fs(&self, other: &S5Node) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs)
    }
}

/// `NodeGuard` implies that the node's `inner` lock is held by the
/// current thread.
///
/// # Safety
///
/// `node.inner` is locked.
pub(super) struct NodeGuard<'a> {
    node: &'a S5Node,
}

impl core::ops::Deref for NodeGuard<'_> {
    type Target = S5Node;

    fn deref(&self) -> &Self::Target {
        self.node
    }
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard was constructed by acquiring the lock and
        // forgetting the lock guard.
        unsafe { self.node.inner.unlock() };
    }
}

impl NodeGuard<'_> {
    pub(super) fn inner(&self) -> &NodeInner {
        // SAFETY: self.inner is locked.
        unsafe { &*self.node.inner.get_mut_raw() }
    }

    pub(super) fn inner_mut(&mut self) -> &mut NodeInner {
        // SAFETY: self.inner is locked and `&mut self` is exclusive.
        unsafe { &mut *self.node.inner.get_mut_raw() }
    }

    /// Maps file block `fno` to a disk block number, 0 meaning sparse.
    /// With `alloc`, missing blocks (and the indirect block, when `fno`
    /// lies past the direct slots) are allocated; if the second of the
    /// two allocations fails the first is released again.
    fn bmap(&mut self, fno: usize, alloc: bool) -> KResult<u32> {
        if fno >= MAXBLOCKS {
            return Err(Errno::EINVAL);
        }
        if fno < NDIRECT {
            let addr = self.inner().inode.direct[fno];
            if addr != 0 || !alloc {
                return Ok(addr);
            }
            let addr = self.fs.alloc_block()?;
            let inner = self.inner_mut();
            inner.inode.direct[fno] = addr;
            inner.dirtied = true;
            return Ok(addr);
        }

        let idx = fno - NDIRECT;
        let mut indirect = self.inner().inode.indirect;
        let mut fresh_indirect = false;
        if indirect == 0 {
            if !alloc {
                return Ok(0);
            }
            indirect = self.fs.alloc_block()?;
            fresh_indirect = true;
            let inner = self.inner_mut();
            inner.inode.indirect = indirect;
            inner.dirtied = true;
        }

        let addr = {
            let guard = self.fs.get_block(indirect, false)?;
            let words = LayoutVerified::<&[u8], [u32]>::new_slice(&guard.data()[..])
                .expect("indirect block layout");
            words[idx]
        };
        if addr != 0 || !alloc {
            return Ok(addr);
        }

        let addr = match self.fs.alloc_block() {
            Ok(addr) => addr,
            Err(e) => {
                if fresh_indirect {
                    let inner = self.inner_mut();
                    inner.inode.indirect = 0;
                    let _ = self.fs.free_block(indirect);
                }
                return Err(e);
            }
        };
        let mut guard = self.fs.get_block(indirect, true)?;
        let mut words = LayoutVerified::<&mut [u8], [u32]>::new_slice(&mut guard.data_mut()[..])
            .expect("indirect block layout");
        words[idx] = addr;
        Ok(addr)
    }

    /// Returns the locked frame backing file page `pageno`.
    ///
    /// A page backed by a real disk block is served from the block
    /// device's object at that block number; any sparse copy cached in
    /// the node's own object is evicted first, since the block is no
    /// longer sparse. A sparse page on a read is served from the node's
    /// own object and reads as zeros.
    pub(super) fn get_page(&mut self, pageno: u64, for_write: bool) -> KResult<PFrameGuard> {
        if pageno.checked_mul(BSIZE as u64).ok_or(Errno::EINVAL)? >= self.inner().len {
            return Err(Errno::EINVAL);
        }
        let blockno = self.bmap(pageno as usize, for_write)?;
        if blockno != 0 {
            if let Some(stale) = self.content.find_pframe(pageno) {
                self.content.free_pframe(stale);
            }
            self.fs.get_block(blockno, for_write)
        } else {
            debug_assert!(!for_write);
            self.content.default_get_pframe(pageno, for_write)
        }
    }

    /// Copies out of the file, clamped at end of file.
    pub(super) fn read(&mut self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        let len = self.inner().len;
        if pos >= len {
            return Ok(0);
        }
        let n = cmp::min(buf.len() as u64, len - pos) as usize;
        let mut tot = 0;
        while tot < n {
            let off = pos as usize + tot;
            let begin = off % BSIZE;
            let m = cmp::min(n - tot, BSIZE - begin);
            let guard = self.get_page((off / BSIZE) as u64, false)?;
            buf[tot..tot + m].copy_from_slice(&guard.data()[begin..begin + m]);
            tot += m;
        }
        Ok(tot)
    }

    /// Copies into the file, growing it as needed. The length and the
    /// cached inode size move together, ahead of each block touched, so
    /// a failure mid-write leaves the length covering exactly the
    /// successful prefix.
    pub(super) fn write(&mut self, pos: u64, buf: &[u8]) -> KResult<usize> {
        if pos >= MAXFILE {
            return Err(Errno::EFBIG);
        }
        let old_len = self.inner().len;
        let n = cmp::min(buf.len() as u64, MAXFILE - pos) as usize;
        let mut tot = 0;
        while tot < n {
            let off = pos + tot as u64;
            let begin = (off % BSIZE as u64) as usize;
            let m = cmp::min(n - tot, BSIZE - begin);
            let end = off + m as u64;
            if end > self.inner().len {
                let inner = self.inner_mut();
                inner.len = end;
                inner.inode.size = end as u32;
                inner.dirtied = true;
            }
            let mut guard = match self.get_page(off / BSIZE as u64, true) {
                Ok(guard) => guard,
                Err(e) => {
                    let written = cmp::max(old_len, off);
                    let inner = self.inner_mut();
                    if inner.len > written {
                        inner.len = written;
                        inner.inode.size = written as u32;
                    }
                    return if tot > 0 { Ok(tot) } else { Err(e) };
                }
            };
            guard.data_mut()[begin..begin + m].copy_from_slice(&buf[tot..tot + m]);
            tot += m;
        }
        Ok(tot)
    }

    fn read_dirent(&mut self, off: u64) -> KResult<Dirent> {
        let mut de = Dirent::empty();
        let n = self.read(off, de.as_bytes_mut())?;
        if n != DIRENT_BYTES {
            panic!("s5fs: torn directory entry");
        }
        Ok(de)
    }

    fn write_dirent(&mut self, off: u64, de: &Dirent) -> KResult<()> {
        // An entry never straddles a block, so the write is whole or not
        // at all.
        let n = self.write(off, de.as_bytes())?;
        if n != DIRENT_BYTES {
            return Err(Errno::ENOSPC);
        }
        Ok(())
    }

    /// Scans a directory for `name`. Returns the entry's byte position
    /// and inode number.
    pub(super) fn dir_find(&mut self, name: &FileName) -> KResult<(u64, u32)> {
        debug_assert!(self.vtype.is_dir());
        let len = self.inner().len;
        debug_assert_eq!(len % DIRENT_SIZE, 0);
        let mut off = 0;
        while off < len {
            let de = self.read_dirent(off)?;
            if !de.is_empty() && de.name_bytes() == name.as_bytes() {
                return Ok((off, de.ino));
            }
            off += DIRENT_SIZE;
        }
        Err(Errno::ENOENT)
    }

    /// Appends a new entry (name, ino). Removal swaps the tail entry
    /// down and shrinks the directory, so entries stay contiguous and
    /// the end is always the first free slot. The caller adjusts link
    /// counts.
    pub(super) fn dir_link(&mut self, name: &FileName, ino: u32) -> KResult<()> {
        match self.dir_find(name) {
            Ok(_) => return Err(Errno::EEXIST),
            Err(Errno::ENOENT) => {}
            Err(e) => return Err(e),
        }
        let len = self.inner().len;
        self.write_dirent(len, &Dirent::new(ino, name))
    }

    /// Removes the entry for `name`, which must map to `expect_ino`. The
    /// last entry moves into the hole and the directory shrinks by one
    /// record, preserving contiguity. The caller adjusts link counts.
    pub(super) fn dir_remove(&mut self, name: &FileName, expect_ino: u32) -> KResult<()> {
        let (off, ino) = self.dir_find(name)?;
        assert_eq!(ino, expect_ino, "s5fs: directory entry does not match the vnode");
        let last = self.inner().len - DIRENT_SIZE;
        if off != last {
            let tail = self.read_dirent(last)?;
            self.write_dirent(off, &tail)?;
        }
        let inner = self.inner_mut();
        inner.len = last;
        inner.inode.size = last as u32;
        inner.dirtied = true;
        Ok(())
    }

    fn readdir_at(&mut self, start: u64) -> KResult<Option<(DirEnt, u64)>> {
        if start % DIRENT_SIZE != 0 {
            return Err(Errno::EINVAL);
        }
        let len = self.inner().len;
        let mut pos = start;
        while pos < len {
            let de = self.read_dirent(pos)?;
            pos += DIRENT_SIZE;
            if de.is_empty() {
                continue;
            }
            let mut name = ArrayVec::new();
            name.try_extend_from_slice(de.name_bytes())
                .expect("s5fs: directory name overflow");
            return Ok(Some((DirEnt { ino: de.ino, name }, pos - start)));
        }
        Ok(None)
    }

    /// Blocks allocated to the file, including the indirect block.
    fn stat_blocks(&mut self) -> KResult<u32> {
        let inode = &self.inner().inode;
        let mut blocks = inode.direct.iter().filter(|b| **b != 0).count() as u32;
        let indirect = inode.indirect;
        if !self.vtype.is_device() && indirect != 0 {
            blocks += 1;
            let guard = self.fs.get_block(indirect, false)?;
            let words = LayoutVerified::<&[u8], [u32]>::new_slice(&guard.data()[..])
                .expect("indirect block layout");
            blocks += words.iter().filter(|b| **b != 0).count() as u32;
        }
        Ok(blocks)
    }

    /// Frees every data block, drops cached sparse pages, and zeroes the
    /// length.
    fn truncate_contents(&mut self) -> KResult<()> {
        let is_device = self.vtype.is_device();
        let mut inode = self.inner().inode;
        let res = self.fs.release_inode_blocks(&mut inode, is_device);
        let inner = self.inner_mut();
        inner.inode = inode;
        inner.inode.size = 0;
        inner.len = 0;
        inner.dirtied = true;
        self.content.evict_all();
        res
    }
}

impl Vnode for S5Node {
    fn ino(&self) -> u32 {
        self.ino
    }

    fn vtype(&self) -> VnodeType {
        self.vtype
    }

    fn devid(&self) -> DevId {
        self.devid
    }

    fn len(&self) -> u64 {
        let guard = self.lock();
        let len = guard.inner().len;
        len
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        match self.vtype {
            VnodeType::Directory => Err(Errno::EISDIR),
            VnodeType::CharDev | VnodeType::BlockDev => Err(Errno::ENODEV),
            VnodeType::Regular => {
                let mut guard = self.lock();
                guard.read(pos, buf)
            }
        }
    }

    fn write_at(&self, pos: u64, buf: &[u8], append: bool) -> KResult<(usize, u64)> {
        match self.vtype {
            VnodeType::Directory => Err(Errno::EISDIR),
            VnodeType::CharDev | VnodeType::BlockDev => Err(Errno::ENODEV),
            VnodeType::Regular => {
                let mut guard = self.lock();
                let pos = if append { guard.inner().len } else { pos };
                let n = guard.write(pos, buf)?;
                Ok((n, pos + n as u64))
            }
        }
    }

    fn truncate(&self) -> KResult<()> {
        match self.vtype {
            VnodeType::Directory => Err(Errno::EISDIR),
            VnodeType::CharDev | VnodeType::BlockDev => Err(Errno::ENODEV),
            VnodeType::Regular => {
                let mut guard = self.lock();
                guard.truncate_contents()
            }
        }
    }

    fn lookup(&self, name: &FileName) -> KResult<ArcVnode> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if name.is_dot() {
            // Self lookup must not retake the lock already protecting
            // this directory.
            return Ok(self.arc());
        }
        let ino = {
            let mut guard = self.lock();
            guard.dir_find(name)?.1
        };
        Ok(self.fs.vget(ino)?)
    }

    fn mknod(&self, name: &FileName, vtype: VnodeType, devid: DevId) -> KResult<ArcVnode> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if vtype.is_dir() {
            return Err(Errno::EINVAL);
        }
        let mut guard = self.lock();
        match guard.dir_find(name) {
            Ok(_) => return Err(Errno::EEXIST),
            Err(Errno::ENOENT) => {}
            Err(e) => return Err(e),
        }
        let ino = self.fs.alloc_inode(vtype, devid)?;
        // The fresh inode has no links; dropping the vnode before the
        // link count rises reclaims it.
        let child = self.fs.vget(ino)?;
        guard.dir_link(name, ino)?;
        let mut cguard = child.lock();
        cguard.inner_mut().inode.nlink = 1;
        cguard.inner_mut().dirtied = true;
        drop(cguard);
        Ok(child)
    }

    fn mkdir(&self, name: &FileName) -> KResult<ArcVnode> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let mut guard = self.lock();
        match guard.dir_find(name) {
            Ok(_) => return Err(Errno::EEXIST),
            Err(Errno::ENOENT) => {}
            Err(e) => return Err(e),
        }
        let ino = self.fs.alloc_inode(VnodeType::Directory, 0)?;
        let child = self.fs.vget(ino)?;
        {
            let mut cguard = child.lock();
            let dot = FileName::new(b".").expect("dot name");
            let dotdot = FileName::new(b"..").expect("dotdot name");
            cguard.write_dirent(0, &Dirent::new(ino, dot))?;
            cguard.write_dirent(DIRENT_SIZE, &Dirent::new(self.ino, dotdot))?;
            // Link count 2: the parent's entry plus ".".
            cguard.inner_mut().inode.nlink = 2;
            cguard.inner_mut().dirtied = true;
        }
        guard.dir_link(name, ino)?;
        // ".." links back to this directory.
        let inner = guard.inner_mut();
        inner.inode.nlink += 1;
        inner.dirtied = true;
        Ok(child)
    }

    fn rmdir(&self, name: &FileName) -> KResult<()> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if name.is_dot() {
            return Err(Errno::EINVAL);
        }
        if name.is_dotdot() {
            return Err(Errno::ENOTEMPTY);
        }
        let mut guard = self.lock();
        let (_, ino) = guard.dir_find(name)?;
        let child = self.fs.vget(ino)?;
        if !child.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let mut cguard = child.lock();
        if cguard.inner().len > 2 * DIRENT_SIZE {
            return Err(Errno::ENOTEMPTY);
        }
        guard.dir_remove(name, ino)?;
        // The parent loses "..", the child loses both its parent entry
        // and ".".
        let inner = guard.inner_mut();
        assert!(inner.inode.nlink >= 1, "s5fs: rmdir parent link underflow");
        inner.inode.nlink -= 1;
        inner.dirtied = true;
        let cinner = cguard.inner_mut();
        assert!(cinner.inode.nlink >= 2, "s5fs: rmdir child link underflow");
        cinner.inode.nlink -= 2;
        cinner.dirtied = true;
        Ok(())
    }

    fn link(&self, name: &FileName, child: &ArcVnode) -> KResult<()> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let child = S5Node::downcast(child)?;
        if !self.same_fs(child) {
            return Err(Errno::EINVAL);
        }
        if child.vtype.is_dir() {
            return Err(Errno::EPERM);
        }
        // Ancestor first: the directory's lock, then the child's.
        let mut guard = self.lock();
        guard.dir_link(name, child.ino)?;
        let mut cguard = child.lock();
        let cinner = cguard.inner_mut();
        cinner.inode.nlink += 1;
        cinner.dirtied = true;
        Ok(())
    }

    fn unlink(&self, name: &FileName) -> KResult<()> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if name.is_dot() || name.is_dotdot() {
            return Err(Errno::EINVAL);
        }
        let mut guard = self.lock();
        let (_, ino) = guard.dir_find(name)?;
        let child = self.fs.vget(ino)?;
        if child.vtype.is_dir() {
            return Err(Errno::EISDIR);
        }
        guard.dir_remove(name, ino)?;
        let mut cguard = child.lock();
        let cinner = cguard.inner_mut();
        assert!(cinner.inode.nlink >= 1, "s5fs: unlink link underflow");
        cinner.inode.nlink -= 1;
        cinner.dirtied = true;
        Ok(())
    }

    fn rename(&self, from: &FileName, dst: &ArcVnode, to: &FileName) -> KResult<()> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let dst = S5Node::downcast(dst)?;
        if !self.same_fs(dst) {
            return Err(Errno::EINVAL);
        }
        if !dst.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if from.is_dot() || from.is_dotdot() || to.is_dot() || to.is_dotdot() {
            return Err(Errno::EINVAL);
        }

        if self.ino == dst.ino {
            let mut guard = self.lock();
            return rename_locked(&mut guard, from, None, to, &self.fs);
        }
        // Two distinct directories lock in inode order.
        if self.ino < dst.ino {
            let mut src = self.lock();
            let mut dstg = dst.lock();
            rename_locked(&mut src, from, Some(&mut dstg), to, &self.fs)
        } else {
            let mut dstg = dst.lock();
            let mut src = self.lock();
            rename_locked(&mut src, from, Some(&mut dstg), to, &self.fs)
        }
    }

    fn readdir(&self, pos: u64) -> KResult<Option<(DirEnt, u64)>> {
        if !self.vtype.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let mut guard = self.lock();
        guard.readdir_at(pos)
    }

    fn stat(&self) -> KResult<Stat> {
        let mut guard = self.lock();
        let blocks = guard.stat_blocks()?;
        let inner = guard.inner();
        Ok(Stat {
            dev: self.fs.dev_id(),
            ino: self.ino,
            typ: self.vtype,
            rdev: self.devid,
            nlink: inner.inode.nlink,
            size: inner.len,
            blksize: BSIZE as u32,
            blocks,
        })
    }

    fn mmap_obj(&self) -> KResult<Arc<MemObj>> {
        match self.vtype {
            VnodeType::Regular => Ok(self.content.clone()),
            VnodeType::Directory => Err(Errno::EISDIR),
            VnodeType::CharDev | VnodeType::BlockDev => Err(Errno::ENODEV),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Entry surgery common to the one- and two-directory rename cases; the
/// needed locks are already held.
fn rename_locked<'a>(
    src: &mut NodeGuard<'a>,
    from: &FileName,
    dst: Option<&mut NodeGuard<'a>>,
    to: &FileName,
    fs: &Arc<S5Fs>,
) -> KResult<()> {
    let (_, src_ino) = src.dir_find(from)?;
    let moved = fs.vget(src_ino)?;
    if moved.vtype.is_dir() {
        return Err(Errno::EISDIR);
    }

    {
        let dst: &mut NodeGuard<'_> = match dst {
            Some(g) => g,
            None => &mut *src,
        };
        match dst.dir_find(to) {
            Ok((to_off, target_ino)) => {
                if target_ino == src_ino {
                    return Ok(());
                }
                let target = fs.vget(target_ino)?;
                if target.vtype.is_dir() {
                    return Err(Errno::EISDIR);
                }
                // Overwrite the entry in place; the displaced target
                // loses a link.
                dst.write_dirent(to_off, &Dirent::new(src_ino, to))?;
                let mut tguard = target.lock();
                let tinner = tguard.inner_mut();
                assert!(tinner.inode.nlink >= 1, "s5fs: rename link underflow");
                tinner.inode.nlink -= 1;
                tinner.dirtied = true;
            }
            Err(Errno::ENOENT) => dst.dir_link(to, src_ino)?,
            Err(e) => return Err(e),
        }
    }
    src.dir_remove(from, src_ino)?;
    // The moved file's link count is unchanged: one entry left, one
    // entry gained.
    Ok(())
}

impl Pager for S5Node {
    fn get_page(&self, pageno: u64, for_write: bool) -> KResult<PFrameGuard> {
        let mut guard = self.lock();
        guard.get_page(pageno, for_write)
    }

    fn fill_page(&self, _pageno: u64, data: &mut Page) -> KResult<()> {
        // Pages cached in the node's own object are sparse.
        data.fill(0);
        Ok(())
    }

    fn flush_page(&self, _pageno: u64, _data: &Page) -> KResult<()> {
        // Sparse pages have no disk home; real pages live in the block
        // device's cache and write back through it.
        Ok(())
    }
}

impl Drop for S5Node {
    fn drop(&mut self) {
        self.fs.forget_vnode(self.ino, &self.self_ref);
        let is_device = self.vtype.is_device();
        let inner = self.inner.get_mut();
        if inner.inode.nlink == 0 {
            let mut inode = inner.inode;
            if let Err(e) = self.fs.release_inode_blocks(&mut inode, is_device) {
                log::error!("s5fs: leaking blocks of inode {}: {}", self.ino, e);
            }
            if let Err(e) = self.fs.free_inode(self.ino) {
                log::error!("s5fs: leaking inode {}: {}", self.ino, e);
            }
        } else if inner.dirtied {
            if let Err(e) = self.fs.write_dinode(self.ino, &inner.inode) {
                log::error!("s5fs: dropping dirty inode {}: {}", self.ino, e);
            }
        }
    }
}
