//! S5FS. Four layers:
//!   + Blocks: linked free list of raw disk blocks, head inline in the
//!     superblock.
//!   + Inodes: fixed on-disk table, free inodes chained through their
//!     size union.
//!   + Files: block mapping with one indirect level, reading, writing.
//!   + Directories: files holding fixed-size entries.
//!
//! The superblock mutex serializes both free lists. Code freeing inode
//! contents collects what it must release first and calls `free_block`
//! afterwards, which takes the superblock lock itself; nothing acquires
//! it while already holding it.

use core::mem;

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use zerocopy::LayoutVerified;

use crate::bdev::BlockDevice;
use crate::errno::{Errno, KResult};
use crate::lock::{SleepLock, Spinlock};
use crate::mobj::MemObj;
use crate::page::Page;
use crate::param::NDIRECT;
use crate::pframe::PFrameGuard;

mod node;
mod superblock;

pub use node::{Dinode, Dirent, S5Node, DIRENT_SIZE};
pub use superblock::{Superblock, FREE_END, INODE_SIZE, IPB, NFREE, S5_MAGIC, S5_VERSION};

use node::{vtype_to_disk, S5_TYPE_DIR, S5_TYPE_FREE};

use crate::fs::{DevId, VnodeType};

const SB_BYTES: usize = mem::size_of::<Superblock>();

pub struct S5Fs {
    dev: Arc<dyn BlockDevice>,
    /// Page cache of the disk; file pages with real blocks live here.
    bdev_obj: Arc<MemObj>,
    sb: SleepLock<Superblock>,
    /// At most one vnode exists per inode number.
    vcache: Spinlock<BTreeMap<u32, Weak<S5Node>>>,
    self_ref: Weak<S5Fs>,

    // Geometry, fixed at mount.
    ninodes: u32,
    root_ino: u32,
    data_start: u32,
    total_blocks: u32,
}

impl S5Fs {
    /// Reads and validates the superblock, returning the mounted file
    /// system.
    pub fn mount(dev: Arc<dyn BlockDevice>) -> KResult<Arc<S5Fs>> {
        let mut page = Page::new_zeroed()?;
        dev.read_block(0, &mut page)?;
        let sb = *LayoutVerified::<&[u8], Superblock>::new(&page[..SB_BYTES])
            .expect("superblock layout");
        if sb.magic != S5_MAGIC || sb.version != S5_VERSION {
            log::error!("s5fs: bad superblock on device {}", dev.id());
            return Err(Errno::EINVAL);
        }
        let total_blocks = dev.blocks();
        if sb.ninodes == 0
            || sb.ninodes as usize % IPB != 0
            || sb.data_start() >= total_blocks
            || sb.root_ino >= sb.ninodes
        {
            return Err(Errno::EINVAL);
        }
        log::info!(
            "s5fs: mounted device {}: {} blocks, {} inodes",
            dev.id(),
            total_blocks,
            sb.ninodes
        );
        Ok(Arc::new_cyclic(|weak| S5Fs {
            bdev_obj: MemObj::new_bdev(dev.clone()),
            ninodes: sb.ninodes,
            root_ino: sb.root_ino,
            data_start: sb.data_start(),
            total_blocks,
            dev,
            sb: SleepLock::new("s5fs super", sb),
            vcache: Spinlock::new("s5fs vcache", BTreeMap::new()),
            self_ref: weak.clone(),
        }))
    }

    /// Writes a fresh file system onto `dev`: the inode table with the
    /// root directory in inode 0, the root's "." and ".." block, and a
    /// free-block chain covering everything else.
    pub fn format(dev: &dyn BlockDevice, ninodes: u32) -> KResult<()> {
        let total = dev.blocks();
        let ninodes = (ninodes.max(IPB as u32) + IPB as u32 - 1) / IPB as u32 * IPB as u32;
        let inode_blocks = ninodes / IPB as u32;
        let root_data = 1 + inode_blocks;
        if total <= root_data + 1 {
            return Err(Errno::EINVAL);
        }

        let mut page = Page::new_zeroed()?;

        // Inode table. Inode 0 is the root directory; the rest chain
        // onto the free list.
        for blk in 0..inode_blocks {
            page.fill(0);
            for slot in 0..IPB as u32 {
                let ino = blk * IPB as u32 + slot;
                let dinode = if ino == 0 {
                    Dinode {
                        size: (2 * DIRENT_SIZE) as u32,
                        typ: S5_TYPE_DIR,
                        // "." and ".." both name the root.
                        nlink: 2,
                        direct: {
                            let mut direct = [0; NDIRECT];
                            direct[0] = root_data;
                            direct
                        },
                        indirect: 0,
                        ino,
                    }
                } else {
                    Dinode {
                        size: if ino + 1 < ninodes { ino + 1 } else { FREE_END },
                        typ: S5_TYPE_FREE,
                        nlink: 0,
                        direct: [0; NDIRECT],
                        indirect: 0,
                        ino,
                    }
                };
                let off = Superblock::ioffset(ino);
                let mut view = LayoutVerified::<&mut [u8], Dinode>::new(
                    &mut page[off..off + INODE_SIZE],
                )
                .expect("inode layout");
                *view = dinode;
            }
            dev.write_block(1 + blk, &page)?;
        }

        // Root directory contents.
        page.fill(0);
        let dot = crate::fs::path::FileName::new(b".").expect("dot name");
        let dotdot = crate::fs::path::FileName::new(b"..").expect("dotdot name");
        for (i, de) in [Dirent::new(0, dot), Dirent::new(0, dotdot)].iter().enumerate() {
            let off = i * mem::size_of::<Dirent>();
            let mut view =
                LayoutVerified::<&mut [u8], Dirent>::new(&mut page[off..off + mem::size_of::<Dirent>()])
                    .expect("dirent layout");
            *view = *de;
        }
        dev.write_block(root_data, &page)?;

        // Free-block chain over the remaining blocks, built with the same
        // spill rule `free_block` uses.
        let mut sb = Superblock {
            magic: S5_MAGIC,
            version: S5_VERSION,
            free: [0; NFREE],
            nfree: 0,
            free_inode: if ninodes > 1 { 1 } else { FREE_END },
            ninodes,
            root_ino: 0,
        };
        sb.free[NFREE - 1] = FREE_END;
        for blockno in (root_data + 1)..total {
            if sb.nfree as usize == NFREE - 1 {
                page.fill(0);
                {
                    let mut words =
                        LayoutVerified::<&mut [u8], [u32]>::new_slice(&mut page[..])
                            .expect("free node layout");
                    words[..NFREE].copy_from_slice(&sb.free);
                }
                dev.write_block(blockno, &page)?;
                sb.free = [0; NFREE];
                sb.free[NFREE - 1] = blockno;
                sb.nfree = 0;
            } else {
                sb.free[sb.nfree as usize] = blockno;
                sb.nfree += 1;
            }
        }

        page.fill(0);
        let mut view = LayoutVerified::<&mut [u8], Superblock>::new(&mut page[..SB_BYTES])
            .expect("superblock layout");
        *view = sb;
        drop(view);
        dev.write_block(0, &page)?;
        log::info!("s5fs: formatted device {}: {} blocks", dev.id(), total);
        Ok(())
    }

    fn arc(&self) -> Arc<S5Fs> {
        self.self_ref.upgrade().expect("s5fs: fs self reference is gone")
    }

    pub fn dev_id(&self) -> u32 {
        self.dev.id()
    }

    pub fn root(&self) -> KResult<Arc<S5Node>> {
        self.vget(self.root_ino)
    }

    /// Finds or revives the vnode for `ino`.
    pub(crate) fn vget(&self, ino: u32) -> KResult<Arc<S5Node>> {
        {
            let mut cache = self.vcache.lock();
            if let Some(weak) = cache.get(&ino) {
                if let Some(node) = weak.upgrade() {
                    return Ok(node);
                }
                let _ = cache.remove(&ino);
            }
        }
        let dinode = self.read_dinode(ino)?;
        if dinode.typ == S5_TYPE_FREE {
            panic!("s5fs: vget of free inode {}", ino);
        }
        assert_eq!(dinode.ino, ino, "s5fs: inode number mismatch");
        let node = S5Node::from_dinode(self.arc(), dinode);
        let mut cache = self.vcache.lock();
        match cache.get(&ino).and_then(|weak| weak.upgrade()) {
            // Lost a race with another reader; ours goes away again.
            Some(existing) => Ok(existing),
            None => {
                let _ = cache.insert(ino, Arc::downgrade(&node));
                Ok(node)
            }
        }
    }

    /// Detaches a dying vnode from the cache.
    pub(super) fn forget_vnode(&self, ino: u32, node: &Weak<S5Node>) {
        let mut cache = self.vcache.lock();
        if let Some(weak) = cache.get(&ino) {
            if weak.ptr_eq(node) {
                let _ = cache.remove(&ino);
            }
        }
    }

    /// Locked frame of one disk block, through the device's page cache.
    pub(super) fn get_block(&self, blockno: u32, for_write: bool) -> KResult<PFrameGuard> {
        self.bdev_obj.get_pframe(blockno as u64, for_write)
    }

    fn check_data_block(&self, blockno: u32) {
        if blockno < self.data_start || blockno >= self.total_blocks {
            panic!("s5fs: free list corruption at block {}", blockno);
        }
    }

    /// Allocates a zeroed data block; zeroing keeps 0 meaningful as the
    /// sparse sentinel. When the inline array runs out, the next list
    /// node refills it and the node's block itself is the allocation.
    pub(super) fn alloc_block(&self) -> KResult<u32> {
        let mut sb = self.sb.lock();
        let blockno = if sb.nfree == 0 {
            let next = sb.free[NFREE - 1];
            if next == FREE_END {
                log::warn!("s5fs: out of blocks");
                return Err(Errno::ENOSPC);
            }
            self.check_data_block(next);
            {
                let guard = self.get_block(next, false)?;
                let words = LayoutVerified::<&[u8], [u32]>::new_slice(&guard.data()[..])
                    .expect("free node layout");
                sb.free.copy_from_slice(&words[..NFREE]);
            }
            log::trace!("s5fs: refilled free list from block {}", next);
            sb.nfree = (NFREE - 1) as u32;
            next
        } else {
            sb.nfree -= 1;
            let blockno = sb.free[sb.nfree as usize];
            self.check_data_block(blockno);
            blockno
        };
        drop(sb);
        let mut guard = self.get_block(blockno, true)?;
        guard.data_mut().fill(0);
        Ok(blockno)
    }

    /// Returns a block to the free list. The freed block's cached frame
    /// is dropped clean; its contents stopped mattering when the last
    /// reference to it went away. A full inline array spills into the
    /// freed block, which becomes the new head node.
    pub(super) fn free_block(&self, blockno: u32) -> KResult<()> {
        self.check_data_block(blockno);
        if let Some(mut guard) = self.bdev_obj.find_pframe(blockno as u64) {
            guard.clear_dirty();
            self.bdev_obj.free_pframe(guard);
        }
        let mut sb = self.sb.lock();
        if sb.nfree as usize == NFREE - 1 {
            {
                let mut guard = self.get_block(blockno, true)?;
                let mut words =
                    LayoutVerified::<&mut [u8], [u32]>::new_slice(&mut guard.data_mut()[..])
                        .expect("free node layout");
                words[..NFREE].copy_from_slice(&sb.free);
            }
            sb.free = [0; NFREE];
            sb.free[NFREE - 1] = blockno;
            sb.nfree = 0;
            log::trace!("s5fs: spilled free list into block {}", blockno);
        } else {
            let nfree = sb.nfree as usize;
            sb.free[nfree] = blockno;
            sb.nfree += 1;
        }
        Ok(())
    }

    /// Pops an inode off the free list and writes its fresh identity.
    pub(super) fn alloc_inode(&self, vtype: VnodeType, devid: DevId) -> KResult<u32> {
        let mut sb = self.sb.lock();
        let ino = sb.free_inode;
        if ino == FREE_END {
            log::warn!("s5fs: out of inodes");
            return Err(Errno::ENOSPC);
        }
        let dinode = self.read_dinode(ino)?;
        debug_assert_eq!(dinode.typ, S5_TYPE_FREE, "s5fs: allocated inode on free list");
        sb.free_inode = dinode.size;
        drop(sb);
        let fresh = Dinode {
            size: 0,
            typ: vtype_to_disk(vtype),
            nlink: 0,
            direct: [0; NDIRECT],
            indirect: if vtype.is_device() { devid } else { 0 },
            ino,
        };
        self.write_dinode(ino, &fresh)?;
        Ok(ino)
    }

    /// Pushes an inode back onto the free list.
    pub(super) fn free_inode(&self, ino: u32) -> KResult<()> {
        let mut sb = self.sb.lock();
        let fresh = Dinode {
            size: sb.free_inode,
            typ: S5_TYPE_FREE,
            nlink: 0,
            direct: [0; NDIRECT],
            indirect: 0,
            ino,
        };
        self.write_dinode(ino, &fresh)?;
        sb.free_inode = ino;
        Ok(())
    }

    /// Frees an inode's direct blocks, the blocks named by its indirect
    /// block, and the indirect block itself. For special files the
    /// indirect field is a device id and stays put.
    pub(super) fn release_inode_blocks(&self, inode: &mut Dinode, is_device: bool) -> KResult<()> {
        for slot in inode.direct.iter_mut() {
            if *slot != 0 {
                self.free_block(*slot)?;
                *slot = 0;
            }
        }
        if !is_device && inode.indirect != 0 {
            let blocks: Vec<u32> = {
                let guard = self.get_block(inode.indirect, false)?;
                let words = LayoutVerified::<&[u8], [u32]>::new_slice(&guard.data()[..])
                    .expect("indirect block layout");
                words.iter().filter(|b| **b != 0).cloned().collect()
            };
            for blockno in blocks {
                self.free_block(blockno)?;
            }
            self.free_block(inode.indirect)?;
            inode.indirect = 0;
        }
        Ok(())
    }

    pub(super) fn read_dinode(&self, ino: u32) -> KResult<Dinode> {
        if ino >= self.ninodes {
            return Err(Errno::EINVAL);
        }
        let guard = self.get_block(Superblock::iblock(ino), false)?;
        let off = Superblock::ioffset(ino);
        Ok(*LayoutVerified::<&[u8], Dinode>::new(&guard.data()[off..off + INODE_SIZE])
            .expect("inode layout"))
    }

    pub(super) fn write_dinode(&self, ino: u32, dinode: &Dinode) -> KResult<()> {
        assert!(ino < self.ninodes, "s5fs: inode {} out of range", ino);
        let mut guard = self.get_block(Superblock::iblock(ino), true)?;
        let off = Superblock::ioffset(ino);
        let mut view =
            LayoutVerified::<&mut [u8], Dinode>::new(&mut guard.data_mut()[off..off + INODE_SIZE])
                .expect("inode layout");
        *view = *dinode;
        Ok(())
    }

    /// Walks the free-block list. Each chained node contributes its data
    /// slots plus its own block.
    pub fn free_block_count(&self) -> KResult<u32> {
        let sb = self.sb.lock();
        let mut count = sb.nfree;
        let mut next = sb.free[NFREE - 1];
        while next != FREE_END {
            count += 1;
            let guard = self.get_block(next, false)?;
            let words = LayoutVerified::<&[u8], [u32]>::new_slice(&guard.data()[..])
                .expect("free node layout");
            count += words[..NFREE - 1].iter().filter(|b| **b != 0).count() as u32;
            next = words[NFREE - 1];
        }
        Ok(count)
    }

    /// Writes back dirty cached inodes, the superblock, and every dirty
    /// page of the device cache. The shutdown driver calls this.
    pub fn sync(&self) -> KResult<()> {
        let nodes: Vec<Arc<S5Node>> = self
            .vcache
            .lock()
            .values()
            .filter_map(|weak| weak.upgrade())
            .collect();
        for node in nodes {
            node.sync_inode()?;
        }
        self.write_super()?;
        self.bdev_obj.flush()
    }

    fn write_super(&self) -> KResult<()> {
        let sb = self.sb.lock();
        let mut guard = self.get_block(0, true)?;
        let mut view = LayoutVerified::<&mut [u8], Superblock>::new(&mut guard.data_mut()[..SB_BYTES])
            .expect("superblock layout");
        *view = *sb;
        Ok(())
    }
}

impl Drop for S5Fs {
    fn drop(&mut self) {
        // Live vnodes hold the file system, so by now only the
        // superblock and the device cache can be dirty.
        if self.write_super().is_err() || self.bdev_obj.flush().is_err() {
            log::error!("s5fs: final writeback failed on device {}", self.dev.id());
        } else {
            log::info!("s5fs: device {} unmounted", self.dev.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdev::MemDisk;
    use crate::fs::path::FileName;
    use crate::fs::Vnode;
    use crate::param::{BSIZE, MAXFILE};
    use crate::test_util::{mounted_fs, mounted_fs_with};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn name(bytes: &[u8]) -> &FileName {
        FileName::new(bytes).unwrap()
    }

    /// Identity of the underlying vnode, ignoring vtable metadata.
    fn same_node(a: &crate::fs::ArcVnode, b: &crate::fs::ArcVnode) -> bool {
        Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
    }

    #[test]
    fn mount_rejects_garbage() {
        let disk = MemDisk::new(1, 64).unwrap();
        assert_eq!(S5Fs::mount(disk).err(), Some(Errno::EINVAL));
    }

    #[test]
    fn root_directory_shape() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let st = root.stat().unwrap();
        assert_eq!(st.typ, VnodeType::Directory);
        assert_eq!(st.nlink, 2);
        assert_eq!(st.size, 2 * DIRENT_SIZE);

        let (dot, adv) = root.readdir(0).unwrap().unwrap();
        assert_eq!(dot.name.as_slice(), b".");
        assert_eq!(dot.ino, root.ino());
        assert_eq!(adv, DIRENT_SIZE);
        let (dotdot, _) = root.readdir(DIRENT_SIZE).unwrap().unwrap();
        assert_eq!(dotdot.name.as_slice(), b"..");
        assert_eq!(dotdot.ino, root.ino());
        assert!(root.readdir(2 * DIRENT_SIZE).unwrap().is_none());
    }

    #[test]
    fn block_alloc_exhausts_and_recycles() {
        let fs = mounted_fs(96);
        let initial = fs.free_block_count().unwrap();
        assert!(initial as usize > NFREE);

        let mut held = alloc::vec::Vec::new();
        loop {
            match fs.alloc_block() {
                Ok(b) => held.push(b),
                Err(Errno::ENOSPC) => break,
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(held.len() as u32, initial);
        assert_eq!(fs.free_block_count().unwrap(), 0);

        for b in held.drain(..) {
            fs.free_block(b).unwrap();
        }
        assert_eq!(fs.free_block_count().unwrap(), initial);
        let again = fs.alloc_block().unwrap();
        fs.free_block(again).unwrap();
        assert_eq!(fs.free_block_count().unwrap(), initial);
    }

    #[test]
    fn allocated_blocks_come_back_zeroed() {
        let fs = mounted_fs(96);
        let blockno = fs.alloc_block().unwrap();
        {
            let mut guard = fs.get_block(blockno, true).unwrap();
            guard.data_mut().fill(0xcc);
        }
        fs.free_block(blockno).unwrap();
        // Cycle enough blocks to see the same one again.
        for _ in 0..4 {
            let b = fs.alloc_block().unwrap();
            let guard = fs.get_block(b, false).unwrap();
            assert!(guard.data().iter().all(|x| *x == 0));
            drop(guard);
            fs.free_block(b).unwrap();
        }
    }

    #[test]
    fn create_write_read() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let f = root.mknod(name(b"f"), VnodeType::Regular, 0).unwrap();
        let (n, end) = f.write_at(0, b"hello", false).unwrap();
        assert_eq!((n, end), (5, 5));
        assert_eq!(f.len(), 5);

        let mut buf = [0u8; 16];
        let n = f.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        // Reads at and past the end return 0 bytes.
        assert_eq!(f.read_at(5, &mut buf).unwrap(), 0);
        assert_eq!(f.read_at(100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn sparse_file_reads_zero() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let f = root.mknod(name(b"sparse"), VnodeType::Regular, 0).unwrap();
        let pos = (3 * BSIZE) as u64;
        let _ = f.write_at(pos, b"tail", false).unwrap();
        assert_eq!(f.len(), pos + 4);

        let mut buf = [0xffu8; 64];
        let n = f.read_at(0, &mut buf).unwrap();
        assert_eq!(n, 64);
        assert!(buf.iter().all(|b| *b == 0));

        // Only the written block is allocated.
        assert_eq!(f.stat().unwrap().blocks, 1);

        // Filling a hole later keeps the tail intact.
        let _ = f.write_at(0, b"head", false).unwrap();
        let mut buf = [0u8; 4];
        let _ = f.read_at(pos, &mut buf).unwrap();
        assert_eq!(&buf, b"tail");
        assert_eq!(f.stat().unwrap().blocks, 2);
    }

    #[test]
    fn indirect_blocks_round_trip() {
        let fs = mounted_fs(256);
        let root = fs.root().unwrap();
        let f = root.mknod(name(b"big"), VnodeType::Regular, 0).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let nblocks = NDIRECT + 3;
        let mut data = alloc::vec![0u8; nblocks * BSIZE];
        rng.fill(&mut data[..]);
        let (n, _) = f.write_at(0, &data, false).unwrap();
        assert_eq!(n, data.len());

        let mut back = alloc::vec![0u8; data.len()];
        assert_eq!(f.read_at(0, &mut back).unwrap(), data.len());
        assert_eq!(back, data);

        // Direct blocks, three indirect data blocks, and the indirect
        // block itself.
        assert_eq!(f.stat().unwrap().blocks as usize, nblocks + 1);
    }

    #[test]
    fn write_past_max_is_efbig() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let f = root.mknod(name(b"f"), VnodeType::Regular, 0).unwrap();
        assert_eq!(f.write_at(MAXFILE, b"x", false).err(), Some(Errno::EFBIG));
        assert_eq!(f.write_at(MAXFILE + 7, b"x", false).err(), Some(Errno::EFBIG));
    }

    #[test]
    fn unlink_reclaims_space() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let initial = fs.free_block_count().unwrap();

        let f = root.mknod(name(b"f"), VnodeType::Regular, 0).unwrap();
        let data = [7u8; 2 * BSIZE];
        let _ = f.write_at(0, &data, false).unwrap();
        assert_eq!(fs.free_block_count().unwrap(), initial - 2);

        root.unlink(name(b"f")).unwrap();
        // Space returns once the last reference goes away.
        assert_eq!(f.stat().unwrap().nlink, 0);
        drop(f);
        assert_eq!(fs.free_block_count().unwrap(), initial);
        assert_eq!(root.lookup(name(b"f")).err(), Some(Errno::ENOENT));
    }

    #[test]
    fn vnode_cache_identity() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let f = root.mknod(name(b"f"), VnodeType::Regular, 0).unwrap();
        let a = root.lookup(name(b"f")).unwrap();
        let b = root.lookup(name(b"f")).unwrap();
        assert!(same_node(&a, &b));
        assert!(same_node(&a, &f));
        assert_eq!(a.ino(), f.ino());

        let ino = f.ino();
        drop((a, b, f));
        // A fresh vnode revives the same inode.
        let again = root.lookup(name(b"f")).unwrap();
        assert_eq!(again.ino(), ino);
    }

    #[test]
    fn mkdir_rmdir_cycle() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let d = root.mkdir(name(b"d")).unwrap();
        assert_eq!(d.stat().unwrap().nlink, 2);
        assert_eq!(root.stat().unwrap().nlink, 3);
        assert_eq!(root.mkdir(name(b"d")).err(), Some(Errno::EEXIST));

        // "." and ".." are present from creation.
        let (dot, _) = d.readdir(0).unwrap().unwrap();
        assert_eq!(dot.name.as_slice(), b".");
        let (dotdot, _) = d.readdir(DIRENT_SIZE).unwrap().unwrap();
        assert_eq!(dotdot.ino, root.ino());

        root.rmdir(name(b"d")).unwrap();
        assert_eq!(root.stat().unwrap().nlink, 2);
        assert_eq!(root.lookup(name(b"d")).err(), Some(Errno::ENOENT));
    }

    #[test]
    fn rmdir_nonempty_refused() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let d = root.mkdir(name(b"d")).unwrap();
        let _f = d.mknod(name(b"f"), VnodeType::Regular, 0).unwrap();

        assert_eq!(root.rmdir(name(b"d")).err(), Some(Errno::ENOTEMPTY));
        // The refused directory is unchanged.
        assert_eq!(d.stat().unwrap().size, 3 * DIRENT_SIZE);

        d.unlink(name(b"f")).unwrap();
        root.rmdir(name(b"d")).unwrap();
    }

    #[test]
    fn link_shares_inode() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let f = root.mknod(name(b"f"), VnodeType::Regular, 0).unwrap();
        root.link(name(b"g"), &f).unwrap();
        assert_eq!(f.stat().unwrap().nlink, 2);

        let g = root.lookup(name(b"g")).unwrap();
        assert!(same_node(&f, &g));

        let _ = f.write_at(0, b"shared", false).unwrap();
        root.unlink(name(b"f")).unwrap();
        assert_eq!(g.stat().unwrap().nlink, 1);
        let mut buf = [0u8; 6];
        let _ = g.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"shared");

        // A second link to the same name is refused, as is linking a
        // directory.
        let d = root.mkdir(name(b"d")).unwrap();
        assert_eq!(root.link(name(b"g"), &g).err(), Some(Errno::EEXIST));
        assert_eq!(root.link(name(b"dlink"), &d).err(), Some(Errno::EPERM));
    }

    #[test]
    fn rename_moves_and_overwrites() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let d = root.mkdir(name(b"d")).unwrap();
        let a = root.mknod(name(b"a"), VnodeType::Regular, 0).unwrap();
        let _ = a.write_at(0, b"payload", false).unwrap();

        // Move across directories.
        root.rename(name(b"a"), &d, name(b"b")).unwrap();
        assert_eq!(root.lookup(name(b"a")).err(), Some(Errno::ENOENT));
        let moved = d.lookup(name(b"b")).unwrap();
        assert!(same_node(&moved, &a));
        assert_eq!(moved.stat().unwrap().nlink, 1);

        // Overwrite an existing target.
        let victim = d.mknod(name(b"c"), VnodeType::Regular, 0).unwrap();
        d.rename(name(b"b"), &d, name(b"c")).unwrap();
        assert_eq!(victim.stat().unwrap().nlink, 0);
        let now = d.lookup(name(b"c")).unwrap();
        assert!(same_node(&now, &a));

        // Directories stay where they are.
        let sub = d.mkdir(name(b"sub")).unwrap();
        assert_eq!(
            d.rename(name(b"sub"), &d, name(b"c")).err(),
            Some(Errno::EISDIR)
        );
        assert_eq!(
            d.rename(name(b"c"), &d, name(b"sub")).err(),
            Some(Errno::EISDIR)
        );
        drop(sub);
        assert_eq!(d.rename(name(b"zz"), &d, name(b"c")).err(), Some(Errno::ENOENT));
    }

    #[test]
    fn out_of_inodes() {
        // One inode block: the root plus 31 free inodes.
        let fs = mounted_fs_with(128, 32);
        let root = fs.root().unwrap();
        let mut made = alloc::vec::Vec::new();
        for i in 0..31u32 {
            let mut label = alloc::vec![b'f'];
            label.extend_from_slice(i.to_string().as_bytes());
            made.push(root.mknod(name(&label), VnodeType::Regular, 0).unwrap());
        }
        assert_eq!(
            root.mknod(name(b"one-more"), VnodeType::Regular, 0).err(),
            Some(Errno::ENOSPC)
        );
        assert_eq!(root.mkdir(name(b"dir")).err(), Some(Errno::ENOSPC));

        // The failure left the tree usable.
        assert_eq!(root.lookup(name(b"one-more")).err(), Some(Errno::ENOENT));
        root.unlink(name(b"f0")).unwrap();
        drop(made.remove(0));
        let _ = root.mknod(name(b"recycled"), VnodeType::Regular, 0).unwrap();
    }

    #[test]
    fn fill_disk_delete_and_retry() {
        let fs = mounted_fs(72);
        let root = fs.root().unwrap();
        let initial = fs.free_block_count().unwrap();
        let f = root.mknod(name(b"hog"), VnodeType::Regular, 0).unwrap();

        // Write until the disk is full; a torn final write surfaces as a
        // short count, then the next write fails outright.
        let chunk = [9u8; BSIZE];
        let mut pos = 0u64;
        loop {
            match f.write_at(pos, &chunk, false) {
                Ok((n, _)) => {
                    pos += n as u64;
                    if n < chunk.len() {
                        assert_eq!(f.write_at(pos, &chunk, false).err(), Some(Errno::ENOSPC));
                        break;
                    }
                }
                Err(Errno::ENOSPC) => break,
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(fs.free_block_count().unwrap(), 0);
        assert_eq!(f.len(), pos);

        let other = root.mknod(name(b"small"), VnodeType::Regular, 0).unwrap();
        assert_eq!(other.write_at(0, b"x", false).err(), Some(Errno::ENOSPC));

        root.unlink(name(b"hog")).unwrap();
        drop(f);
        let recovered = fs.free_block_count().unwrap();
        assert_eq!(recovered, initial);

        let (n, _) = other.write_at(0, b"fits now", false).unwrap();
        assert_eq!(n, 8);
        assert_eq!(
            fs.free_block_count().unwrap(),
            initial - other.stat().unwrap().blocks
        );
    }

    #[test]
    fn truncate_frees_blocks() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let initial = fs.free_block_count().unwrap();
        let f = root.mknod(name(b"t"), VnodeType::Regular, 0).unwrap();
        let data = [3u8; 3 * BSIZE];
        let _ = f.write_at(0, &data, false).unwrap();

        f.truncate().unwrap();
        assert_eq!(f.len(), 0);
        assert_eq!(fs.free_block_count().unwrap(), initial);
        let mut buf = [0u8; 4];
        assert_eq!(f.read_at(0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn special_files() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        let tty = root.mknod(name(b"tty"), VnodeType::CharDev, 0x0501).unwrap();
        let st = tty.stat().unwrap();
        assert_eq!(st.typ, VnodeType::CharDev);
        assert_eq!(st.rdev, 0x0501);

        let mut buf = [0u8; 4];
        assert_eq!(tty.read_at(0, &mut buf).err(), Some(Errno::ENODEV));
        assert_eq!(tty.write_at(0, &buf, false).err(), Some(Errno::ENODEV));

        // The device id survives a cache eviction.
        drop((tty, st));
        let again = root.lookup(name(b"tty")).unwrap();
        assert_eq!(again.devid(), 0x0501);
    }

    #[test]
    fn persistence_across_remount() {
        let disk = MemDisk::new(1, 128).unwrap();
        S5Fs::format(&*disk, 64).unwrap();
        {
            let fs = S5Fs::mount(disk.clone()).unwrap();
            let root = fs.root().unwrap();
            let d = root.mkdir(name(b"home")).unwrap();
            let f = d.mknod(name(b"note"), VnodeType::Regular, 0).unwrap();
            let _ = f.write_at(0, b"durable", false).unwrap();
            fs.sync().unwrap();
        }
        let fs = S5Fs::mount(disk).unwrap();
        let root = fs.root().unwrap();
        let d = root.lookup(name(b"home")).unwrap();
        let f = d.lookup(name(b"note")).unwrap();
        let mut buf = [0u8; 7];
        let _ = f.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"durable");
    }

    #[test]
    fn directory_length_stays_aligned() {
        let fs = mounted_fs(128);
        let root = fs.root().unwrap();
        for label in [&b"a"[..], b"b", b"c"] {
            let _ = root.mknod(name(label), VnodeType::Regular, 0).unwrap();
        }
        root.unlink(name(b"b")).unwrap();
        assert_eq!(root.stat().unwrap().size % DIRENT_SIZE, 0);

        // Removal swapped the last entry down; everything still resolves.
        assert!(root.lookup(name(b"a")).is_ok());
        assert!(root.lookup(name(b"c")).is_ok());
        assert_eq!(root.stat().unwrap().size, 4 * DIRENT_SIZE);
    }
}
