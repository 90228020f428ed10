//! Shared fixtures for the host test suite.

use alloc::sync::Arc;

use crate::bdev::MemDisk;
use crate::fs::s5fs::S5Fs;

pub(crate) const TEST_INODES: u32 = 64;

/// A formatted, mounted file system on a fresh RAM disk.
pub(crate) fn mounted_fs(nblocks: u32) -> Arc<S5Fs> {
    mounted_fs_with(nblocks, TEST_INODES)
}

pub(crate) fn mounted_fs_with(nblocks: u32, ninodes: u32) -> Arc<S5Fs> {
    let disk = MemDisk::new(1, nblocks).unwrap();
    S5Fs::format(&*disk, ninodes).unwrap();
    S5Fs::mount(disk).unwrap()
}

/// A process rooted in a fresh file system, over the host page table.
pub(crate) fn test_proc(nblocks: u32) -> crate::proc::Proc {
    let fs = mounted_fs(nblocks);
    let root: crate::fs::ArcVnode = fs.root().unwrap();
    crate::proc::Proc::new(root, crate::vm::FlatPageTable::new())
}
