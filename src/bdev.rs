//! Block devices.
//!
//! The kernel consumes a synchronous block-device interface: a read or a
//! write moves one block and may suspend the calling thread until the
//! transfer completes. Driver internals (queues, completion interrupts)
//! live below this trait.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::errno::{Errno, KResult};
use crate::lock::Spinlock;
use crate::page::Page;

pub trait BlockDevice: Send + Sync {
    /// Device id, reported through `stat`.
    fn id(&self) -> u32;

    /// Capacity in blocks.
    fn blocks(&self) -> u32;

    fn read_block(&self, blockno: u32, buf: &mut Page) -> KResult<()>;

    fn write_block(&self, blockno: u32, buf: &Page) -> KResult<()>;
}

/// RAM-backed block device.
///
/// Backs the file system in host tests and doubles as the reference
/// implementation of the `BlockDevice` contract.
pub struct MemDisk {
    id: u32,
    blocks: Spinlock<Vec<Box<Page>>>,
}

impl MemDisk {
    pub fn new(id: u32, nblocks: u32) -> KResult<Arc<Self>> {
        let mut blocks = Vec::new();
        for _ in 0..nblocks {
            blocks.push(Page::new_zeroed()?);
        }
        log::debug!("memdisk {}: {} blocks", id, nblocks);
        Ok(Arc::new(Self {
            id,
            blocks: Spinlock::new("memdisk", blocks),
        }))
    }
}

impl BlockDevice for MemDisk {
    fn id(&self) -> u32 {
        self.id
    }

    fn blocks(&self) -> u32 {
        self.blocks.lock().len() as u32
    }

    fn read_block(&self, blockno: u32, buf: &mut Page) -> KResult<()> {
        let blocks = self.blocks.lock();
        let src = blocks.get(blockno as usize).ok_or(Errno::EINVAL)?;
        buf.copy_from(src);
        Ok(())
    }

    fn write_block(&self, blockno: u32, buf: &Page) -> KResult<()> {
        let mut blocks = self.blocks.lock();
        let dst = blocks.get_mut(blockno as usize).ok_or(Errno::EINVAL)?;
        dst.copy_from(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() {
        let disk = MemDisk::new(1, 8).unwrap();
        let mut page = Page::new_zeroed().unwrap();
        page[0] = 0x5a;
        page[4095] = 0xa5;
        disk.write_block(3, &page).unwrap();

        let mut out = Page::new_zeroed().unwrap();
        disk.read_block(3, &mut out).unwrap();
        assert_eq!(out[0], 0x5a);
        assert_eq!(out[4095], 0xa5);
    }

    #[test]
    fn out_of_range() {
        let disk = MemDisk::new(1, 2).unwrap();
        let mut page = Page::new_zeroed().unwrap();
        assert_eq!(disk.read_block(2, &mut page), Err(Errno::EINVAL));
        assert_eq!(disk.write_block(9, &page), Err(Errno::EINVAL));
    }
}
