//! Memory-mapping system calls.

use crate::errno::{Errno, KResult};
use crate::param::{PAGE_SIZE, USER_HIGH_PAGE, USER_LOW_PAGE};
use crate::proc::Proc;
use crate::vm::{FindDir, MapFlags, Prot};

fn pages_spanning(len: usize) -> KResult<usize> {
    Ok(len.checked_add(PAGE_SIZE - 1).ok_or(Errno::EINVAL)? / PAGE_SIZE)
}

impl Proc {
    /// Maps `len` bytes at `addr` (0 lets the kernel choose, searching
    /// down from the top of user space). Under `MAP_ANON` the descriptor
    /// argument is ignored entirely; otherwise it must name a readable
    /// file, writable too for a shared writable mapping, and the vnode's
    /// mmap operation decides whether its type maps at all (`EISDIR` for
    /// directories, `ENODEV` for specials). Returns the chosen address.
    pub fn do_mmap(
        &mut self,
        addr: usize,
        len: usize,
        prot: Prot,
        flags: MapFlags,
        fd: i32,
        off: u64,
    ) -> KResult<usize> {
        if len == 0 || addr % PAGE_SIZE != 0 || off % PAGE_SIZE as u64 != 0 {
            return Err(Errno::EINVAL);
        }
        let file = if flags.contains(MapFlags::ANON) {
            None
        } else {
            let file = self.fds.get(fd)?;
            if !file.readable() {
                return Err(Errno::EACCES);
            }
            if flags.contains(MapFlags::SHARED)
                && prot.contains(Prot::WRITE)
                && !file.writable()
            {
                return Err(Errno::EACCES);
            }
            Some(file.node.clone())
        };
        let start = self.vmmap.map(
            file,
            addr / PAGE_SIZE,
            pages_spanning(len)?,
            prot,
            flags,
            off / PAGE_SIZE as u64,
            FindDir::HiLo,
        )?;
        Ok(start * PAGE_SIZE)
    }

    pub fn do_munmap(&mut self, addr: usize, len: usize) -> KResult<()> {
        if len == 0 || addr % PAGE_SIZE != 0 {
            return Err(Errno::EINVAL);
        }
        let lopage = addr / PAGE_SIZE;
        let npages = pages_spanning(len)?;
        if lopage < USER_LOW_PAGE || lopage + npages > USER_HIGH_PAGE {
            return Err(Errno::EINVAL);
        }
        self.vmmap.remove(lopage, npages)
    }
}
