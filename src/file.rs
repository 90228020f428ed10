//! Open files and the per-process descriptor table.
//!
//! A `File` pairs a vnode with open-mode flags and the current position.
//! Duplicated descriptors share one `File`, and with it the position.

use array_macro::array;

use alloc::sync::Arc;

use crate::errno::{Errno, KResult};
use crate::fs::ArcVnode;
use crate::lock::Spinlock;
use crate::param::NOFILE;
use crate::stat::Stat;

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Whence {
    Set,
    Cur,
    End,
}

pub struct File {
    pub node: ArcVnode,
    readable: bool,
    writable: bool,
    append: bool,
    off: Spinlock<u64>,
}

pub type RcFile = Arc<File>;

impl File {
    pub fn new(node: ArcVnode, readable: bool, writable: bool, append: bool) -> RcFile {
        Arc::new(Self {
            node,
            readable,
            writable,
            append,
            off: Spinlock::new("file off", 0),
        })
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn pos(&self) -> u64 {
        *self.off.lock()
    }

    /// Reads at the current position, advancing it by the bytes read.
    pub fn read(&self, buf: &mut [u8]) -> KResult<usize> {
        if !self.readable {
            return Err(Errno::EBADF);
        }
        let mut off = self.off.lock();
        let n = self.node.read_at(*off, buf)?;
        *off += n as u64;
        Ok(n)
    }

    /// Writes at the current position (or the end, in append mode) and
    /// leaves the position after the written bytes.
    pub fn write(&self, buf: &[u8]) -> KResult<usize> {
        if !self.writable {
            return Err(Errno::EBADF);
        }
        let mut off = self.off.lock();
        let at = if self.append { 0 } else { *off };
        let (n, end) = self.node.write_at(at, buf, self.append)?;
        *off = end;
        Ok(n)
    }

    pub fn lseek(&self, offset: i64, whence: Whence) -> KResult<u64> {
        let mut off = self.off.lock();
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => *off as i64,
            Whence::End => self.node.len() as i64,
        };
        let new = base.checked_add(offset).ok_or(Errno::EINVAL)?;
        if new < 0 {
            return Err(Errno::EINVAL);
        }
        *off = new as u64;
        Ok(new as u64)
    }

    pub fn stat(&self) -> KResult<Stat> {
        self.node.stat()
    }

    /// Next directory record, advancing the position by the on-disk
    /// entry size the file system reports.
    pub fn readdir(&self) -> KResult<Option<crate::fs::DirEnt>> {
        let mut off = self.off.lock();
        match self.node.readdir(*off)? {
            Some((de, advance)) => {
                *off += advance;
                Ok(Some(de))
            }
            None => Ok(None),
        }
    }
}

/// Per-process table mapping small integers to open files.
pub struct FdTable {
    files: [Option<RcFile>; NOFILE],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            files: array![_ => None; NOFILE],
        }
    }

    pub fn get(&self, fd: i32) -> KResult<RcFile> {
        if fd < 0 || fd as usize >= NOFILE {
            return Err(Errno::EBADF);
        }
        self.files[fd as usize].clone().ok_or(Errno::EBADF)
    }

    /// Installs `file` at the lowest free descriptor.
    pub fn alloc(&mut self, file: RcFile) -> KResult<i32> {
        for (fd, slot) in self.files.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(fd as i32);
            }
        }
        Err(Errno::EMFILE)
    }

    /// Installs `file` at exactly `fd`, closing whatever was there.
    pub fn set(&mut self, fd: i32, file: RcFile) -> KResult<()> {
        if fd < 0 || fd as usize >= NOFILE {
            return Err(Errno::EBADF);
        }
        self.files[fd as usize] = Some(file);
        Ok(())
    }

    pub fn close(&mut self, fd: i32) -> KResult<()> {
        if fd < 0 || fd as usize >= NOFILE {
            return Err(Errno::EBADF);
        }
        self.files[fd as usize].take().map(|_| ()).ok_or(Errno::EBADF)
    }

    /// The child of a fork shares every open file, positions included.
    pub fn clone_table(&self) -> Self {
        Self {
            files: array![i => self.files[i].clone(); NOFILE],
        }
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
