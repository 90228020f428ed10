//! File-system system calls.
//! Mostly argument checking and name resolution; the work happens in the
//! vnode operations and the open-file layer.

use crate::errno::{Errno, KResult};
use crate::fcntl::OpenFlags;
use crate::file::{File, Whence};
use crate::fs::namev::{namev_dir, namev_open};
use crate::fs::{DevId, DirEnt, Path, VnodeType};
use crate::proc::Proc;
use crate::stat::Stat;

impl Proc {
    pub fn do_open(&mut self, path: &Path, flags: OpenFlags) -> KResult<i32> {
        let readable = flags.readable()?;
        let writable = flags.writable()?;
        let node = namev_open(&self.root, &self.cwd, path, flags, VnodeType::Regular, 0)?;
        if node.vtype().is_dir() && writable {
            return Err(Errno::EISDIR);
        }
        if flags.contains(OpenFlags::O_TRUNC) && writable && node.vtype() == VnodeType::Regular {
            node.truncate()?;
        }
        let file = File::new(node, readable, writable, flags.contains(OpenFlags::O_APPEND));
        self.fds.alloc(file)
    }

    pub fn do_close(&mut self, fd: i32) -> KResult<()> {
        self.fds.close(fd)
    }

    pub fn do_read(&mut self, fd: i32, buf: &mut [u8]) -> KResult<usize> {
        self.fds.get(fd)?.read(buf)
    }

    pub fn do_write(&mut self, fd: i32, buf: &[u8]) -> KResult<usize> {
        self.fds.get(fd)?.write(buf)
    }

    pub fn do_lseek(&mut self, fd: i32, offset: i64, whence: Whence) -> KResult<u64> {
        self.fds.get(fd)?.lseek(offset, whence)
    }

    pub fn do_dup(&mut self, fd: i32) -> KResult<i32> {
        let file = self.fds.get(fd)?;
        self.fds.alloc(file)
    }

    /// Aliases `new` to `old`'s open file, closing `new` first if it was
    /// open. Duplicating a descriptor onto itself does nothing.
    pub fn do_dup2(&mut self, old: i32, new: i32) -> KResult<i32> {
        let file = self.fds.get(old)?;
        if old == new {
            return Ok(new);
        }
        self.fds.set(new, file)?;
        Ok(new)
    }

    pub fn do_mknod(&mut self, path: &Path, vtype: VnodeType, devid: DevId) -> KResult<()> {
        if !matches!(vtype, VnodeType::Regular | VnodeType::CharDev | VnodeType::BlockDev) {
            return Err(Errno::EINVAL);
        }
        let flags = OpenFlags::O_CREAT | OpenFlags::O_EXCL;
        namev_open(&self.root, &self.cwd, path, flags, vtype, devid).map(|_| ())
    }

    pub fn do_mkdir(&mut self, path: &Path) -> KResult<()> {
        let (dir, name) = namev_dir(&self.root, &self.cwd, path)?;
        dir.mkdir(name).map(|_| ())
    }

    pub fn do_rmdir(&mut self, path: &Path) -> KResult<()> {
        let (dir, name) = namev_dir(&self.root, &self.cwd, path)?;
        dir.rmdir(name)
    }

    pub fn do_unlink(&mut self, path: &Path) -> KResult<()> {
        let (dir, name) = namev_dir(&self.root, &self.cwd, path)?;
        dir.unlink(name)
    }

    /// Creates `newpath` as another name for the inode at `oldpath`.
    pub fn do_link(&mut self, oldpath: &Path, newpath: &Path) -> KResult<()> {
        let node = namev_open(
            &self.root,
            &self.cwd,
            oldpath,
            OpenFlags::O_RDONLY,
            VnodeType::Regular,
            0,
        )?;
        let (dir, name) = namev_dir(&self.root, &self.cwd, newpath)?;
        dir.link(name, &node)
    }

    pub fn do_rename(&mut self, from: &Path, to: &Path) -> KResult<()> {
        let (fdir, fname) = namev_dir(&self.root, &self.cwd, from)?;
        let (tdir, tname) = namev_dir(&self.root, &self.cwd, to)?;
        fdir.rename(fname, &tdir, tname)
    }

    /// Swaps the working directory; the reference to the old one drops
    /// with the assignment.
    pub fn do_chdir(&mut self, path: &Path) -> KResult<()> {
        let node = namev_open(
            &self.root,
            &self.cwd,
            path,
            OpenFlags::O_RDONLY,
            VnodeType::Regular,
            0,
        )?;
        if !node.vtype().is_dir() {
            return Err(Errno::ENOTDIR);
        }
        self.cwd = node;
        Ok(())
    }

    pub fn do_stat(&mut self, path: &Path) -> KResult<Stat> {
        let node = namev_open(
            &self.root,
            &self.cwd,
            path,
            OpenFlags::O_RDONLY,
            VnodeType::Regular,
            0,
        )?;
        node.stat()
    }

    /// Returns the next directory record of `fd`, or `None` at the end.
    /// The descriptor's position advances by the on-disk size the file
    /// system reports; the record handed back has a fixed shape.
    pub fn do_getdents(&mut self, fd: i32) -> KResult<Option<DirEnt>> {
        let file = self.fds.get(fd)?;
        if !file.readable() {
            return Err(Errno::EBADF);
        }
        file.readdir()
    }
}
