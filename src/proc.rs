//! Processes, reduced to what the file system and VM care about: the
//! descriptor table, the working directory, and the address space.
//!
//! System calls take `&mut Proc` explicitly; on a real trap path the
//! per-CPU current-process cell supplies it.

use alloc::boxed::Box;

use crate::file::FdTable;
use crate::fs::ArcVnode;
use crate::vm::{PageTable, VmMap};

pub struct Proc {
    pub fds: FdTable,
    pub(crate) cwd: ArcVnode,
    pub(crate) root: ArcVnode,
    pub vmmap: VmMap,
}

impl Proc {
    /// The first process starts at the file system root.
    pub fn new(root: ArcVnode, pt: Box<dyn PageTable>) -> Proc {
        Proc {
            fds: FdTable::new(),
            cwd: root.clone(),
            root,
            vmmap: VmMap::new(pt),
        }
    }

    pub fn cwd(&self) -> &ArcVnode {
        &self.cwd
    }

    /// Forks this process's resources onto a fresh page table: open
    /// files are shared, the working directory carries over, and the
    /// address space clones copy-on-write.
    pub fn fork(&mut self, pt: Box<dyn PageTable>) -> Proc {
        Proc {
            fds: self.fds.clone_table(),
            cwd: self.cwd.clone(),
            root: self.root.clone(),
            vmmap: self.vmmap.clone_into(pt),
        }
    }
}
