//! Memory objects.
//!
//! A memory object is a container of page frames, polymorphic over what
//! backs the pages:
//!
//! * block device: pages are disk blocks, filled by `read_block` and
//!   written back by `write_block`;
//! * anonymous: pages are zero-filled on first touch and have no backing
//!   store;
//! * file: paging is delegated to the owning vnode through the `Pager`
//!   callbacks, so the file system decides which cache a page really
//!   lives in;
//! * shadow: a copy-on-write overlay whose reads fall through to a base
//!   object and whose writes materialize a private copy.
//!
//! At most one frame exists per (object, page index). A frame's lock is
//! held from `get_pframe` until its guard drops. Reference counting is
//! `Arc`; the destructor flushes dirty frames and releases them all.

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use crate::bdev::BlockDevice;
use crate::errno::KResult;
use crate::lock::Spinlock;
use crate::page::Page;
use crate::pframe::{PFrame, PFrameGuard};

/// The file system's paging callbacks, implemented by a vnode.
///
/// The `File` variant holds its pager weakly: the vnode owns its content
/// object, and the back edge must not keep the vnode alive. Whoever maps
/// a file keeps the vnode alive separately.
pub trait Pager: Send + Sync {
    /// Hands out the frame backing one page of the file, wherever the
    /// file system keeps it.
    fn get_page(&self, pageno: u64, for_write: bool) -> KResult<PFrameGuard>;

    /// Fills a page cached in the file's own object.
    fn fill_page(&self, pageno: u64, data: &mut Page) -> KResult<()>;

    /// Writes back a page cached in the file's own object.
    fn flush_page(&self, pageno: u64, data: &Page) -> KResult<()>;
}

enum MObjKind {
    Bdev(Arc<dyn BlockDevice>),
    Anon,
    File { pager: Weak<dyn Pager> },
    Shadow { base: Spinlock<Arc<MemObj>> },
}

pub struct MemObj {
    kind: MObjKind,
    frames: Spinlock<BTreeMap<u64, Arc<PFrame>>>,
}

impl MemObj {
    fn new(kind: MObjKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            frames: Spinlock::new("mobj", BTreeMap::new()),
        })
    }

    /// The page cache of a block device; page index is block number.
    pub fn new_bdev(dev: Arc<dyn BlockDevice>) -> Arc<Self> {
        Self::new(MObjKind::Bdev(dev))
    }

    pub fn new_anon() -> Arc<Self> {
        Self::new(MObjKind::Anon)
    }

    pub fn new_file(pager: Weak<dyn Pager>) -> Arc<Self> {
        Self::new(MObjKind::File { pager })
    }

    pub fn new_shadow(base: Arc<MemObj>) -> Arc<Self> {
        Self::new(MObjKind::Shadow {
            base: Spinlock::new("shadow base", base),
        })
    }

    pub fn is_shadow(&self) -> bool {
        matches!(self.kind, MObjKind::Shadow { .. })
    }

    fn shadow_base(&self) -> Arc<MemObj> {
        match &self.kind {
            MObjKind::Shadow { base } => base.lock().clone(),
            _ => panic!("shadow_base: not a shadow"),
        }
    }

    fn pager(pager: &Weak<dyn Pager>) -> Arc<dyn Pager> {
        pager.upgrade().expect("mobj: file pager is gone")
    }

    /// Returns the locked frame for `pageno`, creating and filling it if
    /// it is not resident. `for_write` marks the frame dirty.
    pub fn get_pframe(&self, pageno: u64, for_write: bool) -> KResult<PFrameGuard> {
        match &self.kind {
            MObjKind::File { pager } => Self::pager(pager).get_page(pageno, for_write),
            MObjKind::Shadow { .. } => self.shadow_get_pframe(pageno, for_write),
            _ => self.default_get_pframe(pageno, for_write),
        }
    }

    /// The fill-from-own-cache path: look up or install a frame in this
    /// object and fill it through the variant. Kinds other than `File`
    /// use this directly; the file system uses it for sparse file pages.
    pub fn default_get_pframe(
        &self,
        pageno: u64,
        for_write: bool,
    ) -> KResult<PFrameGuard> {
        let mut guard = self.lookup_or_insert(pageno)?;
        if !guard.is_valid() {
            if let Err(e) = self.fill(pageno, guard.data_mut()) {
                self.free_pframe(guard);
                return Err(e);
            }
            guard.mark_valid();
        }
        if for_write {
            guard.set_dirty();
        }
        Ok(guard)
    }

    /// Returns the resident frame for `pageno`, locked, or `None`.
    pub fn find_pframe(&self, pageno: u64) -> Option<PFrameGuard> {
        let frame = self.frames.lock().get(&pageno).cloned()?;
        let guard = PFrameGuard::lock(frame);
        if !guard.is_valid() {
            return None;
        }
        Some(guard)
    }

    /// Evicts a frame. The caller holds the frame's lock through the
    /// guard; the frame's memory is released once the guard drops.
    pub fn free_pframe(&self, guard: PFrameGuard) {
        let mut frames = self.frames.lock();
        if let Some(resident) = frames.get(&guard.pageno()) {
            if Arc::ptr_eq(resident, guard.frame()) {
                let _ = frames.remove(&guard.pageno());
            }
        }
    }

    /// Drops every resident frame. Outstanding guards keep their frames
    /// alive until they release them.
    pub fn evict_all(&self) {
        self.frames.lock().clear();
    }

    /// Writes back every dirty resident frame and clears its dirty flag.
    pub fn flush(&self) -> KResult<()> {
        let frames: Vec<Arc<PFrame>> = self.frames.lock().values().cloned().collect();
        for frame in frames {
            let mut guard = PFrameGuard::lock(frame);
            if guard.is_valid() && guard.is_dirty() {
                self.flush_frame(guard.pageno(), guard.data())?;
                guard.clear_dirty();
            }
        }
        Ok(())
    }

    fn lookup_or_insert(&self, pageno: u64) -> KResult<PFrameGuard> {
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.get(&pageno) {
            let frame = frame.clone();
            drop(frames);
            return Ok(PFrameGuard::lock(frame));
        }
        let frame = PFrame::new(pageno)?;
        let _ = frames.insert(pageno, frame.clone());
        drop(frames);
        Ok(PFrameGuard::lock(frame))
    }

    fn fill(&self, pageno: u64, data: &mut Page) -> KResult<()> {
        match &self.kind {
            MObjKind::Bdev(dev) => dev.read_block(pageno as u32, data),
            MObjKind::Anon => {
                data.fill(0);
                Ok(())
            }
            MObjKind::File { pager } => Self::pager(pager).fill_page(pageno, data),
            MObjKind::Shadow { .. } => panic!("fill: shadow frames are filled by copy-up"),
        }
    }

    fn flush_frame(&self, pageno: u64, data: &Page) -> KResult<()> {
        match &self.kind {
            MObjKind::Bdev(dev) => dev.write_block(pageno as u32, data),
            // The pager may already be gone during vnode teardown; its
            // sparse pages have no disk home anyway.
            MObjKind::File { pager } => match pager.upgrade() {
                Some(p) => p.flush_page(pageno, data),
                None => Ok(()),
            },
            MObjKind::Anon | MObjKind::Shadow { .. } => Ok(()),
        }
    }

    /// Shadow paging. A read returns the first copy found walking down
    /// the chain, without copying. A write installs a private copy in
    /// this shadow, seeded from whatever the chain below shows; once a
    /// private copy exists every later access through this shadow sees
    /// it.
    fn shadow_get_pframe(&self, pageno: u64, for_write: bool) -> KResult<PFrameGuard> {
        if let Some(mut guard) = self.find_pframe(pageno) {
            if for_write {
                guard.set_dirty();
            }
            return Ok(guard);
        }
        if !for_write {
            return self.chain_find(pageno);
        }

        // Copy-up. The source frame is obtained before this shadow's new
        // frame so the bottom object's locks are never taken while a
        // half-built frame is held.
        let src = self.chain_find(pageno)?;
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.get(&pageno) {
            // Lost a race with another copy-up through this shadow.
            let frame = frame.clone();
            drop(frames);
            drop(src);
            let mut guard = PFrameGuard::lock(frame);
            guard.set_dirty();
            return Ok(guard);
        }
        let frame = PFrame::new(pageno)?;
        let mut guard = PFrameGuard::lock(frame.clone());
        let _ = frames.insert(pageno, frame);
        drop(frames);
        guard.data_mut().copy_from(src.data());
        drop(src);
        guard.mark_valid();
        guard.set_dirty();
        Ok(guard)
    }

    /// Walks the chain below this shadow and returns the first resident
    /// copy, falling through to the bottom object's own paging.
    fn chain_find(&self, pageno: u64) -> KResult<PFrameGuard> {
        let mut obj = self.shadow_base();
        loop {
            if !obj.is_shadow() {
                return obj.get_pframe(pageno, false);
            }
            if let Some(guard) = obj.find_pframe(pageno) {
                return Ok(guard);
            }
            let next = obj.shadow_base();
            obj = next;
        }
    }

    /// Merges this shadow with its immediate base while the base is
    /// another shadow with no referrer besides this chain. Pages resident
    /// here win; pages only in the base migrate up. Bounds the chains
    /// built by repeated forking.
    pub fn shadow_collapse(&self) {
        let base_slot = match &self.kind {
            MObjKind::Shadow { base } => base,
            _ => return,
        };
        loop {
            let base = base_slot.lock().clone();
            // Two strong references mean the chain slot plus the clone
            // taken just above; anyone else holding the base forbids the
            // merge.
            if !base.is_shadow() || Arc::strong_count(&base) != 2 {
                return;
            }
            let migrated: Vec<(u64, Arc<PFrame>)> = base
                .frames
                .lock()
                .iter()
                .map(|(pageno, frame)| (*pageno, frame.clone()))
                .collect();
            let mut mine = self.frames.lock();
            for (pageno, frame) in migrated {
                let _ = mine.entry(pageno).or_insert(frame);
            }
            drop(mine);
            let below = base.shadow_base();
            log::trace!("shadow collapse: chain shortened");
            *base_slot.lock() = below;
            // `base` drops here, releasing the merged shadow.
        }
    }
}

impl Drop for MemObj {
    fn drop(&mut self) {
        if self.flush().is_err() {
            log::warn!("mobj: writeback failed during teardown");
        }
    }
}
