//! Page frames.
//!
//! A page frame is one cached page belonging to exactly one memory object
//! at one page index. Its lock serializes I/O on the page and is held
//! from `MemObj::get_pframe` until the guard drops; a thread filling the
//! frame from disk may suspend while holding it.
//!
//! `PFrameGuard` is the only way code outside this module touches frame
//! contents: it owns a reference to the frame and carries the held lock,
//! releasing it on drop.

use core::mem;

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::errno::KResult;
use crate::lock::SleepLock;
use crate::page::Page;

pub struct PFrame {
    pageno: u64,
    inner: SleepLock<PFrameInner>,
}

struct PFrameInner {
    /// Has the frame been filled by its memory object?
    valid: bool,
    dirty: bool,
    data: Box<Page>,
}

impl PFrame {
    pub(crate) fn new(pageno: u64) -> KResult<Arc<Self>> {
        Ok(Arc::new(Self {
            pageno,
            inner: SleepLock::new(
                "pframe",
                PFrameInner {
                    valid: false,
                    dirty: false,
                    data: Page::new_zeroed()?,
                },
            ),
        }))
    }

    pub fn pageno(&self) -> u64 {
        self.pageno
    }
}

/// A locked page frame.
///
/// # Safety
///
/// `frame.inner` is locked for as long as the guard lives.
pub struct PFrameGuard {
    frame: Arc<PFrame>,
}

impl PFrameGuard {
    /// Locks `frame` and wraps it. The guard releases the lock on drop.
    pub(crate) fn lock(frame: Arc<PFrame>) -> Self {
        mem::forget(frame.inner.lock());
        Self { frame }
    }

    fn inner(&self) -> &PFrameInner {
        // SAFETY: self.frame.inner is locked.
        unsafe { &*self.frame.inner.get_mut_raw() }
    }

    fn inner_mut(&mut self) -> &mut PFrameInner {
        // SAFETY: self.frame.inner is locked and `&mut self` is exclusive.
        unsafe { &mut *self.frame.inner.get_mut_raw() }
    }

    pub fn pageno(&self) -> u64 {
        self.frame.pageno
    }

    pub fn data(&self) -> &Page {
        &self.inner().data
    }

    pub fn data_mut(&mut self) -> &mut Page {
        &mut self.inner_mut().data
    }

    pub fn is_dirty(&self) -> bool {
        self.inner().dirty
    }

    pub fn set_dirty(&mut self) {
        self.inner_mut().dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.inner_mut().dirty = false;
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.inner().valid
    }

    pub(crate) fn mark_valid(&mut self) {
        self.inner_mut().valid = true;
    }

    pub(crate) fn frame(&self) -> &Arc<PFrame> {
        &self.frame
    }
}

impl Drop for PFrameGuard {
    fn drop(&mut self) {
        // SAFETY: the guard was constructed by acquiring the lock and
        // forgetting the lock guard.
        unsafe { self.frame.inner.unlock() };
    }
}
