use core::ops::{Deref, DerefMut};

use alloc::alloc::{alloc_zeroed, Layout};
use alloc::boxed::Box;

use crate::errno::{Errno, KResult};
use crate::param::PAGE_SIZE;

/// Page type.
#[repr(align(4096))]
pub struct Page {
    inner: [u8; PAGE_SIZE],
}

impl Page {
    /// Allocates one zeroed page. This is the kernel's page-granular
    /// allocation seam; exhaustion surfaces as `ENOMEM` rather than an
    /// abort.
    pub fn new_zeroed() -> KResult<Box<Page>> {
        let layout = Layout::new::<Page>();
        // SAFETY: `Page` has non-zero size and the all-zero bit pattern is a
        // valid `Page`. The pointer is checked before it is adopted.
        let ptr = unsafe { alloc_zeroed(layout) } as *mut Page;
        if ptr.is_null() {
            return Err(Errno::ENOMEM);
        }
        // SAFETY: `ptr` was just allocated with the layout of `Page`.
        Ok(unsafe { Box::from_raw(ptr) })
    }

    pub fn copy_from(&mut self, other: &Page) {
        self.inner.copy_from_slice(&other.inner);
    }
}

impl Deref for Page {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Page {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
