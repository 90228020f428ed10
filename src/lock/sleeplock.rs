//! Sleeping locks, held across disk I/O.

use core::cell::UnsafeCell;
use core::fmt;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Raw long-term lock.
///
/// A holder may suspend mid-I/O while other threads contend. On the
/// cooperative single-processor target contention resolves by yielding;
/// a multiprocessor port would park waiters on a wait channel here.
struct RawSleepLock {
    locked: AtomicBool,
}

impl RawSleepLock {
    const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    fn acquire(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Locks that may be held while the holder sleeps.
pub struct SleepLock<T> {
    name: &'static str,
    lock: RawSleepLock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `lock`.
unsafe impl<T: Send> Send for SleepLock<T> {}
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// Returns a new `SleepLock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            lock: RawSleepLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock and returns the lock guard.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        self.lock.acquire();
        SleepLockGuard { lock: self }
    }

    /// Returns a mutable reference to the inner data.
    /// The caller must ensure that accessing the pointer does not incur a
    /// race; usually the lock has been acquired and its guard forgotten.
    pub fn get_mut_raw(&self) -> *mut T {
        self.data.get()
    }

    /// Returns a mutable reference to the inner data without locking.
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: `&mut self` guarantees exclusive access.
        unsafe { &mut *self.data.get() }
    }

    /// Unlocks the lock.
    ///
    /// # Safety
    ///
    /// Use this only when the lock was acquired and `mem::forget` was
    /// applied to the guard.
    pub unsafe fn unlock(&self) {
        debug_assert!(self.lock.holding(), "unlock {}", self.name);
        self.lock.release();
    }

    /// Whether the lock is currently held by someone.
    pub fn holding(&self) -> bool {
        self.lock.holding()
    }
}

impl<T> fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SleepLock({})", self.name)
    }
}

pub struct SleepLockGuard<'s, T> {
    lock: &'s SleepLock<T>,
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the guard holds the lock and `&mut self` is exclusive.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.lock.release();
    }
}
