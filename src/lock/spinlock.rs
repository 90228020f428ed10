//! Spin locks.

use core::fmt;

/// Mutual exclusion lock that busy waits (spins).
///
/// On the cooperative single-processor target a held spinlock implies the
/// holder runs until release, so waiters never actually spin; the type
/// exists to keep every critical section explicit and to stay correct on
/// a preemptive or multiprocessor port.
pub struct Spinlock<T> {
    name: &'static str,
    inner: spin::Mutex<T>,
}

/// Guards of `Spinlock<T>`.
pub type SpinlockGuard<'s, T> = spin::MutexGuard<'s, T>;

impl<T> Spinlock<T> {
    /// Returns a new `Spinlock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            inner: spin::Mutex::new(data),
        }
    }

    /// Acquires the lock and returns the guard.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        self.inner.lock()
    }

    /// Returns a mutable reference to the inner data without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T> fmt::Debug for Spinlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spinlock({})", self.name)
    }
}
