//! The lock module.
//!
//! Two mutex flavors cover the kernel's critical sections. `Spinlock`
//! protects short, non-blocking state (free lists, resident-frame maps,
//! file offsets). `SleepLock` is held across I/O and supports the
//! guard-forget idiom, which lets an owning wrapper type carry a held
//! lock across a return boundary and release it from its `Drop`.

mod sleeplock;
mod spinlock;

pub use sleeplock::{SleepLock, SleepLockGuard};
pub use spinlock::{Spinlock, SpinlockGuard};
