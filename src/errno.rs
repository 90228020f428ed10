//! Kernel error values.
//!
//! Every fallible operation in the kernel returns `KResult`, whose error
//! side is a small integer errno drawn from the POSIX-compatible subset
//! below. The syscall boundary negates the value; inside the kernel the
//! variants are passed around as-is and propagated with `?`.

use core::fmt;

/// Result type used throughout the kernel.
pub type KResult<T> = Result<T, Errno>;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted.
    EPERM = 1,
    /// No such file or directory.
    ENOENT = 2,
    /// Interrupted call (cancelled sleep).
    EINTR = 4,
    /// Bad file descriptor.
    EBADF = 9,
    /// Out of memory.
    ENOMEM = 12,
    /// Permission denied.
    EACCES = 13,
    /// File exists.
    EEXIST = 17,
    /// No such device.
    ENODEV = 19,
    /// Not a directory.
    ENOTDIR = 20,
    /// Is a directory.
    EISDIR = 21,
    /// Invalid argument.
    EINVAL = 22,
    /// Too many open files.
    EMFILE = 24,
    /// File too large.
    EFBIG = 27,
    /// No space left on device.
    ENOSPC = 28,
    /// File name too long.
    ENAMETOOLONG = 36,
    /// Directory not empty.
    ENOTEMPTY = 39,
    /// Operation not supported.
    ENOTSUP = 95,
}

impl Errno {
    /// The negated value returned through the syscall ABI.
    pub fn as_neg(self) -> i32 {
        -(self as i32)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Converts a `KResult` into the `isize` syscall convention: the value on
/// success, the negated errno on failure.
pub fn kresult_to_ret(r: KResult<usize>) -> isize {
    match r {
        Ok(v) => v as isize,
        Err(e) => e.as_neg() as isize,
    }
}
