use cstr_core::CStr;

use crate::errno::{Errno, KResult};
use crate::param::{MAXPATH, NAME_LEN};

/// One validated path component.
#[derive(PartialEq, Debug)]
#[repr(transparent)]
pub struct FileName {
    // Invariant:
    // - Nonempty, contains no NUL and no '/'.
    // - Strictly shorter than NAME_LEN, leaving room for the on-disk
    //   terminator.
    inner: [u8],
}

impl FileName {
    pub fn new(bytes: &[u8]) -> KResult<&Self> {
        if bytes.is_empty() {
            return Err(Errno::EINVAL);
        }
        if bytes.len() >= NAME_LEN {
            return Err(Errno::ENAMETOOLONG);
        }
        if bytes.iter().any(|ch| *ch == 0 || *ch == b'/') {
            return Err(Errno::EINVAL);
        }
        // SAFETY: `&FileName` is layout-compatible with `[u8]` because of
        // its attribute `#[repr(transparent)]`, and the checks above
        // establish the invariant.
        Ok(unsafe { &*(bytes as *const [u8] as *const Self) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    pub fn is_dot(&self) -> bool {
        &self.inner == b"."
    }

    pub fn is_dotdot(&self) -> bool {
        &self.inner == b".."
    }
}

#[repr(transparent)]
pub struct Path {
    // Invariant: the slice contains no NUL characters.
    inner: [u8],
}

impl Path {
    pub fn new(bytes: &[u8]) -> KResult<&Self> {
        if bytes.len() > MAXPATH {
            return Err(Errno::ENAMETOOLONG);
        }
        if bytes.contains(&0) {
            return Err(Errno::EINVAL);
        }
        // SAFETY: `&Path` is layout-compatible with `[u8]` because of its
        // attribute `#[repr(transparent)]`, and the slice was checked for
        // NUL characters.
        Ok(unsafe { Self::from_bytes(bytes) })
    }

    pub fn from_cstr(cstr: &CStr) -> KResult<&Self> {
        Self::new(cstr.to_bytes())
    }

    /// # Safety
    ///
    /// `bytes` must not contain any NUL bytes.
    unsafe fn from_bytes(bytes: &[u8]) -> &Self {
        &*(bytes as *const [u8] as *const Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// Returns `Some((path, name))` where,
    ///  - `name` is the next path element from `self`, and
    ///  - `path` is the remaining path.
    ///
    /// The returned path has no leading slashes, so the caller can check
    /// `path.is_empty()` to see if the name is the last one. Component
    /// validation (length, charset) is left to `FileName::new`.
    ///
    /// If there is no name to remove, returns `None`.
    pub fn skipelem(&self) -> Option<(&Self, &[u8])> {
        let mut bytes = &self.inner;

        let name_start = bytes.iter().position(|ch| *ch != b'/')?;
        bytes = &bytes[name_start..];

        let len = bytes
            .iter()
            .position(|ch| *ch == b'/')
            .unwrap_or_else(|| bytes.len());
        let name = &bytes[..len];

        bytes = &bytes[len..];

        let next_start = bytes
            .iter()
            .position(|ch| *ch != b'/')
            .unwrap_or_else(|| bytes.len());

        // SAFETY: `bytes` is a subslice of `self.inner`, which contains no
        // NUL characters.
        let path = unsafe { Self::from_bytes(&bytes[next_start..]) };
        Some((path, name))
    }

    /// Returns `true` if `Path` begins with `'/'`.
    pub fn is_absolute(&self) -> bool {
        !self.inner.is_empty() && self.inner[0] == b'/'
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// A trailing separator constrains the last component to resolve to a
    /// directory.
    pub fn has_trailing_slash(&self) -> bool {
        self.inner.last() == Some(&b'/')
    }
}
