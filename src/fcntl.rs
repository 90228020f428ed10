use bitflags::bitflags;

use crate::errno::{Errno, KResult};

bitflags! {
    pub struct OpenFlags: u32 {
        const O_RDONLY = 0;
        const O_WRONLY = 0x1;
        const O_RDWR = 0x2;
        const O_CREAT = 0x100;
        const O_TRUNC = 0x200;
        const O_APPEND = 0x400;
        const O_EXCL = 0x800;
    }
}

const O_ACCMODE: u32 = 0x3;

impl OpenFlags {
    /// The two-bit access mode, checked for validity.
    fn accmode(self) -> KResult<u32> {
        let mode = self.bits() & O_ACCMODE;
        if mode == O_ACCMODE {
            return Err(Errno::EINVAL);
        }
        Ok(mode)
    }

    pub fn readable(self) -> KResult<bool> {
        Ok(self.accmode()? != Self::O_WRONLY.bits())
    }

    pub fn writable(self) -> KResult<bool> {
        Ok(self.accmode()? != Self::O_RDONLY.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_modes() {
        assert!(OpenFlags::O_RDONLY.readable().unwrap());
        assert!(!OpenFlags::O_RDONLY.writable().unwrap());
        assert!(!OpenFlags::O_WRONLY.readable().unwrap());
        assert!(OpenFlags::O_WRONLY.writable().unwrap());
        assert!(OpenFlags::O_RDWR.readable().unwrap());
        assert!(OpenFlags::O_RDWR.writable().unwrap());

        let bad = OpenFlags::from_bits_truncate(0x3);
        assert_eq!(bad.readable(), Err(Errno::EINVAL));
    }
}
