/// Page size, which is also the file system block size.
pub const PAGE_SIZE: usize = 4096;

/// File system block size.
pub const BSIZE: usize = PAGE_SIZE;

/// Direct block slots in an on-disk inode.
pub const NDIRECT: usize = 28;

/// Block numbers held by one indirect block.
pub const NINDIRECT: usize = BSIZE / core::mem::size_of::<u32>();

/// Largest file, in blocks.
pub const MAXBLOCKS: usize = NDIRECT + NINDIRECT;

/// Largest file, in bytes.
pub const MAXFILE: u64 = (MAXBLOCKS * BSIZE) as u64;

/// Directory entry name field, including the NUL terminator.
pub const NAME_LEN: usize = 28;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Maximum file path name.
pub const MAXPATH: usize = 128;

/// Lowest user-mappable virtual frame number.
pub const USER_LOW_PAGE: usize = 0x0000_0400;

/// One past the highest user-mappable virtual frame number.
pub const USER_HIGH_PAGE: usize = 0x0008_0000;
