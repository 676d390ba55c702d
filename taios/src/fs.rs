//! Filesystem abstraction.
//!
//! The kernel core never parses a filesystem itself. Program loaders reach
//! files through the [`traits::FileSystem`] interface: `open` a path, `stat`
//! its size, read it block by block at any position, and drop the handle to
//! close it. [`MemFs`] is a flat, in-memory filesystem the kernel can boot
//! from without a disk.

use crate::KernelError;
use abyss::addressing::PAGE_SIZE;
use std::{collections::BTreeMap, sync::Arc};

/// Defines traits for file system operations.
pub mod traits {
    use super::FileBlockNumber;
    use crate::KernelError;
    use abyss::addressing::PAGE_SIZE;

    /// Trait representing a filesystem.
    pub trait FileSystem {
        /// Opens the regular file at `path`.
        ///
        /// # Returns
        /// - `Ok(RegularFile)`: A handle to the file.
        /// - `Err(KernelError::NoSuchEntry)`: If nothing lives at `path`.
        fn open(&self, path: &str) -> Result<super::RegularFile, KernelError>;
    }

    /// Trait representing a regular file in the filesystem.
    pub trait RegularFile {
        /// Returns the size of the file in bytes.
        fn size(&self) -> usize;

        /// Reads one block of the file.
        ///
        /// # Parameters
        /// - `fba`: The `FileBlockNumber` which to read.
        /// - `buf`: A mutable array where the block content will be stored.
        ///   Bytes past the end of the file read as zero.
        ///
        /// # Returns
        /// - `Ok(true)`: If the block holds file data.
        /// - `Ok(false)`: If the block lies past the end of the file.
        /// - `Err(Error)`: An error occured while the read operation.
        fn read(&self, fba: FileBlockNumber, buf: &mut [u8; PAGE_SIZE])
        -> Result<bool, KernelError>;
    }
}

/// Index of a [`PAGE_SIZE`]-byte block within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileBlockNumber(pub usize);

impl FileBlockNumber {
    /// The block that holds byte `offset`.
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset / PAGE_SIZE)
    }

    /// Byte offset of the block's first byte.
    pub const fn into_offset(self) -> usize {
        self.0 * PAGE_SIZE
    }
}

/// A handle to an open regular file.
///
/// Dropping the last clone closes the file.
#[derive(Clone)]
pub struct RegularFile(pub Arc<dyn traits::RegularFile>);

impl RegularFile {
    /// Wraps an implementation of [`traits::RegularFile`] in a handle.
    pub fn new(r: impl traits::RegularFile + 'static) -> Self {
        Self(Arc::new(r))
    }

    /// Returns the size of the file in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// Reads data from the file, starting at `position`, into `buf`.
    ///
    /// # Returns
    /// - `Ok(usize)`: The number of bytes read. Short only at the end of the
    ///   file.
    /// - `Err(Error)`: An error if the read operation fails.
    pub fn read(&self, mut position: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
        let mut bounce_buffer = Box::new([0; PAGE_SIZE]);
        let max_read = self
            .size()
            .min(position.saturating_add(buf.len()))
            .saturating_sub(position);
        let mut read_bytes = 0;
        while read_bytes < max_read {
            let block = FileBlockNumber::from_offset(position);
            if !self.0.read(block, &mut bounce_buffer)? {
                return Err(KernelError::IOError);
            }
            let ofs = position - block.into_offset();
            let len = (PAGE_SIZE - ofs).min(max_read - read_bytes);
            buf[read_bytes..read_bytes + len].copy_from_slice(&bounce_buffer[ofs..ofs + len]);
            position += len;
            read_bytes += len;
        }
        Ok(read_bytes)
    }
}

struct MemFile(Arc<[u8]>);

impl traits::RegularFile for MemFile {
    fn size(&self) -> usize {
        self.0.len()
    }

    fn read(&self, fba: FileBlockNumber, buf: &mut [u8; PAGE_SIZE]) -> Result<bool, KernelError> {
        let start = fba.into_offset();
        if start >= self.0.len() {
            return Ok(false);
        }
        let len = (self.0.len() - start).min(PAGE_SIZE);
        buf[..len].copy_from_slice(&self.0[start..start + len]);
        buf[len..].fill(0);
        Ok(true)
    }
}

/// A flat in-memory filesystem.
///
/// Paths are matched verbatim; there are no directories.
#[derive(Default, Clone)]
pub struct MemFs {
    files: BTreeMap<String, Arc<[u8]>>,
}

impl MemFs {
    /// Creates an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `contents` at `path`, replacing any previous file.
    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        let contents: Vec<u8> = contents.into();
        self.files.insert(path.into(), Arc::from(contents));
    }

    /// Builder form of [`MemFs::insert`].
    pub fn with(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl traits::FileSystem for MemFs {
    fn open(&self, path: &str) -> Result<RegularFile, KernelError> {
        self.files
            .get(path)
            .map(|contents| RegularFile::new(MemFile(contents.clone())))
            .ok_or(KernelError::NoSuchEntry)
    }
}
