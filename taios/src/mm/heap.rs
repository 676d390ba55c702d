//! Block-table kernel heap.
//!
//! The heap hands out physical memory in whole 4096-byte blocks. A table with
//! one entry per block records which blocks are taken and how they chain into
//! allocations:
//!
//! ```text
//!   entry:  [F|T|N] [T|N] [T] [ ] [ ] [F|T] ...
//!   block:     0      1    2   3   4    5
//!              \____ 8 KiB+ ___/       \_ 1 block
//! ```
//!
//! `F` marks the first block of an allocation, `T` a taken block and `N` a
//! block followed by another block of the same allocation. Allocation is
//! first fit over runs of free blocks; freeing walks the chain from the
//! first block. Because blocks are page sized, every pointer the heap returns
//! is page aligned and can be mapped into an address space as is.

use crate::KernelError;
use abyss::addressing::{PAGE_SIZE, Pa};

bitflags::bitflags! {
    /// State of one heap block.
    pub struct HeapBlockEntry: u8 {
        /// The block belongs to an allocation.
        const TAKEN = 0x01;
        /// The block is the first of its allocation.
        const IS_FIRST = 0b0100_0000;
        /// The next block belongs to the same allocation.
        const HAS_NEXT = 0b1000_0000;
    }
}

/// Size of one heap block.
pub const HEAP_BLOCK_SIZE: usize = PAGE_SIZE;

/// A first-fit block allocator over a physical range.
pub struct BlockHeap {
    start: Pa,
    entries: Vec<HeapBlockEntry>,
}

impl BlockHeap {
    /// Creates a heap managing `[start, start + size)`.
    ///
    /// # Returns
    /// - `Err(KernelError::InvalidArgument)` if either bound is not block
    ///   aligned or the range is empty.
    pub fn new(start: Pa, size: usize) -> Result<Self, KernelError> {
        if !start.is_page_aligned() || size % HEAP_BLOCK_SIZE != 0 || size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        Ok(Self {
            start,
            entries: vec![HeapBlockEntry::empty(); size / HEAP_BLOCK_SIZE],
        })
    }

    /// First address of the managed range.
    pub fn start(&self) -> Pa {
        self.start
    }

    /// Number of blocks in the heap.
    pub fn total_blocks(&self) -> usize {
        self.entries.len()
    }

    /// Number of blocks not part of any allocation.
    pub fn free_blocks(&self) -> usize {
        self.entries.iter().filter(|e| e.is_empty()).count()
    }

    /// Returns true if `pa` lies in the managed range.
    pub fn contains(&self, pa: Pa) -> bool {
        pa >= self.start && (pa - self.start) / HEAP_BLOCK_SIZE < self.entries.len()
    }

    fn block_of(&self, pa: Pa) -> Option<usize> {
        if self.contains(pa) && pa.is_page_aligned() {
            Some((pa - self.start) / HEAP_BLOCK_SIZE)
        } else {
            None
        }
    }

    fn find_run(&self, blocks: usize) -> Option<usize> {
        let mut run = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.is_empty() {
                run += 1;
                if run == blocks {
                    return Some(i + 1 - blocks);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    /// Allocates at least `size` bytes.
    ///
    /// # Returns
    /// - `None` if `size` is zero or no run of free blocks is large enough.
    pub fn alloc(&mut self, size: usize) -> Option<Pa> {
        if size == 0 {
            return None;
        }
        let blocks = size.div_ceil(HEAP_BLOCK_SIZE);
        let first = self.find_run(blocks)?;
        let last = first + blocks - 1;
        for (i, entry) in self.entries[first..=last].iter_mut().enumerate() {
            *entry = HeapBlockEntry::TAKEN;
            if i == 0 {
                *entry |= HeapBlockEntry::IS_FIRST;
            }
            if first + i != last {
                *entry |= HeapBlockEntry::HAS_NEXT;
            }
        }
        Some(self.start + first * HEAP_BLOCK_SIZE)
    }

    /// Size in bytes of the allocation starting at `pa`.
    pub fn allocation_size(&self, pa: Pa) -> Option<usize> {
        let first = self.block_of(pa)?;
        if !self.entries[first].contains(HeapBlockEntry::IS_FIRST) {
            return None;
        }
        let blocks = self.entries[first..]
            .iter()
            .position(|e| !e.contains(HeapBlockEntry::HAS_NEXT))
            .map(|p| p + 1)
            .unwrap_or(self.entries.len() - first);
        Some(blocks * HEAP_BLOCK_SIZE)
    }

    /// Releases the allocation starting at `pa`.
    ///
    /// # Returns
    /// - `Err(KernelError::InvalidArgument)` if `pa` is not the start of a
    ///   live allocation.
    pub fn free(&mut self, pa: Pa) -> Result<(), KernelError> {
        let first = self.block_of(pa).ok_or(KernelError::InvalidArgument)?;
        if !self.entries[first].contains(HeapBlockEntry::IS_FIRST) {
            return Err(KernelError::InvalidArgument);
        }
        for entry in &mut self.entries[first..] {
            let chained = entry.contains(HeapBlockEntry::HAS_NEXT);
            *entry = HeapBlockEntry::empty();
            if !chained {
                break;
            }
        }
        Ok(())
    }
}
