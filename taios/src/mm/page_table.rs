//! Entries of the two-level page table and their permissions.
//!
//! A 32-bit virtual address splits into a directory index, a table index and
//! a byte offset:
//!
//! ```text
//! 31            22 21            12 11           0
//! +---------------+----------------+-------------+
//! |   Directory   |     Table      |    Page     |
//! |     Index     |     Index      |   Offset    |
//! +---------------+----------------+-------------+
//!         10               10             12
//! ```
//!
//! The directory has 1024 slots, each either absent or owning one table of
//! 1024 [`Pte`]s. A table therefore covers 4 MiB of virtual memory and the
//! whole directory the full 4 GiB.
//!
//! The attributes of the directory slot and the table entry are **AND**ed
//! together, so a page is reachable from user mode only if both levels carry
//! [`PteFlags::US`].

use crate::{KernelError, config::PAGING_TOTAL_ENTRIES_PER_TABLE};
use abyss::addressing::{PAGE_MASK, PAGE_SHIFT, Pa, Va};

bitflags::bitflags! {
    /// Flags of a page directory or page table entry.
    pub struct PteFlags: u32 {
        /// Present; must be 1 to map a 4-KByte page.
        const P = 1 << 0;
        /// Read/write; if 0, user-mode writes are not allowed to the page.
        const RW = 1 << 1;
        /// User/supervisor; if 0, user-mode accesses are not allowed to the
        /// page.
        const US = 1 << 2;
        /// Page-level write-through.
        const PWT = 1 << 3;
        /// Page-level cache disable.
        const PCD = 1 << 4;
        /// Accessed; set by the walk whenever the entry translates an
        /// address.
        const A = 1 << 5;
        /// Dirty; set by the walk on writes.
        const D = 1 << 6;
    }
}

/// Page Table Entry (PTE).
///
/// One 32-bit word holding a page-aligned frame address in its upper 20 bits
/// and [`PteFlags`] in its lower 12 bits.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Pte(pub u32);

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pte({:08x}, {:?})", self.frame().into_u32(), self.flags())
    }
}

impl Pte {
    /// Builds an entry pointing at `pa` with `flags`.
    ///
    /// # Returns
    /// - `Err(PageTableMappingError::Unaligned)` if `pa` is not page aligned.
    #[inline]
    pub fn new(pa: Pa, flags: PteFlags) -> Result<Self, PageTableMappingError> {
        if pa.is_page_aligned() {
            Ok(Self(pa.into_u32() | flags.bits()))
        } else {
            Err(PageTableMappingError::Unaligned)
        }
    }

    /// Get the physical address pointed to by this entry.
    ///
    /// # Returns
    /// - `Some(Pa)` if the entry is present.
    /// - `None` if the entry is not present.
    #[inline]
    pub const fn pa(&self) -> Option<Pa> {
        if self.flags().contains(PteFlags::P) {
            Some(self.frame())
        } else {
            None
        }
    }

    /// The frame address stored in the entry, whether present or not.
    #[inline]
    pub const fn frame(&self) -> Pa {
        Pa::new(self.0 & !(PAGE_MASK as u32))
    }

    /// Get the flags associated with this entry.
    #[inline]
    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Replaces the flags, keeping the frame.
    #[inline]
    pub fn set_flags(&mut self, flags: PteFlags) -> &mut Self {
        self.0 = self.frame().into_u32() | flags.bits();
        self
    }
}

/// Indices of a virtual address into the directory and its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtIndices {
    /// The page-aligned address the indices were computed from.
    pub va: Va,
    /// Slot in the page directory.
    pub pdei: usize,
    /// Entry in the page table.
    pub ptei: usize,
}

impl PtIndices {
    /// Computes the indices of a page-aligned address.
    ///
    /// # Returns
    /// - `Err(PageTableMappingError::Unaligned)` if `va` is not page aligned.
    pub fn from_va(va: Va) -> Result<Self, PageTableMappingError> {
        if va.is_page_aligned() {
            let addr = va.into_usize();
            Ok(Self {
                va,
                pdei: addr / (PAGING_TOTAL_ENTRIES_PER_TABLE << PAGE_SHIFT),
                ptei: addr % (PAGING_TOTAL_ENTRIES_PER_TABLE << PAGE_SHIFT) >> PAGE_SHIFT,
            })
        } else {
            Err(PageTableMappingError::Unaligned)
        }
    }
}

/// One page table: 1024 entries, 4 MiB of address space.
#[repr(align(4096))]
pub struct PageTable([Pte; PAGING_TOTAL_ENTRIES_PER_TABLE]);

impl PageTable {
    /// Allocates a table whose entries are all zero (not present).
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self([Pte(0); PAGING_TOTAL_ENTRIES_PER_TABLE]))
    }
}

impl core::ops::Index<usize> for PageTable {
    type Output = Pte;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl core::ops::IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

/// A populated page directory slot.
pub struct Pde {
    /// Attributes applied to the whole 4 MiB the table covers.
    pub flags: PteFlags,
    /// The table owned by this slot.
    pub table: Box<PageTable>,
}

/// Errors of the page-table layer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PageTableMappingError {
    /// Address or size is not page aligned.
    Unaligned,
    /// No table covers the address, or the address space is torn down.
    NotExist,
    /// The range is empty or wraps around the end of the address space.
    InvalidRange,
}

impl From<PageTableMappingError> for KernelError {
    fn from(e: PageTableMappingError) -> Self {
        match e {
            PageTableMappingError::Unaligned | PageTableMappingError::InvalidRange => {
                KernelError::InvalidArgument
            }
            PageTableMappingError::NotExist => KernelError::BadAddress,
        }
    }
}
