//! # Address spaces
//!
//! An [`AddressSpace`] is one private virtual-to-physical mapping: a page
//! directory and the page tables it owns. The kernel has one, and every task
//! owns one more.
//!
//! ## Eager, identity-shaped tables
//!
//! [`AddressSpace::new`] builds all 1024 tables up front and fills every entry
//! with the identity frame of its address, marked with the flags given at
//! creation. A fresh space is therefore "fully addressable": virtual address
//! `x` reaches physical address `x`. Individual pages are then re-pointed with
//! [`AddressSpace::map`] or revoked with [`AddressSpace::unmap`]. This keeps
//! the walk free of allocation and of missing-table cases; a mapping request
//! never fails for lack of memory.
//!
//! ## Switching
//!
//! The CPU translates through whichever space's root is loaded in `cr3`.
//! [`AddressSpace::switch_into`] loads it. A space whose directory has been
//! released can never be loaded again, and a space that is still loaded must
//! not be released.
//!
//! ## Translation
//!
//! [`AddressSpace::translate`] performs the same walk the MMU does. A user
//! access needs `P` and `US` at both levels, and `RW` at both levels for a
//! write. A supervisor access only needs `P`: the kernel runs with write
//! protection off, so read-only pages stay writable from ring 0.

use super::page_table::{PageTable, PageTableMappingError, Pde, PtIndices, Pte, PteFlags};
use crate::{KernelError, config::PAGING_TOTAL_ENTRIES_PER_TABLE};
use abyss::{
    addressing::{PAGE_SIZE, Pa, Va},
    cpu::{Cpu, Cr3},
    memory::PhysicalMemory,
    x86::PrivilegeLevel,
};
use core::sync::atomic::{AtomicU32, Ordering};

static NEXT_ROOT: AtomicU32 = AtomicU32::new(1);

/// The kind of memory access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    /// The access stores to memory.
    pub write: bool,
    /// The privilege level of the accessing code.
    pub privilege: PrivilegeLevel,
}

impl Access {
    /// A kernel load.
    pub const KERNEL_READ: Self = Self {
        write: false,
        privilege: PrivilegeLevel::Ring0,
    };
    /// A kernel store.
    pub const KERNEL_WRITE: Self = Self {
        write: true,
        privilege: PrivilegeLevel::Ring0,
    };
    /// A user load.
    pub const USER_READ: Self = Self {
        write: false,
        privilege: PrivilegeLevel::Ring3,
    };
    /// A user store.
    pub const USER_WRITE: Self = Self {
        write: true,
        privilege: PrivilegeLevel::Ring3,
    };

    fn is_user(&self) -> bool {
        self.privilege == PrivilegeLevel::Ring3
    }
}

/// A failed translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// The faulting address (`cr2`).
    pub va: Va,
    /// The access that faulted.
    pub access: Access,
    /// The page was present; the fault is a protection violation.
    pub present: bool,
}

impl From<PageFault> for KernelError {
    fn from(_: PageFault) -> Self {
        KernelError::BadAddress
    }
}

/// A two-level virtual address space.
pub struct AddressSpace {
    root: Cr3,
    directory: Option<Box<[Option<Pde>]>>,
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("root", &self.root)
            .field("freed", &self.directory.is_none())
            .finish()
    }
}

impl AddressSpace {
    /// Builds a fully populated address space.
    ///
    /// Every directory slot gets a table, and every entry of table `i` is
    /// set to the identity frame `i * 4 MiB + j * 4 KiB` with `flags`.
    pub fn new(flags: PteFlags) -> Self {
        let directory = (0..PAGING_TOTAL_ENTRIES_PER_TABLE)
            .map(|i| {
                let mut table = PageTable::new_boxed();
                let offset = (i * PAGING_TOTAL_ENTRIES_PER_TABLE * PAGE_SIZE) as u32;
                for j in 0..PAGING_TOTAL_ENTRIES_PER_TABLE {
                    table[j] = Pte((offset + (j * PAGE_SIZE) as u32) | flags.bits());
                }
                Some(Pde { flags, table })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            root: Cr3(NEXT_ROOT.fetch_add(1, Ordering::Relaxed)),
            directory: Some(directory),
        }
    }

    /// The paging root that selects this space.
    pub fn root(&self) -> Cr3 {
        self.root
    }

    /// Returns true once [`AddressSpace::free`] has run.
    pub fn is_freed(&self) -> bool {
        self.directory.is_none()
    }

    fn table_mut(&mut self, indices: &PtIndices) -> Result<&mut PageTable, PageTableMappingError> {
        self.directory
            .as_mut()
            .and_then(|d| d.get_mut(indices.pdei))
            .and_then(|slot| slot.as_mut())
            .map(|pde| pde.table.as_mut())
            .ok_or(PageTableMappingError::NotExist)
    }

    fn slot(&self, indices: &PtIndices) -> Result<&Pde, PageTableMappingError> {
        self.directory
            .as_ref()
            .and_then(|d| d.get(indices.pdei))
            .and_then(|slot| slot.as_ref())
            .ok_or(PageTableMappingError::NotExist)
    }

    /// Points `[va, va + size)` at `[pa, pa + size)` with `flags`.
    ///
    /// The end of the range is derived from `pa + size` rounded up to a page,
    /// so a partial last page is mapped whole.
    ///
    /// # Returns
    /// - `Err(KernelError::InvalidArgument)` if `va` or `pa` is not page
    ///   aligned, `size` is zero, or the range runs past 4 GiB.
    pub fn map(&mut self, va: Va, pa: Pa, size: usize, flags: PteFlags) -> Result<(), KernelError> {
        if !va.is_page_aligned() || !pa.is_page_aligned() {
            return Err(PageTableMappingError::Unaligned.into());
        }
        let end = u32::try_from(size)
            .ok()
            .and_then(|size| pa.into_u32().checked_add(size))
            .and_then(|end| Pa::new(end).page_up())
            .filter(|_| size != 0)
            .ok_or(PageTableMappingError::InvalidRange)?;
        let pages = (end - pa) / PAGE_SIZE;
        va.checked_add((pages - 1) * PAGE_SIZE)
            .ok_or(PageTableMappingError::InvalidRange)?;

        for page in 0..pages {
            let indices = PtIndices::from_va(va + page * PAGE_SIZE)?;
            let entry = Pte::new(pa + page * PAGE_SIZE, flags)?;
            self.table_mut(&indices)?[indices.ptei] = entry;
        }
        Ok(())
    }

    /// Revokes access to `[va, va + size)` by clearing every flag of the
    /// covering entries. The frames stay recorded, so a later
    /// [`AddressSpace::map`] with the same addresses restores the mapping.
    pub fn unmap(&mut self, va: Va, size: usize) -> Result<(), KernelError> {
        if !va.is_page_aligned() {
            return Err(PageTableMappingError::Unaligned.into());
        }
        let end = va
            .checked_add(size)
            .and_then(|end| end.page_up())
            .filter(|_| size != 0)
            .ok_or(PageTableMappingError::InvalidRange)?;
        let mut page = va;
        while page < end {
            let indices = PtIndices::from_va(page)?;
            self.table_mut(&indices)?[indices.ptei].set_flags(PteFlags::empty());
            page += PAGE_SIZE;
        }
        Ok(())
    }

    /// Reads the raw entry that translates the page at `va`.
    pub fn entry(&self, va: Va) -> Result<Pte, PageTableMappingError> {
        let indices = PtIndices::from_va(va)?;
        Ok(self.slot(&indices)?.table[indices.ptei])
    }

    /// Overwrites the raw entry that translates the page at `va`.
    pub fn set_entry(&mut self, va: Va, pte: Pte) -> Result<(), PageTableMappingError> {
        let indices = PtIndices::from_va(va)?;
        self.table_mut(&indices)?[indices.ptei] = pte;
        Ok(())
    }

    /// Walks the tables the way the MMU does.
    pub fn translate(&self, va: Va, access: Access) -> Result<Pa, PageFault> {
        let fault = |present| PageFault { va, access, present };
        let indices = PtIndices::from_va(va.page_down()).map_err(|_| fault(false))?;
        let pde = self.slot(&indices).map_err(|_| fault(false))?;
        let pte = pde.table[indices.ptei];
        let flags = pte.flags() & pde.flags;
        if !flags.contains(PteFlags::P) {
            return Err(fault(false));
        }
        if access.is_user()
            && (!flags.contains(PteFlags::US) || (access.write && !flags.contains(PteFlags::RW)))
        {
            return Err(fault(true));
        }
        Ok(pte.frame() + va.offset())
    }

    /// Reads `buf.len()` bytes at `va` through this space.
    pub fn read(
        &self,
        memory: &PhysicalMemory,
        va: Va,
        buf: &mut [u8],
        privilege: PrivilegeLevel,
    ) -> Result<(), PageFault> {
        let access = Access {
            write: false,
            privilege,
        };
        let mut done = 0;
        while done < buf.len() {
            let at = va
                .checked_add(done)
                .ok_or(PageFault { va, access, present: false })?;
            let len = (PAGE_SIZE - at.offset()).min(buf.len() - done);
            let pa = self.translate(at, access)?;
            memory
                .read(pa, &mut buf[done..done + len])
                .map_err(|_| PageFault { va: at, access, present: true })?;
            done += len;
        }
        Ok(())
    }

    /// Writes `data` at `va` through this space.
    pub fn write(
        &self,
        memory: &mut PhysicalMemory,
        va: Va,
        data: &[u8],
        privilege: PrivilegeLevel,
    ) -> Result<(), PageFault> {
        let access = Access {
            write: true,
            privilege,
        };
        let mut done = 0;
        while done < data.len() {
            let at = va
                .checked_add(done)
                .ok_or(PageFault { va, access, present: false })?;
            let len = (PAGE_SIZE - at.offset()).min(data.len() - done);
            let pa = self.translate(at, access)?;
            memory
                .write(pa, &data[done..done + len])
                .map_err(|_| PageFault { va: at, access, present: true })?;
            done += len;
        }
        Ok(())
    }

    /// Loads this space into the CPU's paging root.
    ///
    /// # Panics
    /// If the space has no directory. Switching into a torn-down space is a
    /// kernel bug.
    pub fn switch_into(&self, cpu: &mut Cpu) {
        if self.directory.is_none() {
            panic!("Switching into an address space without a page directory.");
        }
        cpu.load_cr3(self.root);
    }

    /// Releases every table, then the directory.
    ///
    /// # Panics
    /// If the space is still loaded in the CPU.
    pub fn free(&mut self, cpu: &Cpu) {
        assert_ne!(
            cpu.cr3(),
            Some(self.root),
            "Trying to drop activated page table."
        );
        if let Some(mut directory) = self.directory.take() {
            for slot in directory.iter_mut() {
                drop(slot.take());
            }
        }
    }
}
