//! Memory management.
//!
//! [`KernelMemory`] bundles the machine's physical memory with the kernel
//! heap that carves it up. Everything a user program can see (program
//! images, stacks, argument pages, `malloc`ed buffers and the scratch pages of
//! cross-space copies) is heap memory. Kernel bookkeeping such as page
//! tables, task and process records lives in ordinary Rust allocations.

pub mod address_space;
pub mod heap;
pub mod page_table;

pub use address_space::{Access, AddressSpace, PageFault};
pub use heap::BlockHeap;

use crate::{KernelError, config::Config};
use abyss::{addressing::Pa, memory::BusError, memory::PhysicalMemory};

impl From<BusError> for KernelError {
    fn from(_: BusError) -> Self {
        KernelError::BadAddress
    }
}

/// Physical memory and the kernel heap.
pub struct KernelMemory {
    physical: PhysicalMemory,
    heap: BlockHeap,
}

impl KernelMemory {
    /// Installs the memory described by `config` and puts a heap on it.
    pub fn new(config: &Config) -> Result<Self, KernelError> {
        config.validate()?;
        Ok(Self {
            physical: PhysicalMemory::new(config.memory_size),
            heap: BlockHeap::new(config.heap_start, config.heap_size)?,
        })
    }

    /// The physical memory.
    pub fn physical(&self) -> &PhysicalMemory {
        &self.physical
    }

    /// The physical memory, mutably.
    pub fn physical_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.physical
    }

    /// The kernel heap.
    pub fn heap(&self) -> &BlockHeap {
        &self.heap
    }

    /// Allocates `size` bytes from the kernel heap.
    ///
    /// # Returns
    /// - `Err(KernelError::NoMemory)` if the heap cannot satisfy the request
    ///   or `size` is zero.
    pub fn kmalloc(&mut self, size: usize) -> Result<Pa, KernelError> {
        self.heap.alloc(size).ok_or(KernelError::NoMemory)
    }

    /// Like [`KernelMemory::kmalloc`], and zeroes every block handed out.
    pub fn kzalloc(&mut self, size: usize) -> Result<Pa, KernelError> {
        let pa = self.kmalloc(size)?;
        let len = self.heap.allocation_size(pa).unwrap_or(size);
        if let Err(e) = self.physical.fill(pa, len, 0) {
            let _ = self.heap.free(pa);
            return Err(e.into());
        }
        Ok(pa)
    }

    /// Returns an allocation to the heap.
    pub fn kfree(&mut self, pa: Pa) -> Result<(), KernelError> {
        self.heap.free(pa)
    }

    /// Copies `data` to physical address `pa`.
    pub fn write(&mut self, pa: Pa, data: &[u8]) -> Result<(), KernelError> {
        Ok(self.physical.write(pa, data)?)
    }

    /// Copies from physical address `pa` into `buf`.
    pub fn read(&self, pa: Pa, buf: &mut [u8]) -> Result<(), KernelError> {
        Ok(self.physical.read(pa, buf)?)
    }
}
