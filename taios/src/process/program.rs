//! What a loader hands to process creation.

use crate::mm::{KernelMemory, page_table::PteFlags};
use abyss::addressing::{Pa, Va};

/// One contiguous region of a program image.
///
/// `phys` is the start of a kernel heap allocation owned by the program;
/// `virt` is where the region appears in the process's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySection {
    /// Backing memory.
    pub phys: Pa,
    /// Where the section is mapped.
    pub virt: Va,
    /// Length in bytes.
    pub size: usize,
    /// Page permissions of the mapping.
    pub flags: PteFlags,
}

impl MemorySection {
    /// One past the last byte of the mapping.
    pub fn virt_end(&self) -> Va {
        self.virt + self.size
    }
}

/// A loaded program: its sections, its stack and where it starts.
#[derive(Debug)]
pub struct Program {
    sections: Vec<MemorySection>,
    stack: MemorySection,
    entry: Va,
}

impl Program {
    /// Describes a loaded program. The program owns the backing memory of
    /// every section and of the stack until [`Program::release`].
    pub fn new(sections: Vec<MemorySection>, stack: MemorySection, entry: Va) -> Self {
        Self {
            sections,
            stack,
            entry,
        }
    }

    /// The loadable sections, in load order.
    pub fn sections(&self) -> &[MemorySection] {
        &self.sections
    }

    /// The stack section.
    pub fn stack(&self) -> &MemorySection {
        &self.stack
    }

    /// First instruction.
    pub fn entry(&self) -> Va {
        self.entry
    }

    /// Initial stack pointer: the stack grows down from the end of its
    /// section.
    pub fn stack_top(&self) -> Va {
        self.stack.virt_end()
    }

    /// Returns the backing memory of every section and of the stack to the
    /// kernel heap.
    pub fn release(self, memory: &mut KernelMemory) {
        for section in self.sections.iter().chain(core::iter::once(&self.stack)) {
            if let Err(e) = memory.kfree(section.phys) {
                warning!("Releasing section at {:?}: {e}", section.virt);
            }
        }
    }
}
