//! Layout constants and boot-time configuration.
//!
//! The constants describe the fixed virtual layout every user program is
//! linked against and the static limits of the kernel's tables. [`Config`]
//! holds what may differ from one machine to another.

use crate::KernelError;
use abyss::addressing::{PAGE_SIZE, Pa, Va};

/// Entries in a page directory, and in each page table.
pub const PAGING_TOTAL_ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of virtual memory covered by one page table.
pub const PAGING_TABLE_COVERAGE: usize = PAGING_TOTAL_ENTRIES_PER_TABLE * PAGE_SIZE;

/// Where user code is loaded, and where flat binaries start executing.
pub const USER_PROGRAM_VIRTUAL_ADDRESS: Va = Va::new(0x40_0000);

/// Size of a user stack.
pub const USER_STACK_SIZE: usize = 16 * 1024;

/// Initial stack pointer of every user task. The stack grows down from here.
pub const USER_STACK_TOP: Va = Va::new(0x3F_F000);

/// Lowest address of the user stack.
pub const USER_STACK_BOTTOM: Va = Va::new(0x3F_F000 - USER_STACK_SIZE as u32);

/// The page holding `argc`, `argv` and the argument strings, right above the
/// stack top.
pub const USER_ARGUMENTS_VIRTUAL_ADDRESS: Va = USER_STACK_TOP;

/// Slots in the process table.
pub const MAX_PROCESSES: usize = 10;

/// Live heap allocations one process may hold.
pub const MAX_ALLOCATIONS_PER_PROCESS: usize = 1024;

/// Bytes buffered per keyboard queue.
pub const KEYBOARD_BUFFER_SIZE: usize = 1024;

/// Longest command line `exec` accepts, including the terminating NUL.
pub const MAX_COMMAND_LENGTH: usize = 1024;

/// Capacity of the syscall table.
pub const TOTAL_SYSCALLS: usize = 16;

/// Capacity of the interrupt handler table.
pub const TOTAL_INTERRUPTS: usize = 256;

/// Machine and kernel parameters chosen at boot.
#[derive(Debug, Clone)]
pub struct Config {
    /// Installed physical memory, in bytes.
    pub memory_size: usize,
    /// First byte of the kernel heap.
    pub heap_start: Pa,
    /// Size of the kernel heap, in bytes.
    pub heap_size: usize,
    /// Slots in the process table, at most [`MAX_PROCESSES`].
    pub max_processes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_size: 32 * 1024 * 1024,
            heap_start: Pa::new(0x0100_0000),
            heap_size: 16 * 1024 * 1024,
            max_processes: MAX_PROCESSES,
        }
    }
}

impl Config {
    /// Checks that the heap lies page aligned inside the installed memory and
    /// clear of the user program layout.
    pub fn validate(&self) -> Result<(), KernelError> {
        let heap_end = self
            .heap_start
            .into_usize()
            .checked_add(self.heap_size)
            .ok_or(KernelError::InvalidArgument)?;
        if !self.heap_start.is_page_aligned()
            || self.heap_size % PAGE_SIZE != 0
            || self.heap_size == 0
            || heap_end > self.memory_size
            || heap_end > u32::MAX as usize
        {
            return Err(KernelError::InvalidArgument);
        }
        // Allocations are mapped at their physical address in user space.
        let user_low = USER_STACK_BOTTOM.into_usize();
        let user_high = USER_PROGRAM_VIRTUAL_ADDRESS.into_usize() + PAGING_TABLE_COVERAGE;
        if self.heap_start.into_usize() < user_high && heap_end > user_low {
            return Err(KernelError::InvalidArgument);
        }
        if self.max_processes == 0 || self.max_processes > MAX_PROCESSES {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }
}
