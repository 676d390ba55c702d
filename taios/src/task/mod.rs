//! # Tasks
//!
//! A [`Task`] is one schedulable execution context: the register image the
//! task resumes with and the [`AddressSpace`] it runs in. Every process owns
//! exactly one task, and every live task sits in the kernel's
//! [`ReadyQueue`].
//!
//! ## Life cycle
//!
//! ```text
//!   create ──> ready ──switch──> running ──free──> removed
//!                ^                  |
//!                └──── switch ──────┘
//! ```
//!
//! A new task starts *ready* with the register image seeded from its
//! program: entry point, top of stack and the user segment selectors. It
//! becomes *running* the first time the scheduler dispatches it. From then on
//! every interrupt that arrives while it owns the CPU saves the interrupted
//! registers into the task, so the next dispatch resumes where it left off.
//! A task that was never dispatched keeps its seeded image: the frame of an
//! interrupt that arrives before its first run belongs to somebody else.

pub mod scheduler;
mod switch;

pub use scheduler::{ReadyQueue, TaskId};

use crate::{mm::AddressSpace, mm::page_table::PteFlags, process::Pid};
use abyss::{addressing::Va, interrupt::Registers};

/// One schedulable execution context.
pub struct Task {
    registers: Registers,
    space: AddressSpace,
    process: Pid,
}

impl Task {
    /// Builds a task for `process` with a fresh user address space.
    ///
    /// The space starts with present, writable, user-accessible placeholder
    /// entries; the caller maps the program into it.
    pub fn new(process: Pid, entry: Va, stack_top: Va) -> Self {
        let mut registers = Registers::new();
        *registers.eip() = entry.into_u32();
        *registers.esp() = stack_top.into_u32();
        Self {
            registers,
            space: AddressSpace::new(PteFlags::P | PteFlags::RW | PteFlags::US),
            process,
        }
    }

    /// The registers the task resumes with.
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// The registers the task resumes with, mutably.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// The address space the task runs in.
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// The address space the task runs in, mutably.
    pub fn space_mut(&mut self) -> &mut AddressSpace {
        &mut self.space
    }

    /// The process owning this task.
    pub fn process(&self) -> Pid {
        self.process
    }

    /// Overwrites the saved registers with an interrupt frame.
    pub fn save_state(&mut self, frame: &Registers) {
        self.registers = *frame;
    }
}
