//! The processor of the simulated machine.
//!
//! The CPU holds the live register file, the paging root (`cr3`) and the
//! interrupt enable flag. The kernel core drives it explicitly: taking an
//! interrupt saves the live registers into a frame and drops to ring 0 with
//! interrupts masked, and `iret` resumes at a frame.

use crate::{
    interrupt::{InterruptState, Registers},
    x86::{PrivilegeLevel, Rflags},
};

/// Value of the paging root register.
///
/// The kernel core gives every address space a unique root; loading it into
/// `cr3` makes that space the one every memory access is translated with.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Cr3(pub u32);

/// The processor.
pub struct Cpu {
    registers: Registers,
    cr2: u32,
    cr3: Option<Cr3>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// A processor right after reset: ring 0, interrupts masked, paging off.
    pub fn new() -> Self {
        Self {
            registers: Registers::kernel(),
            cr2: 0,
            cr3: None,
        }
    }

    /// The live register file.
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// The live register file, for code that executes instructions.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Current privilege level.
    pub fn privilege(&self) -> PrivilegeLevel {
        self.registers.interrupt_stack_frame.cs.dpl()
    }

    /// Reads the current interrupt state.
    pub fn interrupt_state(&self) -> InterruptState {
        InterruptState::from_flags(self.registers.interrupt_stack_frame.eflags)
    }

    /// `sti`
    pub fn enable_interrupts(&mut self) {
        self.registers.interrupt_stack_frame.eflags |= Rflags::IF;
    }

    /// `cli`
    pub fn disable_interrupts(&mut self) {
        self.registers.interrupt_stack_frame.eflags -= Rflags::IF;
    }

    /// Loads a new paging root.
    pub fn load_cr3(&mut self, root: Cr3) {
        self.cr3 = Some(root);
    }

    /// The paging root in use, if paging is enabled.
    pub fn cr3(&self) -> Option<Cr3> {
        self.cr3
    }

    /// Address of the last page fault.
    pub fn cr2(&self) -> u32 {
        self.cr2
    }

    /// Records the address of a faulting access, as the MMU does before
    /// raising a page fault.
    pub fn set_cr2(&mut self, addr: u32) {
        self.cr2 = addr;
    }

    /// Takes an interrupt.
    ///
    /// Returns the frame describing the interrupted context. Afterwards the
    /// CPU runs kernel code with interrupts masked.
    pub fn enter_interrupt(&mut self) -> Registers {
        core::mem::replace(&mut self.registers, Registers::kernel())
    }

    /// `iret`: resumes execution at `frame`.
    ///
    /// Privilege level and interrupt state are taken from the frame.
    pub fn iret(&mut self, frame: &Registers) {
        self.registers = *frame;
    }
}
