//! Interrupt
//!
//! The register image the processor and the interrupt entry stub leave on the
//! kernel stack when an interrupt, an exception or `int 0x80` is taken, and
//! the interrupt enable state of the CPU.
use crate::x86::{Rflags, Segment, SegmentSelector};

/// Enumeration representing the interrupt state.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl InterruptState {
    /// Reads the interrupt state encoded in `flags`.
    pub fn from_flags(flags: Rflags) -> Self {
        if flags.contains(Rflags::IF) {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// General purpose registers, in the order `pushad` stores them.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct GeneralPurposeRegisters {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// The part of the frame pushed by the processor itself.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptStackFrame {
    /// Instruction pointer to resume at.
    pub eip: u32,
    /// Code segment to resume with.
    pub cs: SegmentSelector,
    /// Flags to restore.
    pub eflags: Rflags,
    /// Stack pointer to resume with.
    pub esp: u32,
    /// Stack segment to resume with.
    pub ss: SegmentSelector,
}

/// x86 Trap frame.
///
/// The same layout doubles as the saved execution context of a task: resuming
/// a task is an `iret` into its frame.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// General purpose registers.
    pub gprs: GeneralPurposeRegisters,
    /// Processor-pushed state.
    pub interrupt_stack_frame: InterruptStackFrame,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// Creates a new register frame for a user task.
    ///
    /// Selectors point at the user segments and interrupts are enabled. The
    /// instruction and stack pointers must be set before the frame is
    /// launched.
    ///
    /// # Example
    /// ```rust
    /// let mut regs = Registers::new();
    /// *regs.eip() = 0x400000; // Set entry point
    /// *regs.esp() = 0x3FF000; // Set user stack pointer
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self {
            gprs: GeneralPurposeRegisters::default(),
            interrupt_stack_frame: InterruptStackFrame {
                eip: 0,
                cs: Segment::UserCode.into_selector(),
                eflags: Rflags::IF | Rflags::_1,
                esp: 0,
                ss: Segment::UserData.into_selector(),
            },
        }
    }

    /// Creates the register frame the kernel runs on before any task exists.
    pub fn kernel() -> Self {
        Self {
            gprs: GeneralPurposeRegisters::default(),
            interrupt_stack_frame: InterruptStackFrame {
                eip: 0,
                cs: Segment::KernelCode.into_selector(),
                eflags: Rflags::_1,
                esp: 0,
                ss: Segment::KernelData.into_selector(),
            },
        }
    }

    /// Returns a mutable reference to the instruction pointer (`EIP`).
    pub fn eip(&mut self) -> &mut u32 {
        &mut self.interrupt_stack_frame.eip
    }

    /// Returns a mutable reference to the stack pointer (`ESP`).
    pub fn esp(&mut self) -> &mut u32 {
        &mut self.interrupt_stack_frame.esp
    }

    /// Returns a mutable reference to the accumulator, which carries the
    /// syscall number in and the result out.
    pub fn eax(&mut self) -> &mut u32 {
        &mut self.gprs.eax
    }
}

impl core::fmt::Debug for Registers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(
            f,
            "EAX: {:08x} | EBX: {:08x} | ECX: {:08x} | EDX: {:08x}\n\
             ESI: {:08x} | EDI: {:08x} | EBP: {:08x} | ESP: {:08x}\n\
             EIP: {:08x} | EFLAGS: {:08x} [{:?}]\n\
             CS:  {:?} | SS: {:?}",
            self.gprs.eax,
            self.gprs.ebx,
            self.gprs.ecx,
            self.gprs.edx,
            self.gprs.esi,
            self.gprs.edi,
            self.gprs.ebp,
            self.interrupt_stack_frame.esp,
            self.interrupt_stack_frame.eip,
            self.interrupt_stack_frame.eflags.bits(),
            self.interrupt_stack_frame.eflags,
            self.interrupt_stack_frame.cs,
            self.interrupt_stack_frame.ss,
        )
    }
}
