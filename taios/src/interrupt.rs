//! Interrupt management.
//!
//! Every entry into the kernel goes through [`Kernel::deliver`], the
//! interrupt wrapper:
//!
//! 1. take the interrupt, capturing the interrupted registers,
//! 2. switch to the kernel address space,
//! 3. save the registers into the interrupted task if user code was running,
//! 4. run the handler registered for the vector,
//! 5. unless the handler switched tasks, switch back to the interrupted
//!    address space and `iret`, with the syscall result in `eax`.
//!
//! Handlers run with interrupts masked and acknowledge their own IRQ before
//! returning or switching tasks.

use crate::{Kernel, config::TOTAL_INTERRUPTS};
use abyss::{dev::pic::Pic, interrupt::Registers, x86::PrivilegeLevel};
use num_enum::TryFromPrimitive;

/// Vector of the timer interrupt (IRQ 0).
pub const TIMER_VECTOR: u8 = 0x20;
/// Vector of the keyboard interrupt (IRQ 1).
pub const KEYBOARD_VECTOR: u8 = 0x21;
/// Vector of `int 0x80`.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Processor exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Exception {
    /// `#DE`
    DivideError = 0x00,
    /// `#DB`
    Debug = 0x01,
    /// Non-maskable interrupt.
    Nmi = 0x02,
    /// `#BP`
    Breakpoint = 0x03,
    /// `#OF`
    Overflow = 0x04,
    /// `#BR`
    BoundRangeExceeded = 0x05,
    /// `#UD`
    InvalidOpcode = 0x06,
    /// `#NM`
    DeviceNotAvailable = 0x07,
    /// `#DF`
    DoubleFault = 0x08,
    /// `#TS`
    InvalidTss = 0x0A,
    /// `#NP`
    SegmentNotPresent = 0x0B,
    /// `#SS`
    StackSegmentFault = 0x0C,
    /// `#GP`
    GeneralProtection = 0x0D,
    /// `#PF`
    PageFault = 0x0E,
}

/// How the interrupted context continues after a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Resume the interrupted context unchanged.
    Continue,
    /// Resume the interrupted context with this value in `eax`.
    Return(u32),
    /// The handler already loaded another context into the CPU.
    Switched,
}

impl From<u32> for Resume {
    fn from(value: u32) -> Self {
        Resume::Return(value)
    }
}

/// An interrupt handler. Receives the interrupted registers.
pub type InterruptHandler = fn(&mut Kernel, &Registers) -> Resume;

/// Handlers indexed by vector.
pub struct InterruptTable {
    handlers: [Option<InterruptHandler>; TOTAL_INTERRUPTS],
}

impl Default for InterruptTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptTable {
    /// Creates a table with no handler.
    pub fn new() -> Self {
        Self {
            handlers: [None; TOTAL_INTERRUPTS],
        }
    }

    /// Register the interrupt handler of `vector`.
    ///
    /// # Panics
    /// If `vector` already has a handler.
    pub fn register(&mut self, vector: u8, handler: InterruptHandler) {
        let slot = &mut self.handlers[vector as usize];
        if slot.is_some() {
            panic!("Interrupt {vector:#x} is already registered.");
        }
        *slot = Some(handler);
    }

    /// The handler of `vector`.
    pub fn get(&self, vector: u8) -> Option<InterruptHandler> {
        self.handlers[vector as usize]
    }
}

/// Installs the kernel's handlers.
pub fn register_handlers(table: &mut InterruptTable) {
    table.register(Exception::DivideError as u8, handle_divide_error);
    table.register(Exception::PageFault as u8, handle_page_fault);
    table.register(TIMER_VECTOR, handle_timer);
    table.register(KEYBOARD_VECTOR, handle_keyboard);
    table.register(SYSCALL_VECTOR, crate::syscall::handle_syscall);
}

fn handle_timer(kernel: &mut Kernel, _frame: &Registers) -> Resume {
    kernel.pic.end_of_interrupt();
    if kernel.tasks.is_empty() {
        return Resume::Continue;
    }
    kernel.switch_task()
}

fn handle_keyboard(kernel: &mut Kernel, _frame: &Registers) -> Resume {
    while let Some(key) = kernel.keyboard_port.read() {
        kernel.push_key(key);
    }
    kernel.pic.end_of_interrupt();
    Resume::Continue
}

fn handle_divide_error(kernel: &mut Kernel, frame: &Registers) -> Resume {
    kernel.kill_faulting_process(Exception::DivideError, frame)
}

fn handle_page_fault(kernel: &mut Kernel, frame: &Registers) -> Resume {
    warning!("Page fault at {:#010x}.", kernel.cpu.cr2());
    kernel.kill_faulting_process(Exception::PageFault, frame)
}

impl Kernel {
    /// The interrupt wrapper.
    pub(crate) fn deliver(&mut self, vector: u8) {
        let mut frame = self.cpu.enter_interrupt();
        let from_user = frame.interrupt_stack_frame.cs.dpl() == PrivilegeLevel::Ring3;
        let interrupted = self.tasks.current().filter(|_| from_user);
        self.kernel_space.switch_into(&mut self.cpu);
        if let Some(task) = interrupted {
            self.save_task_state(task, &frame);
        }

        let resume = match self.interrupts.get(vector) {
            Some(handler) => handler(self, &frame),
            None => {
                match Exception::try_from(vector) {
                    Ok(exception) => warning!("Unhandled exception {exception:?}."),
                    Err(_) => warning!("Unhandled interrupt {vector:#x}."),
                }
                if Pic::is_irq(vector) {
                    self.pic.end_of_interrupt();
                }
                Resume::Continue
            }
        };

        match resume {
            Resume::Switched => (),
            Resume::Continue | Resume::Return(_) => {
                if let Resume::Return(value) = resume {
                    *frame.eax() = value;
                }
                if let Some(task) = interrupted {
                    match self.tasks.get(task) {
                        Some(task) => task.space().switch_into(&mut self.cpu),
                        None => panic!("Returning to {task:?}, which was freed by its handler."),
                    }
                }
                self.cpu.iret(&frame);
            }
        }
    }

    /// Terminates the process whose task raised `exception`.
    ///
    /// # Panics
    /// If the exception was raised by the kernel itself.
    fn kill_faulting_process(&mut self, exception: Exception, frame: &Registers) -> Resume {
        let pid = match self.running_process() {
            Some(pid) if frame.interrupt_stack_frame.cs.dpl() == PrivilegeLevel::Ring3 => pid,
            _ => panic!("Unexpected {exception:?} in the kernel.\n{frame:?}"),
        };
        warning!(
            "Process {pid} raised {exception:?} at {:#010x}; terminating it.",
            frame.interrupt_stack_frame.eip
        );
        self.cpu.disable_interrupts();
        self.teardown_process(pid, -1);
        self.cpu.enable_interrupts();
        self.pic.end_of_interrupt();
        self.reschedule()
    }
}
