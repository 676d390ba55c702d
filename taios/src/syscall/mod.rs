//! System call infrastructure.
//!
//! User code requests a service with `int 0x80`: the syscall number in
//! `eax`, the arguments pushed on its own stack, the result back in `eax`.
//!
//! ```text
//!             user stack                     kernel
//!   esp+8 ->  [ arg 2 ]
//!   esp+4 ->  [ arg 1 ]      Kernel::arg(task, 1)
//!   esp   ->  [ arg 0 ]      Kernel::arg(task, 0)
//! ```
//!
//! The kernel never dereferences a user pointer while its own address space
//! is loaded. Arguments are fetched with [`Kernel::arg`] and buffers with the
//! [`uaccess`] types, which switch into the caller's space for the copy and
//! back afterwards.
//!
//! | No. | Name      | Arguments    | Returns                         |
//! |-----|-----------|--------------|---------------------------------|
//! | 0   | `exec`    | command list | 0, or an error                  |
//! | 1   | `exit`    | status       | does not return                 |
//! | 2   | `getchar` |              | a key, or 0 when none is queued |
//! | 3   | `putchar` | char         | the char                        |
//! | 4   | `malloc`  | size         | a pointer, or 0                 |
//! | 5   | `free`    | pointer      | 0                               |
//! | 6   | `puts`    | pointer, len | len, or an error                |

mod console;
mod memory;
mod process;
pub mod uaccess;

use crate::{Kernel, KernelError, config::TOTAL_SYSCALLS, interrupt::Resume, task::TaskId};
use abyss::{addressing::Va, interrupt::Registers, x86::PrivilegeLevel};
use num_enum::TryFromPrimitive;

/// Numbers of the kernel's system calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum SyscallNumber {
    /// Start a program.
    Exec = 0,
    /// Terminate the calling process.
    Exit = 1,
    /// Read a key.
    Getchar = 2,
    /// Print a character.
    Putchar = 3,
    /// Allocate memory.
    Malloc = 4,
    /// Release memory.
    Free = 5,
    /// Print a buffer.
    Puts = 6,
}

/// A syscall handler. Receives the caller's registers.
pub type SyscallHandler = fn(&mut Kernel, &Registers) -> Result<Resume, KernelError>;

/// Handlers indexed by syscall number.
pub struct SyscallTable {
    handlers: [Option<SyscallHandler>; TOTAL_SYSCALLS],
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SyscallTable {
    /// Creates a table with no handler.
    pub fn new() -> Self {
        Self {
            handlers: [None; TOTAL_SYSCALLS],
        }
    }

    /// Registers `handler` for `number`.
    ///
    /// # Panics
    /// If `number` is out of range or already has a handler.
    pub fn register(&mut self, number: usize, handler: SyscallHandler) {
        match self.handlers.get_mut(number) {
            Some(slot) if slot.is_none() => *slot = Some(handler),
            Some(_) => panic!("Syscall {number} is already registered."),
            None => panic!("Syscall {number} is out of bounds."),
        }
    }

    /// The handler of `number`, if any.
    pub fn get(&self, number: u32) -> Option<SyscallHandler> {
        self.handlers.get(number as usize).copied().flatten()
    }
}

/// Installs the kernel's syscalls.
pub fn register_syscalls(table: &mut SyscallTable) {
    table.register(SyscallNumber::Exec as usize, process::exec);
    table.register(SyscallNumber::Exit as usize, process::exit);
    table.register(SyscallNumber::Getchar as usize, console::getchar);
    table.register(SyscallNumber::Putchar as usize, console::putchar);
    table.register(SyscallNumber::Malloc as usize, memory::malloc);
    table.register(SyscallNumber::Free as usize, memory::free);
    table.register(SyscallNumber::Puts as usize, console::puts);
}

/// Handler of `int 0x80`.
pub(crate) fn handle_syscall(kernel: &mut Kernel, frame: &Registers) -> Resume {
    if kernel.tasks.current().is_none()
        || frame.interrupt_stack_frame.cs.dpl() != PrivilegeLevel::Ring3
    {
        panic!("Unexpected `int 0x80` from the kernel.");
    }
    kernel.dispatch_syscall(frame.gprs.eax, frame)
}

/// The task that issued the syscall being handled.
fn caller(kernel: &Kernel) -> TaskId {
    kernel
        .tasks
        .current()
        .expect("A syscall is issued by the current task.")
}

impl Kernel {
    /// Runs the handler of syscall `number`.
    ///
    /// Numbers without a handler do nothing and return 0. A failing handler
    /// returns the negative status of its error.
    pub fn dispatch_syscall(&mut self, number: u32, frame: &Registers) -> Resume {
        let Some(handler) = self.syscalls.get(number) else {
            debug!("Ignoring syscall {number}.");
            return Resume::Return(0);
        };
        match handler(self, frame) {
            Ok(resume) => resume,
            Err(e) => {
                debug!(
                    "Syscall {:?} failed: {e}",
                    SyscallNumber::try_from(number).map_err(|_| number)
                );
                Resume::Return(e.into_u32())
            }
        }
    }

    /// Reads the `index`-th word on the stack of `task`.
    ///
    /// Switches into the task's address space for the read and back to the
    /// kernel's before returning.
    ///
    /// # Panics
    /// If `task` is not in the ready queue.
    pub fn arg(&mut self, task: TaskId, index: usize) -> Result<u32, KernelError> {
        let task = match self.tasks.get(task) {
            Some(task) => task,
            None => panic!("Reading a syscall argument of {task:?}, which is not queued."),
        };
        let va = Va::new(task.registers().interrupt_stack_frame.esp)
            .checked_add(index * 4)
            .ok_or(KernelError::BadAddress)?;
        task.space().switch_into(&mut self.cpu);
        let mut word = [0; 4];
        let loaded = self.load_as(va, &mut word, PrivilegeLevel::Ring3);
        self.kernel_space.switch_into(&mut self.cpu);
        loaded?;
        Ok(u32::from_le_bytes(word))
    }
}
