//! # TaiOS kernel core
//!
//! TaiOS is a small protected-mode kernel for a single 32-bit x86 processor.
//! This crate is the part of it that turns a program on disk into an isolated,
//! preemptively scheduled process and that guards the boundary between user
//! and kernel privilege:
//!
//! - [`mm`]: the kernel heap and two-level [`AddressSpace`]s.
//! - [`task`]: saved execution contexts and the round-robin ready queue.
//! - [`process`]: the process table, program loading and teardown, and the
//!   per-process heap accounting.
//! - [`syscall`]: the syscall table, argument fetching and cross-space copies.
//! - [`interrupt`]: the interrupt wrapper and the timer, keyboard and fault
//!   handlers.
//!
//! ## Execution model
//!
//! There is exactly one CPU and no true parallelism. Execution moves from one
//! task to another only inside an interrupt: a timer tick, a syscall that
//! creates or ends a process, or a fault. Every handler runs with interrupts
//! masked, so the process table, the ready queue and the syscall table are
//! only ever touched by one writer.
//!
//! The machine is simulated by [`abyss`]. The [`Kernel`] object owns it
//! together with every kernel table, and [`Kernel::interrupt`] is the single
//! entry point from the machine into the kernel. An operation that "does not
//! return" on real hardware, such as a task switch, here loads the next task
//! into the CPU and reports it through [`interrupt::Resume::Switched`]; the
//! caller then unwinds back to the dispatch loop.
//!
//! [`AddressSpace`]: mm::AddressSpace

#[macro_use]
extern crate abyss;

pub mod config;
pub mod fs;
pub mod interrupt;
pub mod kernel;
pub mod keyboard;
pub mod loader;
pub mod mm;
pub mod process;
pub mod syscall;
pub mod task;
pub mod teletype;

pub use abyss::{addressing, debug, info, print, println, warning};
pub use kernel::Kernel;

/// Enum representing errors that can occur during a kernel operation.
///
/// Each variant is a failure a caller can recover from. When it reaches user
/// code it is turned into a negative status word by
/// [`KernelError::into_status`]. Invariant violations inside the kernel are
/// not represented here; they panic.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum KernelError {
    /// No such file or directory. (ENOENT)
    NoSuchEntry,
    /// IO Error. (EIO)
    IOError,
    /// Exec format error. (ENOEXEC)
    NoExec,
    /// Every process slot is taken. (EAGAIN)
    TooManyProcesses,
    /// Out of memory. (ENOMEM)
    NoMemory,
    /// Bad address. (EFAULT)
    BadAddress,
    /// Invalid arguement. (EINVAL)
    InvalidArgument,
    /// Command line too long. (ENAMETOOLONG)
    NameTooLong,
    /// The allocation table of the process is full. (ENOBUFS)
    TooManyAllocations,
}

impl KernelError {
    /// Converts the [`KernelError`] into the status code returned to user
    /// programs.
    pub fn into_status(self) -> i32 {
        match self {
            KernelError::NoSuchEntry => -2,
            KernelError::IOError => -5,
            KernelError::NoExec => -8,
            KernelError::TooManyProcesses => -11,
            KernelError::NoMemory => -12,
            KernelError::BadAddress => -14,
            KernelError::InvalidArgument => -22,
            KernelError::NameTooLong => -36,
            KernelError::TooManyAllocations => -105,
        }
    }

    /// The status code as the 32-bit word placed in `eax`.
    pub fn into_u32(self) -> u32 {
        self.into_status() as u32
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?} ({})", self.into_status())
    }
}

/// The given `i32` does not indicate an [`KernelError`].
#[derive(Debug, Eq, PartialEq)]
pub struct TryFromError {
    e: i32,
}

impl TryFrom<i32> for KernelError {
    type Error = TryFromError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -2 => Ok(Self::NoSuchEntry),
            -5 => Ok(Self::IOError),
            -8 => Ok(Self::NoExec),
            -11 => Ok(Self::TooManyProcesses),
            -12 => Ok(Self::NoMemory),
            -14 => Ok(Self::BadAddress),
            -22 => Ok(Self::InvalidArgument),
            -36 => Ok(Self::NameTooLong),
            -105 => Ok(Self::TooManyAllocations),
            e => Err(TryFromError { e }),
        }
    }
}
