//! # Processes
//!
//! A [`Process`] is what the rest of the system sees of a running program:
//! the loaded [`Program`], the [`Task`](crate::task::Task) that executes it,
//! the heap memory it asked for, and its keyboard input.
//!
//! ## Process table
//!
//! Processes live in a fixed number of slots. A process id is the index of
//! its slot, so an id is unique among live processes and becomes available
//! again once its process terminates.
//!
//! ## Ownership
//!
//! ```text
//!   Process ──owns──> Program sections, stack, argument page (heap memory)
//!      │     ──owns──> Allocations made through `malloc`
//!      └────names───> Task (in the ready queue) ──owns──> AddressSpace
//! ```
//!
//! Teardown runs in that order: the task and its address space first, so no
//! schedulable context can still reach the memory that is released next.

pub mod command;
mod lifecycle;
pub mod program;

use crate::{
    KernelError, config::MAX_ALLOCATIONS_PER_PROCESS, keyboard::KeyboardBuffer, task::TaskId,
};
use abyss::addressing::Pa;
use arrayvec::ArrayVec;
use command::CommandLine;
use program::{MemorySection, Program};

/// Process id: the slot index in the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(usize);

impl Pid {
    /// Builds an id from a slot index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The slot index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, never dispatched. Its task still holds the loader-seeded
    /// registers.
    Ready,
    /// Dispatched at least once.
    Running,
}

/// A block of kernel heap memory handed to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Start of the block; also the address the process sees it at.
    pub ptr: Pa,
    /// Requested size in bytes.
    pub size: usize,
}

/// A process.
pub struct Process {
    pid: Pid,
    state: ProcessState,
    command: CommandLine,
    program: Option<Program>,
    arguments: Option<MemorySection>,
    task: TaskId,
    allocations: ArrayVec<Allocation, MAX_ALLOCATIONS_PER_PROCESS>,
    keyboard: KeyboardBuffer,
}

impl Process {
    /// The id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The scheduling state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Marks the process dispatched.
    pub(crate) fn mark_running(&mut self) {
        self.state = ProcessState::Running;
    }

    /// The command line the process was started with.
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// The loaded program.
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// The page holding `argc` and `argv`.
    pub fn arguments(&self) -> Option<&MemorySection> {
        self.arguments.as_ref()
    }

    /// The task executing the process.
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Live allocations, oldest first.
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// The keyboard input of the process.
    pub fn keyboard(&self) -> &KeyboardBuffer {
        &self.keyboard
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("command", &self.command)
            .field("task", &self.task)
            .field("allocations", &self.allocations.len())
            .finish()
    }
}

/// The fixed-size table of processes.
pub struct ProcessTable {
    slots: Vec<Option<Box<Process>>>,
}

impl ProcessTable {
    /// Creates a table with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live processes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns true if no process is live.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// The lowest free slot.
    ///
    /// # Returns
    /// - `Err(KernelError::TooManyProcesses)` if every slot is taken.
    pub fn free_slot(&self) -> Result<Pid, KernelError> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(Pid)
            .ok_or(KernelError::TooManyProcesses)
    }

    /// Puts `process` into its slot.
    ///
    /// # Panics
    /// If the slot is taken.
    pub(crate) fn insert(&mut self, process: Box<Process>) {
        let pid = process.pid;
        match self.slots.get_mut(pid.0) {
            Some(slot) if slot.is_none() => *slot = Some(process),
            _ => panic!("Process slot {pid} is already taken or out of range."),
        }
    }

    /// Empties slot `pid`.
    pub(crate) fn remove(&mut self, pid: Pid) -> Option<Box<Process>> {
        self.slots.get_mut(pid.0).and_then(Option::take)
    }

    /// The process in slot `pid`.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slots.get(pid.0).and_then(|slot| slot.as_deref())
    }

    pub(crate) fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.slots.get_mut(pid.0).and_then(|slot| slot.as_deref_mut())
    }

    /// Walks the live processes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Process> + '_ {
        self.slots.iter().filter_map(|slot| slot.as_deref())
    }
}
