//! Test tooling for the TaiOS kernel core.
//!
//! Tests boot an independent [`Kernel`] on a small machine, launch programs
//! from an in-memory filesystem and then play the part of the user program:
//! they push syscall arguments on the user stack with [`syscall!`], touch
//! user memory with [`user_store`] and [`user_load`], and inject hardware
//! events with [`Kernel::tick`] and [`Kernel::press_key`].

use abyss::{
    addressing::{PAGE_SIZE, Va},
    x86::PrivilegeLevel,
};
use taios::{
    Kernel, KernelError,
    config::Config,
    fs::MemFs,
    loader::{FlatBinaryLoader, ProgramLoader},
    process::{Pid, command::CommandLine},
    syscall::SyscallNumber,
};

pub use abyss;
pub use taios;

/// A program image. The kernel never decodes instructions, so any bytes do.
pub const PROGRAM: &[u8] = &[0x90; 64];

/// A program image spanning three pages.
pub const LARGE_PROGRAM: &[u8] = &[0xCC; 3 * PAGE_SIZE - 100];

/// The filesystem every test kernel boots with.
///
/// - `shell`, `prog`, `echo`: small programs.
/// - `large`: a program that spans several pages.
/// - `empty`: a zero-length file, which no loader accepts.
pub fn filesystem() -> MemFs {
    MemFs::new()
        .with("shell", PROGRAM)
        .with("prog", PROGRAM)
        .with("echo", PROGRAM)
        .with("large", LARGE_PROGRAM)
        .with("empty", Vec::<u8>::new())
}

/// A machine with 32 MiB of memory, the upper half of it heap, and room for
/// `max_processes` processes.
pub fn config(max_processes: usize) -> Config {
    Config {
        max_processes,
        ..Config::default()
    }
}

/// Boots a quiet kernel with room for four processes.
pub fn boot() -> Kernel {
    boot_with(config(4))
}

/// Boots a quiet kernel on `config`.
pub fn boot_with(config: Config) -> Kernel {
    boot_with_loader(config, FlatBinaryLoader::new(filesystem()))
}

/// Boots a quiet kernel on `config` that loads programs with `loader`.
pub fn boot_with_loader(config: Config, loader: impl ProgramLoader + 'static) -> Kernel {
    abyss::QUITE.store(true, core::sync::atomic::Ordering::SeqCst);
    Kernel::new(config, loader).expect("Failed to boot.")
}

/// Boots a kernel and launches `command` as the root process.
pub fn boot_and_launch(command: &str) -> (Kernel, Pid) {
    let mut kernel = boot();
    let pid = kernel.launch(command).expect("Failed to launch.");
    (kernel, pid)
}

/// Creates a process without dispatching it.
pub fn spawn(kernel: &mut Kernel, command: &str) -> Result<Pid, KernelError> {
    kernel.spawn(CommandLine::parse(command)?)
}

/// Execute a syscall instruction with given arguments.
///
/// The arguments are pushed on the running task's stack, last one first, the
/// number is put in `eax` and `int 0x80` is raised. Evaluates to the `i32`
/// the caller sees in `eax`.
#[macro_export]
macro_rules! syscall {
    ($kernel:expr_2021, $nr:expr_2021 $(, $arg:expr_2021)* $(,)?) => {
        $crate::invoke_syscall($kernel, $nr, &[$(($arg) as u32),*])
    };
}

/// Implementation of [`syscall!`].
///
/// If the syscall switched to another task, the result is the one saved for
/// the caller, which it sees when it runs again; a caller that no longer
/// exists yields 0.
pub fn invoke_syscall(kernel: &mut Kernel, nr: SyscallNumber, args: &[u32]) -> i32 {
    invoke_raw_syscall(kernel, nr as u32, args)
}

/// Like [`invoke_syscall`], with an arbitrary number in `eax`.
pub fn invoke_raw_syscall(kernel: &mut Kernel, nr: u32, args: &[u32]) -> i32 {
    let caller = kernel
        .current_task()
        .expect("Issuing a syscall without a running task.");
    assert_eq!(
        kernel.cpu().privilege(),
        PrivilegeLevel::Ring3,
        "Issuing a syscall from the kernel."
    );

    for arg in args.iter().rev() {
        let esp = kernel.cpu().registers().interrupt_stack_frame.esp - 4;
        kernel
            .store_u32(Va::new(esp), *arg)
            .expect("Failed to push a syscall argument.");
        *kernel.cpu_mut().registers_mut().esp() = esp;
    }
    *kernel.cpu_mut().registers_mut().eax() = nr;
    kernel.syscall();

    if kernel.current_task() == Some(caller) && kernel.cpu().privilege() == PrivilegeLevel::Ring3
    {
        *kernel.cpu_mut().registers_mut().esp() += 4 * args.len() as u32;
        kernel.cpu().registers().gprs.eax as i32
    } else {
        kernel
            .task(caller)
            .map_or(0, |task| task.registers().gprs.eax as i32)
    }
}

/// Stores `data` at `va` as the running user program would. A failed
/// access raises the page fault, just like the MMU.
pub fn user_store(kernel: &mut Kernel, va: Va, data: &[u8]) -> Result<(), KernelError> {
    if let Err(fault) = kernel.store(va, data) {
        kernel.raise_page_fault(fault.va);
        return Err(fault.into());
    }
    Ok(())
}

/// Loads from `va` as the running user program would. A failed access
/// raises the page fault.
pub fn user_load(kernel: &mut Kernel, va: Va, len: usize) -> Result<Vec<u8>, KernelError> {
    let mut buf = vec![0; len];
    if let Err(fault) = kernel.load(va, &mut buf) {
        kernel.raise_page_fault(fault.va);
        return Err(fault.into());
    }
    Ok(buf)
}

/// Loads a 32-bit word as the running user program would.
pub fn user_load_u32(kernel: &mut Kernel, va: Va) -> Result<u32, KernelError> {
    let word = user_load(kernel, va, 4)?;
    Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// Reads a NUL-terminated string of the running program.
pub fn user_cstr(kernel: &mut Kernel, va: Va) -> String {
    let mut bytes = Vec::new();
    let mut at = va;
    loop {
        let byte = user_load(kernel, at, 1).expect("Unreadable string.")[0];
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        at += 1;
    }
    String::from_utf8(bytes).expect("Invalid UTF-8.")
}

/// `malloc`s a buffer in the running program and fills it with `data`.
pub fn user_buffer(kernel: &mut Kernel, data: &[u8]) -> Va {
    let ptr = syscall!(kernel, SyscallNumber::Malloc, data.len().max(1)) as u32;
    assert_ne!(ptr, 0, "malloc failed.");
    let va = Va::new(ptr);
    user_store(kernel, va, data).expect("Failed to fill a user buffer.");
    va
}

/// Builds the command list `exec` takes in the running program's memory.
///
/// The first node points at every word, each followed by a NUL; node `i`
/// points at word `i` within that buffer.
pub fn user_command_list(kernel: &mut Kernel, words: &[&str]) -> Va {
    let mut blob = Vec::new();
    let mut offsets = Vec::new();
    for word in words {
        offsets.push(blob.len() as u32);
        blob.extend_from_slice(word.as_bytes());
        blob.push(0);
    }
    blob.push(0);
    let blob = user_buffer(kernel, &blob);

    let nodes = user_buffer(kernel, &vec![0; 8 * words.len()]);
    for (i, offset) in offsets.iter().enumerate() {
        let node = nodes + 8 * i;
        let next = if i + 1 < words.len() {
            (nodes + 8 * (i + 1)).into_u32()
        } else {
            0
        };
        let value = blob.into_u32() + offset;
        user_store(kernel, node, &value.to_le_bytes()).expect("Failed to build a node.");
        user_store(kernel, node + 4, &next.to_le_bytes()).expect("Failed to build a node.");
    }
    nodes
}

/// Reloads the address space of the current task, as the kernel does on its
/// way back to user mode. Needed after calling kernel operations that end in
/// the kernel's address space directly from a test.
pub fn reload_current_space(kernel: &mut Kernel) {
    let task = kernel.current_task().expect("No current task.");
    let root = kernel.task(task).expect("Stale current task.").space().root();
    kernel.cpu_mut().load_cr3(root);
}

/// Checks the structure of the ready queue.
///
/// It ensures that:
/// - Walking from the head reaches every queued task exactly once and ends
///   at the tail.
/// - Every task's predecessor names it as its successor, and vice versa.
/// - The current task, if any, is queued.
pub fn check_ready_queue(kernel: &Kernel) {
    let tasks = kernel.tasks();
    let order: Vec<_> = tasks.iter().collect();
    assert_eq!(order.len(), tasks.len());
    assert_eq!(order.first().copied(), tasks.head());
    assert_eq!(order.last().copied(), tasks.tail());
    for (i, id) in order.iter().enumerate() {
        let (prev, next) = tasks.links(*id).expect("Queued task is not live.");
        assert_eq!(prev, i.checked_sub(1).map(|j| order[j]));
        assert_eq!(next, order.get(i + 1).copied());
    }
    match tasks.current() {
        Some(current) => assert!(tasks.contains(current)),
        None => assert!(tasks.is_empty()),
    }
}

/// Checks that processes and tasks name each other.
///
/// It ensures that:
/// - Every live process sits in the slot of its id and owns a queued task
///   that points back at it.
/// - Every queued task belongs to a live process.
/// - The current and root processes, if any, are live.
pub fn check_process_table(kernel: &Kernel) {
    for (i, process) in kernel.processes().iter().enumerate() {
        let pid = process.pid();
        assert!(kernel.process(pid).is_some());
        let task = kernel.task(process.task()).expect("Process without a task.");
        assert_eq!(task.process(), pid);
        assert!(
            kernel.processes().iter().skip(i + 1).all(|other| other.pid() != pid),
            "Two processes share id {pid}."
        );
    }
    for id in kernel.tasks().iter() {
        let task = kernel.task(id).expect("Queued task is not live.");
        let process = kernel.process(task.process()).expect("Task without a process.");
        assert_eq!(process.task(), id);
    }
    assert_eq!(kernel.tasks().len(), kernel.processes().len());
    if let Some(pid) = kernel.current_process() {
        assert!(kernel.process(pid).is_some());
    }
    if let Some(pid) = kernel.root_process() {
        assert!(kernel.process(pid).is_some());
    }
}
