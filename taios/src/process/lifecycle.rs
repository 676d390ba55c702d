//! Creation, teardown and heap accounting of processes.

use super::{Allocation, Pid, Process, ProcessState, command::CommandLine, program::MemorySection};
use crate::{
    Kernel, KernelError,
    config::USER_ARGUMENTS_VIRTUAL_ADDRESS,
    interrupt::Resume,
    keyboard::KeyboardBuffer,
    mm::page_table::PteFlags,
    process::program::Program,
    task::{Task, TaskId},
};
use abyss::{
    addressing::{PAGE_SIZE, Pa, Va},
    x86::PrivilegeLevel,
};
use arrayvec::ArrayVec;

impl Kernel {
    /// Creates a process from `command` without dispatching it.
    ///
    /// Claims a process slot, loads the program, builds its task, maps the
    /// program and installs the arguments. The new process becomes the
    /// current process, and the root process if there is none. Any failure
    /// releases what was acquired so far, in reverse order.
    ///
    /// # Returns
    /// - `Err(KernelError::TooManyProcesses)` if every slot is taken.
    /// - Whatever the loader or the mapping reports otherwise.
    pub fn spawn(&mut self, command: CommandLine) -> Result<Pid, KernelError> {
        let pid = self.processes.free_slot()?;
        let program = self.loader.load(command.program(), &mut self.memory)?;
        let task = self
            .tasks
            .push(Task::new(pid, program.entry(), program.stack_top()));

        if let Err(e) = self.map_program(task, &program) {
            self.free_task(task);
            program.release(&mut self.memory);
            return Err(e);
        }
        let arguments = match self.install_arguments(task, &command) {
            Ok(arguments) => arguments,
            Err(e) => {
                self.free_task(task);
                program.release(&mut self.memory);
                return Err(e);
            }
        };

        info!("Process {pid} created: {command}");
        self.processes.insert(Box::new(Process {
            pid,
            state: ProcessState::Ready,
            command,
            program: Some(program),
            arguments: Some(arguments),
            task,
            allocations: ArrayVec::new(),
            keyboard: KeyboardBuffer::new(),
        }));
        self.current_process = Some(pid);
        if self.root_process.is_none() {
            self.root_process = Some(pid);
        }
        Ok(pid)
    }

    /// Creates a process from `command` and invokes the scheduler.
    ///
    /// On success the CPU has switched to the task after the current one,
    /// which is the new process when it is the only one.
    pub fn create_process(&mut self, command: CommandLine) -> Result<Pid, KernelError> {
        let pid = self.spawn(command)?;
        self.switch_task();
        Ok(pid)
    }

    /// Terminates `pid` and dispatches the next task.
    ///
    /// May be called while a user task holds the CPU: its live registers are
    /// saved first, so it resumes where it stopped when it is scheduled
    /// again.
    pub fn terminate_process(&mut self, pid: Pid, status: i32) -> Resume {
        if self.cpu.privilege() == PrivilegeLevel::Ring3 {
            if let Some(task) = self.tasks.current() {
                let frame = *self.cpu.registers();
                self.save_task_state(task, &frame);
            }
        }
        self.teardown_process(pid, status);
        self.reschedule()
    }

    /// Releases everything `pid` owns: its task and address space, then the
    /// program memory, then the outstanding allocations, and finally its
    /// slot. The current process falls back to the root process; when the
    /// root itself terminates both are cleared.
    ///
    /// # Panics
    /// If `pid` is not a live process.
    pub(crate) fn teardown_process(&mut self, pid: Pid, status: i32) {
        let task = match self.processes.get(pid) {
            Some(process) => process.task,
            None => panic!("Terminating process {pid}, which does not exist."),
        };
        self.kernel_space.switch_into(&mut self.cpu);
        self.free_task(task);

        if let Some(process) = self.processes.get_mut(pid) {
            if let Some(program) = process.program.take() {
                program.release(&mut self.memory);
            }
            if let Some(arguments) = process.arguments.take() {
                self.memory.kfree(arguments.phys).unwrap_or_else(|e| {
                    warning!("Releasing the arguments of process {pid}: {e}");
                });
            }
            for allocation in process.allocations.drain(..) {
                self.memory.kfree(allocation.ptr).unwrap_or_else(|e| {
                    warning!("Releasing {:?} of process {pid}: {e}", allocation.ptr);
                });
            }
        }
        if let Some(process) = self.processes.remove(pid) {
            info!(
                "Process {pid} ({}) exited with status {status}.",
                process.command.program()
            );
        }

        if self.root_process == Some(pid) {
            self.root_process = None;
            self.current_process = None;
        } else {
            self.current_process = self.root_process;
        }
    }

    /// Gives `size` bytes of zeroed heap memory to `pid`.
    ///
    /// The block is mapped into the process at the address equal to its
    /// physical address, so the returned pointer is directly usable by the
    /// process.
    ///
    /// # Returns
    /// - `Err(KernelError::NoMemory)` if the heap is exhausted or `size` is 0.
    /// - `Err(KernelError::TooManyAllocations)` if the allocation table of the
    ///   process is full. The block is returned to the heap.
    pub fn allocate(&mut self, pid: Pid, size: usize) -> Result<Pa, KernelError> {
        let process = self
            .processes
            .get_mut(pid)
            .ok_or(KernelError::InvalidArgument)?;
        let ptr = self.memory.kzalloc(size)?;
        if process.allocations.try_push(Allocation { ptr, size }).is_err() {
            self.memory.kfree(ptr)?;
            return Err(KernelError::TooManyAllocations);
        }
        let mapped = match self.tasks.get_mut(process.task) {
            Some(task) => task.space_mut().map(
                Va::new(ptr.into_u32()),
                ptr,
                size,
                PteFlags::P | PteFlags::RW | PteFlags::US,
            ),
            None => Err(KernelError::BadAddress),
        };
        if let Err(e) = mapped {
            process.allocations.pop();
            self.memory.kfree(ptr)?;
            return Err(e);
        }
        Ok(ptr)
    }

    /// Takes back the block at `ptr` from `pid`.
    ///
    /// The process loses access to the block before the block returns to
    /// the heap. A pointer the process was not given is ignored.
    pub fn deallocate(&mut self, pid: Pid, ptr: Pa) -> Result<(), KernelError> {
        let process = self
            .processes
            .get_mut(pid)
            .ok_or(KernelError::InvalidArgument)?;
        let Some(index) = process.allocations.iter().position(|a| a.ptr == ptr) else {
            return Ok(());
        };
        let Allocation { ptr, size } = process.allocations[index];
        if let Some(task) = self.tasks.get_mut(process.task) {
            task.space_mut().unmap(Va::new(ptr.into_u32()), size)?;
        }
        self.memory.kfree(ptr)?;
        process.allocations.remove(index);
        Ok(())
    }

    fn map_program(&mut self, task: TaskId, program: &Program) -> Result<(), KernelError> {
        let space = match self.tasks.get_mut(task) {
            Some(task) => task.space_mut(),
            None => return Err(KernelError::BadAddress),
        };
        for section in program
            .sections()
            .iter()
            .chain(core::iter::once(program.stack()))
        {
            space.map(section.virt, section.phys, section.size, section.flags)?;
        }
        Ok(())
    }

    /// Lays out `argc`, `argv` and the argument strings in a fresh page and
    /// maps it right above the initial stack pointer.
    ///
    /// ```text
    /// +0   argc
    /// +4   argv ─────┐
    /// +8   argv[0] <─┘ ──> "prog\0"
    /// +12  argv[1]     ──> "a\0"
    ///      ...
    ///      NULL
    ///      strings
    /// ```
    fn install_arguments(
        &mut self,
        task: TaskId,
        command: &CommandLine,
    ) -> Result<MemorySection, KernelError> {
        let base = USER_ARGUMENTS_VIRTUAL_ADDRESS;
        let argc = command.argc();
        let table = 8 + 4 * (argc + 1);
        let strings: usize = command.words().iter().map(|word| word.len() + 1).sum();
        if table + strings > PAGE_SIZE {
            return Err(KernelError::NameTooLong);
        }

        let mut page = vec![0u8; PAGE_SIZE];
        page[0..4].copy_from_slice(&(argc as u32).to_le_bytes());
        page[4..8].copy_from_slice(&(base + 8).into_u32().to_le_bytes());
        let mut at = table;
        for (i, word) in command.words().iter().enumerate() {
            let slot = 8 + 4 * i;
            page[slot..slot + 4].copy_from_slice(&(base + at).into_u32().to_le_bytes());
            page[at..at + word.len()].copy_from_slice(word.as_bytes());
            at += word.len() + 1;
        }

        let flags = PteFlags::P | PteFlags::RW | PteFlags::US;
        let pa = self.memory.kzalloc(PAGE_SIZE)?;
        let installed = self.memory.write(pa, &page).and_then(|_| match self.tasks.get_mut(task) {
            Some(task) => task.space_mut().map(base, pa, PAGE_SIZE, flags),
            None => Err(KernelError::BadAddress),
        });
        if let Err(e) = installed {
            self.memory.kfree(pa)?;
            return Err(e);
        }
        Ok(MemorySection {
            phys: pa,
            virt: base,
            size: PAGE_SIZE,
            flags,
        })
    }
}
