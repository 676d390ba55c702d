//! The kernel object.
//!
//! [`Kernel`] owns the machine and every kernel-wide table: the process
//! table, the ready queue, the syscall and interrupt tables, the heap and the
//! kernel's own address space. Nothing is a free-standing static, so any
//! number of kernels can be booted side by side.
//!
//! ## Dispatch loop
//!
//! The machine enters the kernel only through [`Kernel::interrupt`]. A
//! hardware interrupt that arrives while the CPU has interrupts masked is
//! latched by the interrupt controller and delivered, in arrival order, as
//! soon as the CPU resumes with interrupts enabled. Exceptions and `int 0x80`
//! are taken immediately.
//!
//! ```text
//!   interrupt(v) ──masked IRQ──> PIC pending
//!        │
//!        v
//!   deliver(v) ──> handler ──> iret into current task
//!        ^                           │
//!        └──── pending IRQs <────────┘ (while interrupts are enabled)
//! ```

use crate::{
    KernelError,
    config::Config,
    interrupt::{self, Exception, InterruptTable, KEYBOARD_VECTOR, SYSCALL_VECTOR, TIMER_VECTOR},
    keyboard::KeyboardBuffer,
    loader::ProgramLoader,
    mm::{AddressSpace, KernelMemory, PageFault, page_table::PteFlags},
    process::{Pid, Process, ProcessTable, command::CommandLine},
    syscall::{self, SyscallTable},
    task::{ReadyQueue, Task, TaskId},
    teletype::Console,
};
use abyss::{
    addressing::Va,
    cpu::{Cpu, Cr3},
    dev::{keyboard::KeyboardPort, pic::Pic},
    interrupt::InterruptState,
    x86::PrivilegeLevel,
};

/// The kernel: machine, tables and the dispatch loop.
pub struct Kernel {
    pub(crate) config: Config,
    pub(crate) cpu: Cpu,
    pub(crate) pic: Pic,
    pub(crate) keyboard_port: KeyboardPort,
    pub(crate) memory: KernelMemory,
    pub(crate) kernel_space: AddressSpace,
    pub(crate) tasks: ReadyQueue,
    pub(crate) processes: ProcessTable,
    pub(crate) current_process: Option<Pid>,
    pub(crate) root_process: Option<Pid>,
    pub(crate) syscalls: SyscallTable,
    pub(crate) interrupts: InterruptTable,
    pub(crate) loader: Box<dyn ProgramLoader>,
    pub(crate) keyboard: KeyboardBuffer,
    pub(crate) console: Console,
}

fn active<'a>(kernel_space: &'a AddressSpace, tasks: &'a ReadyQueue, cr3: Option<Cr3>) -> &'a AddressSpace {
    match cr3 {
        Some(root) if root == kernel_space.root() => kernel_space,
        Some(root) => match tasks.find_by_root(root).and_then(|id| tasks.get(id)) {
            Some(task) => task.space(),
            None => panic!("CR3 ({root:?}) points at a released page directory."),
        },
        None => panic!("Paging is not enabled."),
    }
}

impl Kernel {
    /// Boots a kernel on a fresh machine.
    ///
    /// Installs memory and the heap, builds the identity-mapped kernel
    /// address space and switches into it, fills the interrupt and syscall
    /// tables, and finally enables interrupts. No process exists yet; see
    /// [`Kernel::launch`].
    pub fn new(config: Config, loader: impl ProgramLoader + 'static) -> Result<Self, KernelError> {
        let memory = KernelMemory::new(&config)?;
        let mut cpu = Cpu::new();
        let kernel_space = AddressSpace::new(PteFlags::P | PteFlags::RW);
        kernel_space.switch_into(&mut cpu);

        let mut interrupts = InterruptTable::new();
        interrupt::register_handlers(&mut interrupts);
        let mut syscalls = SyscallTable::new();
        syscall::register_syscalls(&mut syscalls);

        info!(
            "Booting TaiOS: {} KiB of memory, {} KiB heap at {:?}.",
            config.memory_size / 1024,
            config.heap_size / 1024,
            config.heap_start
        );

        let mut kernel = Self {
            processes: ProcessTable::new(config.max_processes),
            config,
            cpu,
            pic: Pic::new(),
            keyboard_port: KeyboardPort::default(),
            memory,
            kernel_space,
            tasks: ReadyQueue::new(),
            current_process: None,
            root_process: None,
            syscalls,
            interrupts,
            loader: Box::new(loader),
            keyboard: KeyboardBuffer::new(),
            console: Console::default(),
        };
        kernel.cpu.enable_interrupts();
        Ok(kernel)
    }

    /// Creates the first process from `command` and dispatches it.
    ///
    /// The first process becomes the root process, the one the kernel falls
    /// back to whenever a process terminates.
    pub fn launch(&mut self, command: &str) -> Result<Pid, KernelError> {
        let command = CommandLine::parse(command)?;
        self.create_process(command)
    }

    /// Entry point of every interrupt, exception and syscall.
    ///
    /// Maskable hardware interrupts raised while interrupts are disabled stay
    /// pending until the CPU enables them again.
    pub fn interrupt(&mut self, vector: u8) {
        if Pic::is_irq(vector) && self.cpu.interrupt_state() == InterruptState::Off {
            self.pic.raise(vector);
            return;
        }
        self.deliver(vector);
        self.drain_pending();
    }

    /// `sti` on behalf of the running code. Interrupts that arrived while
    /// they were masked are taken right away.
    pub fn enable_interrupts(&mut self) {
        self.cpu.enable_interrupts();
        self.drain_pending();
    }

    /// `cli` on behalf of the running code.
    pub fn disable_interrupts(&mut self) {
        self.cpu.disable_interrupts();
    }

    fn drain_pending(&mut self) {
        while self.cpu.interrupt_state() == InterruptState::On {
            match self.pic.take_pending() {
                Some(vector) => self.deliver(vector),
                None => break,
            }
        }
    }

    /// Raises the timer interrupt.
    pub fn tick(&mut self) {
        self.interrupt(TIMER_VECTOR);
    }

    /// Latches `key` in the keyboard controller and raises its interrupt.
    pub fn press_key(&mut self, key: u8) {
        self.keyboard_port.press(key);
        self.interrupt(KEYBOARD_VECTOR);
    }

    /// Executes `int 0x80` on behalf of the running user program.
    pub fn syscall(&mut self) {
        self.interrupt(SYSCALL_VECTOR);
    }

    /// Raises a page fault for an access to `va`.
    pub fn raise_page_fault(&mut self, va: Va) {
        self.cpu.set_cr2(va.into_u32());
        self.interrupt(Exception::PageFault as u8);
    }

    /// Raises a divide error, as `div` with a zero divisor does.
    pub fn raise_divide_error(&mut self) {
        self.interrupt(Exception::DivideError as u8);
    }

    /// The address space selected by `cr3`.
    ///
    /// # Panics
    /// If `cr3` names a space that no longer exists.
    pub fn active_space(&self) -> &AddressSpace {
        active(&self.kernel_space, &self.tasks, self.cpu.cr3())
    }

    /// Loads from `va` through the active address space with the CPU's
    /// current privilege, as an instruction of the running code would.
    pub fn load(&self, va: Va, buf: &mut [u8]) -> Result<(), PageFault> {
        self.load_as(va, buf, self.cpu.privilege())
    }

    /// Stores `data` at `va` through the active address space with the
    /// CPU's current privilege.
    pub fn store(&mut self, va: Va, data: &[u8]) -> Result<(), PageFault> {
        self.store_as(va, data, self.cpu.privilege())
    }

    pub(crate) fn load_as(
        &self,
        va: Va,
        buf: &mut [u8],
        privilege: PrivilegeLevel,
    ) -> Result<(), PageFault> {
        active(&self.kernel_space, &self.tasks, self.cpu.cr3()).read(
            self.memory.physical(),
            va,
            buf,
            privilege,
        )
    }

    pub(crate) fn store_as(
        &mut self,
        va: Va,
        data: &[u8],
        privilege: PrivilegeLevel,
    ) -> Result<(), PageFault> {
        active(&self.kernel_space, &self.tasks, self.cpu.cr3()).write(
            self.memory.physical_mut(),
            va,
            data,
            privilege,
        )
    }

    /// Loads a 32-bit word through the active address space.
    pub fn load_u32(&self, va: Va) -> Result<u32, PageFault> {
        let mut word = [0; 4];
        self.load(va, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Stores a 32-bit word through the active address space.
    pub fn store_u32(&mut self, va: Va, value: u32) -> Result<(), PageFault> {
        self.store(va, &value.to_le_bytes())
    }

    /// The boot configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The processor.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// The processor, mutably. Used to play the part of user code.
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// The interrupt controller.
    pub fn pic(&self) -> &Pic {
        &self.pic
    }

    /// Physical memory and the kernel heap.
    pub fn memory(&self) -> &KernelMemory {
        &self.memory
    }

    /// The kernel's own address space.
    pub fn kernel_space(&self) -> &AddressSpace {
        &self.kernel_space
    }

    /// The ready queue.
    pub fn tasks(&self) -> &ReadyQueue {
        &self.tasks
    }

    /// The task that owns the CPU.
    pub fn current_task(&self) -> Option<TaskId> {
        self.tasks.current()
    }

    /// The task behind `id`.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// The process table.
    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    /// The process in slot `pid`.
    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(pid)
    }

    /// The process receiving keyboard input.
    pub fn current_process(&self) -> Option<Pid> {
        self.current_process
    }

    /// The first process ever created, unless it has terminated.
    pub fn root_process(&self) -> Option<Pid> {
        self.root_process
    }

    /// The process whose task owns the CPU.
    pub fn running_process(&self) -> Option<Pid> {
        self.tasks
            .current()
            .and_then(|id| self.tasks.get(id))
            .map(|task| task.process())
    }

    /// The terminal the user programs write to.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// The terminal, mutably.
    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    /// The keyboard queue of the kernel itself.
    pub fn keyboard(&self) -> &KeyboardBuffer {
        &self.keyboard
    }
}
