//! Context switching.

use super::TaskId;
use crate::{Kernel, interrupt::Resume, process::ProcessState};
use abyss::{interrupt::Registers, x86::Rflags};

impl Kernel {
    /// Records the interrupted registers of `task`.
    ///
    /// Only a task whose process is running is updated: a task that has not
    /// been dispatched yet keeps the entry point and stack its loader seeded.
    ///
    /// # Panics
    /// If `task` is not in the ready queue.
    pub fn save_task_state(&mut self, task: TaskId, frame: &Registers) {
        let pid = match self.tasks.get(task) {
            Some(task) => task.process(),
            None => panic!("Saving the state of {task:?}, which is not in the ready queue."),
        };
        let running = self
            .processes
            .get(pid)
            .is_some_and(|process| process.state() == ProcessState::Running);
        if running {
            if let Some(task) = self.tasks.get_mut(task) {
                task.save_state(frame);
            }
        }
    }

    /// Dispatches the task after the current one.
    ///
    /// Makes it current, marks its process running, loads its address space
    /// and resumes it. The interrupted context is abandoned; the caller
    /// unwinds to the dispatch loop.
    ///
    /// # Panics
    /// If the ready queue is empty.
    pub fn switch_task(&mut self) -> Resume {
        let next = self.tasks.next();
        self.tasks.set_current(next);
        let task = self.tasks.get(next).expect("The next task is queued.");
        if let Some(process) = self.processes.get_mut(task.process()) {
            if process.state() == ProcessState::Ready {
                process.mark_running();
            }
        }
        task.space().switch_into(&mut self.cpu);
        self.cpu.iret(task.registers());
        Resume::Switched
    }

    /// Dispatches the next task, or idles the CPU in the kernel when no task
    /// is left.
    pub(crate) fn reschedule(&mut self) -> Resume {
        if !self.tasks.is_empty() {
            return self.switch_task();
        }
        info!("No task left to run.");
        self.kernel_space.switch_into(&mut self.cpu);
        let mut idle = Registers::kernel();
        idle.interrupt_stack_frame.eflags |= Rflags::IF;
        self.cpu.iret(&idle);
        Resume::Switched
    }

    /// Releases the address space of `task`, then unlinks it from the ready
    /// queue.
    ///
    /// # Panics
    /// If `task` is not in the ready queue, or its address space is loaded.
    pub(crate) fn free_task(&mut self, task: TaskId) {
        match self.tasks.get_mut(task) {
            Some(task) => task.space_mut().free(&self.cpu),
            None => panic!("Freeing {task:?}, which is not in the ready queue."),
        }
        drop(self.tasks.remove(task));
    }
}
