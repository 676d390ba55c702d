//! `exec` and `exit`.

use super::{caller, uaccess::UserCommandList};
use crate::{Kernel, KernelError, interrupt::Resume};
use abyss::{addressing::Va, interrupt::Registers};

/// `exec(list)`: starts the program named by a command list.
///
/// On success the caller will see 0 once it is scheduled again, and the CPU
/// moves on to the next task.
pub(super) fn exec(kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    let task = caller(kernel);
    let list = Va::new(kernel.arg(task, 0)?);
    if list.is_null() {
        return Err(KernelError::InvalidArgument);
    }
    let command = UserCommandList::new(task, list).get(kernel)?;
    kernel.spawn(command)?;
    if let Some(task) = kernel.tasks.get_mut(task) {
        *task.registers_mut().eax() = 0;
    }
    Ok(kernel.switch_task())
}

/// `exit(status)`: terminates the calling process.
///
/// Interrupts stay masked across the teardown so that no tick can dispatch a
/// half released process.
pub(super) fn exit(kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    let task = caller(kernel);
    let status = kernel.arg(task, 0)? as i32;
    let pid = kernel
        .tasks
        .get(task)
        .expect("The calling task is queued.")
        .process();
    kernel.cpu.disable_interrupts();
    kernel.teardown_process(pid, status);
    kernel.cpu.enable_interrupts();
    kernel.pic.end_of_interrupt();
    Ok(kernel.reschedule())
}
