//! `malloc` and `free`.

use super::caller;
use crate::{Kernel, KernelError, interrupt::Resume, process::Pid};
use abyss::{addressing::Pa, interrupt::Registers};

fn calling_process(kernel: &Kernel) -> Pid {
    kernel
        .tasks
        .get(caller(kernel))
        .expect("The calling task is queued.")
        .process()
}

/// `malloc(size)`: returns a pointer to `size` zeroed bytes, or 0.
pub(super) fn malloc(kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    let size = kernel.arg(caller(kernel), 0)? as usize;
    let pid = calling_process(kernel);
    match kernel.allocate(pid, size) {
        Ok(ptr) => Ok(ptr.into_u32().into()),
        Err(e) => {
            debug!("malloc({size}) of process {pid} failed: {e}");
            Ok(Resume::Return(0))
        }
    }
}

/// `free(ptr)`: releases a block obtained from `malloc`. Always returns 0.
pub(super) fn free(kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    let ptr = kernel.arg(caller(kernel), 0)?;
    let pid = calling_process(kernel);
    if let Err(e) = kernel.deallocate(pid, Pa::new(ptr)) {
        warning!("free({ptr:#x}) of process {pid} failed: {e}");
    }
    Ok(Resume::Return(0))
}
