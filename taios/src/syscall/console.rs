//! `getchar`, `putchar` and `puts`.

use super::{caller, uaccess::UserU8SliceRO};
use crate::{Kernel, KernelError, interrupt::Resume, teletype::Teletype};
use abyss::{
    addressing::{PAGE_SIZE, Va},
    interrupt::Registers,
};

/// `getchar()`: the next key for the caller, or 0 if none is queued.
pub(super) fn getchar(kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    Ok(kernel.pop_key().map_or(0, u32::from).into())
}

/// `putchar(c)`: prints the low byte of `c` and returns it.
pub(super) fn putchar(kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    let c = kernel.arg(caller(kernel), 0)? as u8;
    kernel.console.write(&[c])?;
    Ok(u32::from(c).into())
}

/// `puts(ptr, len)`: prints `len` bytes, at most a page, and returns the
/// number printed.
pub(super) fn puts(kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    let task = caller(kernel);
    let ptr = Va::new(kernel.arg(task, 0)?);
    let len = kernel.arg(task, 1)? as usize;
    if len == 0 {
        return Ok(Resume::Return(0));
    }
    if len > PAGE_SIZE {
        return Err(KernelError::InvalidArgument);
    }
    let text = UserU8SliceRO::new(task, ptr, len).get(kernel)?;
    let written = kernel.console.write(&text)?;
    Ok((written as u32).into())
}
