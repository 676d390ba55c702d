//! The `uaccess` module moves data from a user address space into the
//! kernel.
//!
//! - [`Kernel::copy_from_other_space`] copies at most one page out of a
//!   task's address space through a scratch page.
//! - [`UserU8SliceRO`]: A one-time, read-only pointer to a byte slice in user
//!   space.
//! - [`UserCommandList`]: the `{value, next}` node list `exec` receives, read
//!   into a [`CommandLine`].
//!
//! The pointer types take ownership of themselves when read, so a pointer is
//! fetched exactly once.

use crate::{
    Kernel, KernelError, config::MAX_COMMAND_LENGTH, mm::page_table::PteFlags,
    process::command::CommandLine, task::TaskId,
};
use abyss::{
    addressing::{PAGE_SIZE, Pa, Va},
    x86::PrivilegeLevel,
};

impl Kernel {
    /// Copies `dest.len()` bytes at `src` in the address space of `task`
    /// into `dest`.
    ///
    /// A kernel scratch page is mapped read-only into the task's space at
    /// its own address. With the task's space loaded, the source is read
    /// with user rights and stored to the scratch page with kernel rights.
    /// Back in the kernel's space the scratch mapping is restored and the
    /// page copied out.
    ///
    /// # Returns
    /// - `Err(KernelError::InvalidArgument)` if `dest` is empty or longer
    ///   than a page, `src` is null, or `task` is not queued.
    /// - `Err(KernelError::BadAddress)` if the task cannot read `src`.
    pub fn copy_from_other_space(
        &mut self,
        task: TaskId,
        src: Va,
        dest: &mut [u8],
    ) -> Result<(), KernelError> {
        if dest.is_empty() || dest.len() > PAGE_SIZE || src.is_null() || !self.tasks.contains(task)
        {
            return Err(KernelError::InvalidArgument);
        }
        let scratch = self.memory.kzalloc(PAGE_SIZE)?;
        let copied = self
            .copy_through_scratch(task, src, scratch, dest.len())
            .and_then(|_| self.memory.read(scratch, dest));
        self.memory.kfree(scratch)?;
        copied
    }

    fn copy_through_scratch(
        &mut self,
        task: TaskId,
        src: Va,
        scratch: Pa,
        len: usize,
    ) -> Result<(), KernelError> {
        let scratch_va = Va::new(scratch.into_u32());
        let space = match self.tasks.get_mut(task) {
            Some(task) => task.space_mut(),
            None => return Err(KernelError::InvalidArgument),
        };
        let saved = space.entry(scratch_va)?;
        space.map(scratch_va, scratch, PAGE_SIZE, PteFlags::P)?;

        let copied = self.copy_in_user_space(task, src, scratch_va, len);

        self.kernel_space.switch_into(&mut self.cpu);
        if let Some(task) = self.tasks.get_mut(task) {
            task.space_mut().set_entry(scratch_va, saved)?;
        }
        copied
    }

    fn copy_in_user_space(
        &mut self,
        task: TaskId,
        src: Va,
        scratch_va: Va,
        len: usize,
    ) -> Result<(), KernelError> {
        match self.tasks.get(task) {
            Some(task) => task.space().switch_into(&mut self.cpu),
            None => return Err(KernelError::InvalidArgument),
        }
        let mut bounce = vec![0; len];
        self.load_as(src, &mut bounce, PrivilegeLevel::Ring3)?;
        self.store_as(scratch_va, &bounce, PrivilegeLevel::Ring0)?;
        Ok(())
    }
}

/// A one-time, read-only pointer to `len` bytes in the address space of a
/// task.
#[derive(Debug, PartialEq, Eq)]
pub struct UserU8SliceRO {
    task: TaskId,
    addr: Va,
    len: usize,
}

impl UserU8SliceRO {
    /// Creates a new `UserU8SliceRO` of `len` bytes at `addr`.
    pub fn new(task: TaskId, addr: Va, len: usize) -> Self {
        Self { task, addr, len }
    }

    /// Reads the bytes. At most a page can be read at once.
    pub fn get(self, kernel: &mut Kernel) -> Result<Vec<u8>, KernelError> {
        let mut buf = vec![0; self.len];
        kernel.copy_from_other_space(self.task, self.addr, &mut buf)?;
        Ok(buf)
    }
}

/// A one-time, read-only pointer to the command list of `exec`.
///
/// The list is a chain of `{value: u32, next: u32}` nodes, terminated by a
/// null `next`. The first node's `value` points at the whole command: the
/// program path and every argument, each followed by a NUL. Every later node
/// stands for the next word of that buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct UserCommandList {
    task: TaskId,
    addr: Va,
}

impl UserCommandList {
    /// Creates a new `UserCommandList` whose first node is at `addr`.
    pub fn new(task: TaskId, addr: Va) -> Self {
        Self { task, addr }
    }

    fn node(kernel: &mut Kernel, task: TaskId, addr: Va) -> Result<(u32, u32), KernelError> {
        let mut node = [0; 8];
        kernel.copy_from_other_space(task, addr, &mut node)?;
        Ok((
            u32::from_le_bytes([node[0], node[1], node[2], node[3]]),
            u32::from_le_bytes([node[4], node[5], node[6], node[7]]),
        ))
    }

    /// Reads the list.
    ///
    /// # Returns
    /// - `Err(KernelError::InvalidArgument)` if a pointer is null, the list
    ///   has more nodes than the command has words, or a word is not UTF-8.
    /// - `Err(KernelError::NameTooLong)` if a word runs past
    ///   [`MAX_COMMAND_LENGTH`] bytes.
    pub fn get(self, kernel: &mut Kernel) -> Result<CommandLine, KernelError> {
        let (value, mut next) = Self::node(kernel, self.task, self.addr)?;
        let mut blob = vec![0; MAX_COMMAND_LENGTH];
        kernel.copy_from_other_space(self.task, Va::new(value), &mut blob)?;

        let mut rest = blob.as_slice();
        let mut take_word = || -> Result<String, KernelError> {
            let len = rest
                .iter()
                .position(|b| *b == 0)
                .ok_or(KernelError::NameTooLong)?;
            if len == 0 {
                return Err(KernelError::InvalidArgument);
            }
            let word = core::str::from_utf8(&rest[..len])
                .map_err(|_| KernelError::InvalidArgument)?
                .to_string();
            rest = &rest[len + 1..];
            Ok(word)
        };

        let mut words = vec![take_word()?];
        while next != 0 {
            (_, next) = Self::node(kernel, self.task, Va::new(next))?;
            words.push(take_word()?);
        }
        CommandLine::from_words(words)
    }
}
