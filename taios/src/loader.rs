//! Program loaders.
//!
//! A [`ProgramLoader`] turns a path into a [`Program`]: the sections to map,
//! their backing memory already filled from the file, a stack and an entry
//! point. The kernel core maps the result; it never looks at an executable
//! format itself.

use crate::{
    KernelError,
    config::{USER_PROGRAM_VIRTUAL_ADDRESS, USER_STACK_BOTTOM, USER_STACK_SIZE},
    fs::traits::FileSystem,
    mm::{KernelMemory, page_table::PteFlags},
    process::program::{MemorySection, Program},
};

/// Produces loadable programs.
pub trait ProgramLoader {
    /// Loads the program at `path`, allocating its backing memory from
    /// `memory`.
    ///
    /// On failure every allocation made so far has been returned.
    fn load(&self, path: &str, memory: &mut KernelMemory) -> Result<Program, KernelError>;
}

/// Loader of raw binaries.
///
/// The whole file is one read-only code section at
/// [`USER_PROGRAM_VIRTUAL_ADDRESS`], which is also the entry point. Every
/// program gets a [`USER_STACK_SIZE`]-byte stack right below the argument
/// page.
pub struct FlatBinaryLoader<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> FlatBinaryLoader<F> {
    /// Creates a loader reading from `fs`.
    pub fn new(fs: F) -> Self {
        Self { fs }
    }
}

impl<F: FileSystem> ProgramLoader for FlatBinaryLoader<F> {
    fn load(&self, path: &str, memory: &mut KernelMemory) -> Result<Program, KernelError> {
        let file = self.fs.open(path)?;
        let size = file.size();
        if size == 0 {
            return Err(KernelError::NoExec);
        }

        let mut image = vec![0; size];
        if file.read(0, &mut image)? != size {
            return Err(KernelError::IOError);
        }
        let code = memory.kzalloc(size)?;
        if let Err(e) = memory.write(code, &image) {
            memory.kfree(code)?;
            return Err(e);
        }
        let stack = match memory.kzalloc(USER_STACK_SIZE) {
            Ok(stack) => stack,
            Err(e) => {
                memory.kfree(code)?;
                return Err(e);
            }
        };
        debug!("Loaded {path}: {size} bytes at {code:?}, stack at {stack:?}.");

        Ok(Program::new(
            vec![MemorySection {
                phys: code,
                virt: USER_PROGRAM_VIRTUAL_ADDRESS,
                size,
                flags: PteFlags::P | PteFlags::US,
            }],
            MemorySection {
                phys: stack,
                virt: USER_STACK_BOTTOM,
                size: USER_STACK_SIZE,
                flags: PteFlags::P | PteFlags::RW | PteFlags::US,
            },
            USER_PROGRAM_VIRTUAL_ADDRESS,
        ))
    }
}
