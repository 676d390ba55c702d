//! Command lines.
//!
//! A command line is the program path followed by its arguments. Whether it
//! comes from the boot shell as one string or from `exec` as a list, the
//! kernel keeps it as an owned list of words.

use crate::{KernelError, config::MAX_COMMAND_LENGTH};

/// A program path and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Splits `command` on spaces.
    ///
    /// # Returns
    /// - `Err(KernelError::InvalidArgument)` if there is no word.
    /// - `Err(KernelError::NameTooLong)` if `command` does not fit a
    ///   [`MAX_COMMAND_LENGTH`]-byte buffer with its terminating NUL.
    pub fn parse(command: &str) -> Result<Self, KernelError> {
        if command.len() >= MAX_COMMAND_LENGTH {
            return Err(KernelError::NameTooLong);
        }
        Self::from_words(
            command
                .split(' ')
                .filter(|word| !word.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Builds a command line from already separated words.
    pub fn from_words(words: Vec<String>) -> Result<Self, KernelError> {
        if words.is_empty() || words.iter().any(|word| word.is_empty() || word.contains('\0')) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(Self(words))
    }

    /// The program path.
    pub fn program(&self) -> &str {
        &self.0[0]
    }

    /// Every word, the program path first.
    pub fn words(&self) -> &[String] {
        &self.0
    }

    /// Number of words, the `argc` of the program.
    pub fn argc(&self) -> usize {
        self.0.len()
    }
}

impl core::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}
