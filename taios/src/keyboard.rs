//! Keyboard input queues.
//!
//! Every process has its own bounded [`KeyboardBuffer`], and the kernel keeps
//! one more for keys that arrive while no process is current. The keyboard
//! interrupt pushes decoded bytes; `getchar` pops them.

use crate::{Kernel, config::KEYBOARD_BUFFER_SIZE};
use crossbeam_queue::ArrayQueue;

/// A bounded FIFO of key bytes.
pub struct KeyboardBuffer(ArrayQueue<u8>);

impl Default for KeyboardBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardBuffer {
    /// Creates an empty buffer holding up to [`KEYBOARD_BUFFER_SIZE`] keys.
    pub fn new() -> Self {
        Self(ArrayQueue::new(KEYBOARD_BUFFER_SIZE))
    }

    /// Appends `key`. A full buffer drops it and returns false.
    pub fn push(&self, key: u8) -> bool {
        self.0.push(key).is_ok()
    }

    /// Removes the oldest key.
    pub fn pop(&self) -> Option<u8> {
        self.0.pop()
    }

    /// Number of buffered keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no key is buffered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Kernel {
    /// Routes a key to the current process, or to the kernel's own buffer
    /// when there is none.
    pub(crate) fn push_key(&mut self, key: u8) {
        let buffer = match self.current_process.and_then(|pid| self.processes.get(pid)) {
            Some(process) => process.keyboard(),
            None => &self.keyboard,
        };
        if !buffer.push(key) {
            debug!("Keyboard buffer full, dropping {key:#04x}.");
        }
    }

    /// Takes the next key for the running process: its own buffer first,
    /// then the kernel's.
    pub(crate) fn pop_key(&mut self) -> Option<u8> {
        self.running_process()
            .and_then(|pid| self.processes.get(pid))
            .and_then(|process| process.keyboard().pop())
            .or_else(|| self.keyboard.pop())
    }
}
