//! PS/2 keyboard data port.
//!
//! The controller decodes scancodes into bytes; the kernel sees one byte per
//! read of the data port.

use std::collections::VecDeque;

/// The keyboard data port.
#[derive(Default)]
pub struct KeyboardPort {
    fifo: VecDeque<u8>,
}

impl KeyboardPort {
    /// Latches a key press.
    pub fn press(&mut self, key: u8) {
        self.fifo.push_back(key);
    }

    /// Reads the data port.
    pub fn read(&mut self) -> Option<u8> {
        self.fifo.pop_front()
    }
}
