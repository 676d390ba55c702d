//! A teletype (TTY) interface for character output.
//!
//! User programs print through `putchar` and `puts`, which end up in a
//! [`Teletype`]. The [`Console`] keeps everything written to it so the
//! screen contents can be inspected.

use crate::KernelError;

/// The `Teletype` trait represents a character output device.
pub trait Teletype {
    /// Writes data to the teletype.
    ///
    /// # Arguments
    /// - `data`: A byte slice containing the data to be written.
    ///
    /// # Returns
    /// - `Ok(usize)`: The number of bytes successfully written.
    /// - `Err(KernelError)`: If the write operation failed.
    fn write(&mut self, data: &[u8]) -> Result<usize, KernelError>;
}

/// The text console.
#[derive(Default)]
pub struct Console {
    screen: Vec<u8>,
}

impl Console {
    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.screen
    }

    /// The output as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.screen).into_owned()
    }

    /// Clears the screen.
    pub fn clear(&mut self) {
        self.screen.clear();
    }
}

impl Teletype for Console {
    fn write(&mut self, data: &[u8]) -> Result<usize, KernelError> {
        self.screen.extend_from_slice(data);
        Ok(data.len())
    }
}
