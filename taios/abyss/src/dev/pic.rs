//! 8259 programmable interrupt controller.
//!
//! Hardware interrupt lines are latched while the CPU has interrupts masked
//! and delivered once it unmasks them. A line raised again while it is
//! already pending is not queued twice, which is why a handler must drain its
//! device rather than expect one interrupt per event.

use arrayvec::ArrayVec;

/// Number of interrupt lines of the chained controllers.
pub const IRQ_LINES: usize = 16;

/// The chained master/slave controller pair.
pub struct Pic {
    pending: ArrayVec<u8, IRQ_LINES>,
    acks: usize,
}

impl Default for Pic {
    fn default() -> Self {
        Self::new()
    }
}

impl Pic {
    /// Vector of line 0 after remapping.
    pub const OFFSET: u8 = 0x20;

    /// Creates a controller with no pending lines.
    pub fn new() -> Self {
        Self {
            pending: ArrayVec::new(),
            acks: 0,
        }
    }

    /// Latches the line that maps to `vector`.
    pub fn raise(&mut self, vector: u8) {
        let line = vector.wrapping_sub(Self::OFFSET);
        assert!((line as usize) < IRQ_LINES, "Vector {vector:#x} is not an IRQ.");
        if !self.pending.contains(&vector) {
            self.pending.push(vector);
        }
    }

    /// Returns true if `vector` belongs to one of the controller's lines.
    pub fn is_irq(vector: u8) -> bool {
        (Self::OFFSET..Self::OFFSET + IRQ_LINES as u8).contains(&vector)
    }

    /// Takes the oldest pending vector.
    pub fn take_pending(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    /// Vectors waiting for delivery, oldest first.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Sends the end-of-interrupt command (`outb(0x20, 0x20)`).
    pub fn end_of_interrupt(&mut self) {
        self.acks += 1;
    }

    /// Number of end-of-interrupt commands received.
    pub fn acks(&self) -> usize {
        self.acks
    }
}
