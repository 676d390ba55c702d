//! Architectural state of the 32-bit x86 processor.

pub mod segmentation;

pub use segmentation::{PrivilegeLevel, Segment, SegmentSelector};

bitflags::bitflags! {
    /// The EFLAGS register.
    pub struct Rflags: u32 {
        /// Carry flag.
        const CF = 1 << 0;
        /// Always set.
        const _1 = 1 << 1;
        /// Parity flag.
        const PF = 1 << 2;
        /// Auxiliary carry flag.
        const AF = 1 << 4;
        /// Zero flag.
        const ZF = 1 << 6;
        /// Sign flag.
        const SF = 1 << 7;
        /// Trap flag.
        const TF = 1 << 8;
        /// Interrupt enable flag.
        const IF = 1 << 9;
        /// Direction flag.
        const DF = 1 << 10;
        /// Overflow flag.
        const OF = 1 << 11;
        /// I/O privilege level.
        const IOPL = 3 << 12;
    }
}
