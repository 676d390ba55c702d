//! Segment selectors of the flat protected-mode layout.
//!
//! The descriptor tables themselves are installed by the boot code; the
//! kernel only needs the selector values and the privilege level they carry.

use num_enum::TryFromPrimitive;

/// Privilege level of a selector or of the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum PrivilegeLevel {
    /// Kernel.
    Ring0 = 0,
    /// Unused.
    Ring1 = 1,
    /// Unused.
    Ring2 = 2,
    /// User.
    Ring3 = 3,
}

/// A segment selector.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentSelector(pub u16);

impl SegmentSelector {
    /// Requested privilege level encoded in the low two bits.
    pub fn dpl(self) -> PrivilegeLevel {
        // Two bits always decode.
        PrivilegeLevel::try_from(self.0 & 3).unwrap_or(PrivilegeLevel::Ring3)
    }

    /// Index into the global descriptor table.
    pub fn index(self) -> u16 {
        self.0 >> 3
    }
}

impl core::fmt::Debug for SegmentSelector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Selector({:#x}, {:?})", self.0, self.dpl())
    }
}

/// Segments of the global descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Kernel code, GDT entry 1.
    KernelCode,
    /// Kernel data, GDT entry 2.
    KernelData,
    /// User code, GDT entry 3.
    UserCode,
    /// User data, GDT entry 4.
    UserData,
}

impl Segment {
    /// Returns the selector that loads this segment.
    pub const fn into_selector(self) -> SegmentSelector {
        match self {
            Segment::KernelCode => SegmentSelector(0x08),
            Segment::KernelData => SegmentSelector(0x10),
            Segment::UserCode => SegmentSelector(0x18 | 3),
            Segment::UserData => SegmentSelector(0x20 | 3),
        }
    }
}
