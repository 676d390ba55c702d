//! Physical and Virtual Memory Addressing Schemes.
//!
//! This module provides abstractions for virtual address and physical
//! address of the simulated 32-bit protected-mode machine. Both address
//! spaces are 4 GiB wide, so every `u32` is a well-formed address; whether an
//! address is *usable* is decided by the page tables ([`Va`]) or by the size
//! of the installed memory ([`Pa`]).
//!
//! The kernel runs on an identity map: the kernel virtual address of a
//! physical frame is the physical address itself. User address spaces start
//! out the same way and are then re-pointed page by page.
//!
//! ## Arithmetic Operations
//!
//! Both `Pa` and `Va` implement addition, subtraction and bitwise operations
//! with `usize`, which keeps address arithmetic readable:
//!
//! ```
//! let code = Va::new(0x40_0000);
//! let next = code + PAGE_SIZE; // Move to the next page
//! ```

/// The size of a single page in memory, in bytes.
///
/// Both the frames handed out by the kernel heap and the entries of a page
/// table describe memory in units of this size.
pub const PAGE_SIZE: usize = 0x1000;

/// The shift amount to get the page index from a given address.
pub const PAGE_SHIFT: usize = 12; // 12 bits (log2 of 4 KB)

/// A mask for extracting the offset within a page from a given address.
///
/// ## Example:
/// ```
/// let offset_within_page = address & PAGE_MASK;
/// ```
pub const PAGE_MASK: usize = 0xfff;

/// Represents a physical address.
///
/// The `Pa` (Physical Address) struct is a wrapper around the `u32` type,
/// which represents a location in the machine's physical memory.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Default)]
pub struct Pa(u32);

impl Pa {
    /// The physical address `0`.
    pub const ZERO: Self = Self(0);

    /// Creates a new physical address.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Cast the physical address into a raw `u32`.
    #[inline]
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Cast the physical address into a raw `usize`.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns the virtual address that reaches this frame under the
    /// kernel's identity map.
    #[inline]
    pub const fn into_kva(self) -> Va {
        Va(self.0)
    }

    /// Align down the physical address to the page boundary.
    #[inline]
    pub const fn page_down(self) -> Self {
        Self(self.0 & !(PAGE_MASK as u32))
    }

    /// Align up to the physical address to the page boundary.
    ///
    /// # Returns
    /// - `None` if the aligned address does not fit the 4 GiB space.
    #[inline]
    pub const fn page_up(self) -> Option<Self> {
        match self.0.checked_add(PAGE_MASK as u32) {
            Some(v) => Some(Self(v & !(PAGE_MASK as u32))),
            None => None,
        }
    }

    /// Extracts the page offset from the physical address.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0 as usize & PAGE_MASK
    }

    /// Returns true if the address is on a page boundary.
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    /// Returns the page frame number of this address.
    #[inline]
    pub const fn frame_number(self) -> u32 {
        self.0 >> PAGE_SHIFT
    }
}

/// Represents a virtual address.
///
/// The [`Va`] (Virtual Address) struct represents an address in one of the
/// virtual address spaces, the kernel's or a process's. Which physical byte it
/// names depends on the address space the CPU currently uses.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Default)]
pub struct Va(u32);

impl Va {
    /// The null virtual address.
    pub const NULL: Self = Self(0);

    /// Creates a new virtual address.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Returns the raw `u32` representation of the virtual address.
    #[inline]
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Returns the raw `usize` representation of the virtual address.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns true if this is the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Aligns the virtual address down to the nearest page boundary.
    #[inline]
    pub const fn page_down(self) -> Self {
        Self(self.0 & !(PAGE_MASK as u32))
    }

    /// Aligns the virtual address up to the nearest page boundary.
    ///
    /// # Returns
    /// - `None` if the aligned address does not fit the 4 GiB space.
    #[inline]
    pub const fn page_up(self) -> Option<Self> {
        match self.0.checked_add(PAGE_MASK as u32) {
            Some(v) => Some(Self(v & !(PAGE_MASK as u32))),
            None => None,
        }
    }

    /// Extracts the offset within the memory page from the virtual address.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0 as usize & PAGE_MASK
    }

    /// Returns true if the address is on a page boundary.
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    /// Adds `len` bytes, failing if the result leaves the 4 GiB space.
    #[inline]
    pub fn checked_add(self, len: usize) -> Option<Self> {
        u32::try_from(len)
            .ok()
            .and_then(|len| self.0.checked_add(len))
            .map(Self)
    }
}

macro_rules! impl_arith {
    ($t: ty) => {
        impl core::ops::Add<usize> for $t {
            type Output = Self;

            fn add(self, other: usize) -> Self::Output {
                Self(self.0 + other as u32)
            }
        }
        impl core::ops::AddAssign<usize> for $t {
            fn add_assign(&mut self, other: usize) {
                self.0 += other as u32
            }
        }
        impl core::ops::Sub<usize> for $t {
            type Output = Self;

            fn sub(self, other: usize) -> Self::Output {
                Self(self.0 - other as u32)
            }
        }
        impl core::ops::Sub<Self> for $t {
            type Output = usize;

            fn sub(self, other: Self) -> Self::Output {
                (self.0 - other.0) as usize
            }
        }
        impl core::ops::SubAssign<usize> for $t {
            fn sub_assign(&mut self, other: usize) {
                self.0 -= other as u32
            }
        }
        impl core::ops::BitOr<usize> for $t {
            type Output = Self;

            fn bitor(self, other: usize) -> Self {
                Self(self.0 | other as u32)
            }
        }
        impl core::ops::BitAnd<usize> for $t {
            type Output = Self;

            fn bitand(self, other: usize) -> Self {
                Self(self.0 & other as u32)
            }
        }
    };
}

impl_arith!(Va);
impl_arith!(Pa);

impl core::fmt::Debug for Va {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Va(0x{:x})", self.0)
    }
}
impl core::fmt::Display for Va {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Va(0x{:x})", self.0)
    }
}
impl core::fmt::Debug for Pa {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pa(0x{:x})", self.0)
    }
}
impl core::fmt::Display for Pa {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pa(0x{:x})", self.0)
    }
}
