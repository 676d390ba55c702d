//! # Abyss: the machine underneath the kernel
//!
//! Abyss models the hardware the kernel core runs on: a single 32-bit x86
//! processor in protected mode with two-level paging, its physical memory,
//! the interrupt controller and the keyboard port. Everything is plain data
//! owned by the kernel object, so any number of machines can exist at once
//! and a test drives one by raising interrupts on it.
//!
//! The page-table format and the walk that translates addresses belong to the
//! kernel core; abyss only knows which paging root is loaded.

pub mod addressing;
pub mod cpu;
pub mod dev;
pub mod interrupt;
pub mod kprint;
pub mod memory;
pub mod x86;

use core::sync::atomic::AtomicBool;

/// Silences `info!`, `warning!` and `debug!` when set.
pub static QUITE: AtomicBool = AtomicBool::new(false);
