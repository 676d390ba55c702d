//! Kernel print utilities.
//!
//! Kernel messages go to the host's standard error, the simulated machine's
//! serial line. The console a user program writes to is a separate device
//! owned by the kernel core.

#[doc(hidden)]
pub fn _print(fmt: core::fmt::Arguments<'_>) {
    eprint!("{fmt}");
}

/// Prints out the message.
///
/// Use the format! syntax to write data to the serial line.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// Prints out the message with a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Display an information message.
///
/// Silenced when [`QUITE`](crate::QUITE) is set.
#[macro_export]
macro_rules! info {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[INFO]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[INFO] {}\n", format_args!($($arg)*)) });
}

/// Display a warning message.
#[macro_export]
macro_rules! warning {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[WARN]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[WARN] {}\n", format_args!($($arg)*)) });
}

/// Display a debug message.
///
/// Compiled out of release builds.
#[macro_export]
macro_rules! debug {
    () => (if cfg!(debug_assertions) && !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[DEBUG]\n") });
    ($($arg:tt)*) => (if cfg!(debug_assertions) && !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[DEBUG] {}\n", format_args!($($arg)*))} );
}
