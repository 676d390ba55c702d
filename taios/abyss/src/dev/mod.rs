//! Devices of the simulated machine.

pub mod keyboard;
pub mod pic;
