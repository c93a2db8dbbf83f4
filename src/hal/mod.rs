//! Hardware Abstraction Layer, containing interfaces
//! for low level drivers.
#![macro_use]

pub mod flash;
pub mod gpio;
pub mod time;
pub mod two_wire;
pub mod watchdog;

#[cfg(not(target_arch = "arm"))]
#[doc(hidden)]
pub mod doubles;
