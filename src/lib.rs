//! # UBM Backplane Controller Library
//!
//! This crate contains all functionality for the backplane
//! management controller in library form. Board specifics live
//! under `ports`; the binary only wires a port to the supervisor.
#![cfg_attr(test, allow(unused_imports))]
#![cfg_attr(target_arch = "arm", no_std)]

#[cfg(target_arch = "arm")]
extern crate panic_semihosting;
extern crate static_assertions;

#[macro_use]
pub mod utilities {
    #[macro_use]
    pub mod log;
    mod macros;
    pub mod bitwise;
    pub mod iterator;
    pub mod memory;
}

pub mod hal;
pub mod devices;
pub mod ports;
pub mod error;
