//! Test doubles for every hal interface. Only compiled off target.
pub mod error;
pub mod flash;
pub mod gpio;
pub mod time;
pub mod two_wire;
pub mod watchdog;
