//! Two wire (SMBus style) bus in target mode. The controller never
//! initiates transfers: it receives host writes and preloads the
//! bytes the host clocks out on its next read.
use core::fmt;

pub trait Target {
    type Error: Clone + Copy + fmt::Debug;

    /// Copies the last completed host write into `buffer`, returning
    /// its length. `WouldBlock` while no write has completed.
    fn receive(&mut self, buffer: &mut [u8]) -> nb::Result<usize, Self::Error>;

    /// Loads the bytes returned on the next host read. `WouldBlock`
    /// while the previous response is still being clocked out.
    fn respond(&mut self, bytes: &[u8]) -> nb::Result<(), Self::Error>;

    /// Seven bit address this target answers to.
    fn address(&self) -> u8;

    /// Drops any transfer in flight and releases the bus.
    fn abort(&mut self);
}
