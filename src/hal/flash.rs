//! Byte addressable non volatile memory.
use crate::utilities::memory::Address;
use core::fmt;

/// Reads and writes a range of bytes, generic over an address.
///
/// Writes are high level: they abstract away the need to erase
/// first, or to keep writes inside page boundaries.
pub trait ReadWrite {
    type Error: Clone + Copy + fmt::Debug;
    type Address: Address;
    fn read(&mut self, address: Self::Address, bytes: &mut [u8]) -> nb::Result<(), Self::Error>;
    fn write(&mut self, address: Self::Address, bytes: &[u8]) -> nb::Result<(), Self::Error>;
    fn range(&self) -> (Self::Address, Self::Address);
}
