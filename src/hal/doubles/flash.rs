use super::error::FakeError;
use crate::hal::flash;
use std::ops::{Add, Sub};

/// Flash double with fault injection. Memory starts erased (`0xFF`).
pub struct FakeFlash {
    base: Address,
    data: Vec<u8>,
    writes_before_power_loss: Option<usize>,
    /// Writes to let through, then the length of the torn write.
    torn_write: Option<(usize, usize)>,
    pub write_count: usize,
}

#[derive(Copy, Clone, Debug, Ord, PartialOrd, PartialEq, Eq)]
pub struct Address(pub u32);

impl FakeFlash {
    pub fn new(base: Address, size: usize) -> FakeFlash {
        FakeFlash {
            base,
            data: vec![0xFF; size],
            writes_before_power_loss: None,
            torn_write: None,
            write_count: 0,
        }
    }

    /// Lets `writes` more writes through. Every write after that fails
    /// without touching memory, as if power was cut.
    pub fn lose_power_after(&mut self, writes: usize) { self.writes_before_power_loss = Some(writes) }

    /// Lets `writes` more writes through, then the next one only lands
    /// its first `bytes` bytes and fails.
    pub fn tear_write_after(&mut self, writes: usize, bytes: usize) { self.torn_write = Some((writes, bytes)) }

    pub fn restore_power(&mut self) {
        self.writes_before_power_loss = None;
        self.torn_write = None;
    }

    /// Inverts every bit of the byte at `address`.
    pub fn flip(&mut self, address: Address) {
        let offset = address - self.base;
        self.data[offset] = !self.data[offset];
    }

    pub fn bytes(&self, address: Address, length: usize) -> &[u8] {
        let offset = address - self.base;
        &self.data[offset..offset + length]
    }

    fn in_range(&self, address: Address, length: usize) -> bool {
        address >= self.base && (address - self.base) + length <= self.data.len()
    }
}

impl flash::ReadWrite for FakeFlash {
    type Error = FakeError;
    type Address = Address;

    fn read(&mut self, address: Self::Address, bytes: &mut [u8]) -> nb::Result<(), Self::Error> {
        if !self.in_range(address, bytes.len()) {
            return Err(nb::Error::Other(FakeError));
        }
        let offset = address - self.base;
        bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
        Ok(())
    }

    fn write(&mut self, address: Self::Address, bytes: &[u8]) -> nb::Result<(), Self::Error> {
        if !self.in_range(address, bytes.len()) {
            return Err(nb::Error::Other(FakeError));
        }
        match self.writes_before_power_loss {
            Some(0) => return Err(nb::Error::Other(FakeError)),
            Some(remaining) => self.writes_before_power_loss = Some(remaining - 1),
            None => (),
        }
        let offset = address - self.base;
        match self.torn_write {
            Some((0, length)) => {
                self.torn_write = None;
                let length = length.min(bytes.len());
                self.data[offset..offset + length].copy_from_slice(&bytes[..length]);
                return Err(nb::Error::Other(FakeError));
            }
            Some((remaining, length)) => self.torn_write = Some((remaining - 1, length)),
            None => (),
        }
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.write_count += 1;
        Ok(())
    }

    fn range(&self) -> (Self::Address, Self::Address) { (self.base, self.base + self.data.len()) }
}

impl Add<usize> for Address {
    type Output = Address;
    fn add(self, rhs: usize) -> Self::Output { Address(self.0 + rhs as u32) }
}

impl Sub<Address> for Address {
    type Output = usize;
    fn sub(self, rhs: Address) -> Self::Output { self.0.saturating_sub(rhs.0) as usize }
}
