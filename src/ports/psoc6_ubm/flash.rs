//! Internal flash of the PSoC 6. Reads are plain memory reads; writes go
//! through the row programming call of the peripheral driver library,
//! which erases and programs one row at a time.
use super::ffi;
use crate::{
    devices::flash_map::{area, AreaId},
    error::{self, Error as ControllerError},
    hal::flash::ReadWrite,
    ports::generated::{FLASH_AREAS, INTERNAL_FLASH_BASE, STORE_GEOMETRY},
};
use core::ops::{Add, Sub};

pub const ROW_SIZE: usize = kb!(1) / 2;
pub const FLASH_SIZE: usize = kb!(1024);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum Error {
    MemoryNotReachable,
    WriteFailed(u32),
}

impl error::Convertible for Error {
    fn into(self) -> ControllerError {
        ControllerError::DriverError(match self {
            Error::MemoryNotReachable => "[MCU Flash] Memory not reachable",
            Error::WriteFailed(_) => "[MCU Flash] Row write failed",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct Address(pub u32);

impl Add<usize> for Address {
    type Output = Self;
    fn add(self, rhs: usize) -> Address { Address(self.0 + rhs as u32) }
}

impl Sub<Address> for Address {
    type Output = usize;
    fn sub(self, rhs: Address) -> usize { self.0.saturating_sub(rhs.0) as usize }
}

impl From<u32> for Address {
    fn from(address: u32) -> Self { Address(address) }
}

/// Internal flash above the bootloader. The bootloader area is never
/// reachable through this driver.
pub struct McuFlash {
    start: Address,
    end: Address,
    row: [u32; ROW_SIZE / 4],
}

impl McuFlash {
    pub fn new() -> Result<Self, ControllerError> {
        let bootloader = area(&FLASH_AREAS, AreaId::Bootloader)
            .ok_or(ControllerError::ConfigurationError("Flash map has no bootloader area"))?;
        let start = Address(INTERNAL_FLASH_BASE + bootloader.end());
        let end = Address(INTERNAL_FLASH_BASE + FLASH_SIZE as u32);
        let store_end = STORE_GEOMETRY.base + STORE_GEOMETRY.slot_size * STORE_GEOMETRY.slot_count;
        if store_end > end.0 || STORE_GEOMETRY.base < start.0 {
            return Err(ControllerError::ConfigurationError("Store lies outside of writable flash"));
        }
        Ok(Self { start, end, row: [0; ROW_SIZE / 4] })
    }

    fn reachable(&self, address: Address, length: usize) -> bool {
        address >= self.start && (address + length) <= self.end
    }

    fn row_start(address: Address) -> Address { Address(address.0 - address.0 % ROW_SIZE as u32) }

    /// Reads, patches and reprograms the row holding `address`.
    fn write_row(&mut self, address: Address, bytes: &[u8]) -> Result<(), Error> {
        let row = Self::row_start(address);
        let offset = address - row;

        let mut contents = [0u8; ROW_SIZE];
        // Safety: the row lies inside reachable internal flash, checked by the caller.
        unsafe { core::ptr::copy_nonoverlapping(row.0 as *const u8, contents.as_mut_ptr(), ROW_SIZE) };
        contents[offset..offset + bytes.len()].copy_from_slice(bytes);

        for (word, chunk) in self.row.iter_mut().zip(contents.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        // Safety: `self.row` is a full, word aligned row buffer.
        let status = unsafe { ffi::Cy_Flash_WriteRow(row.0, self.row.as_ptr()) };
        if status != ffi::FLASH_SUCCESS {
            return Err(Error::WriteFailed(status));
        }
        Ok(())
    }
}

impl ReadWrite for McuFlash {
    type Error = Error;
    type Address = Address;

    fn read(&mut self, address: Address, bytes: &mut [u8]) -> nb::Result<(), Error> {
        if !self.reachable(address, bytes.len()) {
            return Err(nb::Error::Other(Error::MemoryNotReachable));
        }
        // Safety: internal flash is memory mapped, and the range was
        // checked against the reachable area above.
        unsafe { core::ptr::copy_nonoverlapping(address.0 as *const u8, bytes.as_mut_ptr(), bytes.len()) };
        Ok(())
    }

    fn write(&mut self, address: Address, bytes: &[u8]) -> nb::Result<(), Error> {
        if !self.reachable(address, bytes.len()) {
            return Err(nb::Error::Other(Error::MemoryNotReachable));
        }
        let mut address = address;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let room = ROW_SIZE - (address - Self::row_start(address));
            let (chunk, rest) = remaining.split_at(room.min(remaining.len()));
            self.write_row(address, chunk).map_err(nb::Error::Other)?;
            address = address + chunk.len();
            remaining = rest;
        }
        Ok(())
    }

    fn range(&self) -> (Address, Address) { (self.start, self.end) }
}
