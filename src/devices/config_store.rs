//! Wear leveled, power loss safe key-value store.
//!
//! The store region is split in fixed size slots. Every write goes to a
//! different slot than the one holding the current copy of any key, so the
//! previous copy survives until the new one is read back, checksum verified
//! and committed. The commit marker is the last word written.
//!
//! Slot layout:
//!
//! | Field    | Size | Notes                                  |
//! |----------|------|----------------------------------------|
//! | magic    | 4    | `MAGIC`, marks a slot that was written |
//! | key      | 1    |                                        |
//! | length   | 2    | payload length                         |
//! | sequence | 4    | grows by one on every write            |
//! | payload  | n    |                                        |
//! | crc      | 4    | CRC-32 (IEEE) of key..payload          |
//! | ...      |      | unused                                 |
//! | commit   | 4    | last word of the slot                  |
use super::traits::Flash;
use crate::error::Error;
use crc::{crc32, Hasher32};
use heapless::Vec;
use nb::block;

const MAGIC: u32 = 0x5542_4D53;
const COMMITTED: u32 = 0x0000_C0DE;
const HEADER_SIZE: usize = 4 + 1 + 2 + 4;
const CRC_SIZE: usize = 4;
const COMMIT_SIZE: usize = 4;
pub const RECORD_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE + COMMIT_SIZE;
pub const MAX_SLOTS: usize = 16;

/// Location and shape of the store region, in absolute addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct StoreGeometry {
    pub base: u32,
    pub slot_size: u32,
    pub slot_count: u32,
}

wire_enum! {
    pub enum Key { Backplane = 0x01, Features = 0x02 }
}

#[derive(Copy, Clone, Debug)]
struct Header {
    key: u8,
    length: u16,
    sequence: u32,
}

/// What a scan found in a slot.
#[derive(Copy, Clone, Debug)]
struct Slot {
    index: usize,
    header: Option<Header>,
    committed: bool,
}

impl Slot {
    fn holds(&self, key: Key) -> bool {
        self.committed && matches!(self.header, Some(h) if h.key == key.code())
    }

    fn sequence(&self) -> Option<u32> { self.header.map(|h| h.sequence) }
}

pub struct ConfigStore<F: Flash> {
    flash: F,
    base: F::Address,
    slot_size: usize,
    slot_count: usize,
}

impl<F: Flash> ConfigStore<F> {
    pub fn new(flash: F, base: F::Address, slot_size: usize, slot_count: usize) -> Result<Self, Error> {
        if !(2..=MAX_SLOTS).contains(&slot_count) {
            return Err(Error::ConfigurationError("Store needs between two and sixteen slots"));
        }
        if slot_size <= RECORD_OVERHEAD || slot_size % 4 != 0 {
            return Err(Error::ConfigurationError("Store slot size is unusable"));
        }
        Ok(Self { flash, base, slot_size, slot_count })
    }

    /// Largest payload a single record can hold.
    pub fn capacity(&self) -> usize { self.slot_size - RECORD_OVERHEAD }

    pub fn release(self) -> F { self.flash }

    /// Copies the newest valid record for `key` into `buffer`, returning its
    /// length. Falls back to older copies when the newest fails its checksum.
    pub fn read(&mut self, key: Key, buffer: &mut [u8]) -> Result<usize, Error> {
        let slots = self.scan()?;
        let mut candidates: Vec<Slot, MAX_SLOTS> = slots.into_iter().filter(|s| s.holds(key)).collect();
        if candidates.is_empty() {
            return Err(Error::RecordNotFound);
        }
        candidates.sort_unstable_by(|a, b| b.sequence().cmp(&a.sequence()));

        for (age, slot) in candidates.iter().enumerate() {
            match self.verify(slot) {
                Ok(()) => {
                    if age > 0 {
                        warn!("Newest copy of {:?} is corrupt, using a copy {} writes older", key, age);
                    }
                    return self.copy_payload(slot, buffer);
                }
                Err(Error::RecordCorrupt) => {
                    warn!("Corrupt copy of {:?} in slot {}", key, slot.index);
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::RecordCorrupt)
    }

    /// Persists `bytes` as the new value of `key`. Blocks until the record
    /// is committed or the write fails; on failure the previous value stays.
    pub fn write(&mut self, key: Key, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > self.capacity() {
            return Err(Error::RecordTooLarge);
        }
        let slots = self.scan()?;
        let sequence = slots.iter().filter_map(Slot::sequence).max().map_or(0, |s| s.wrapping_add(1));
        let target = self.pick_target(&slots)?;
        let header = Header { key: key.code(), length: bytes.len() as u16, sequence };

        let slot_address = self.slot_address(target);
        let mut prefix = [0u8; HEADER_SIZE];
        prefix[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        prefix[4] = header.key;
        prefix[5..7].copy_from_slice(&header.length.to_le_bytes());
        prefix[7..11].copy_from_slice(&header.sequence.to_le_bytes());

        let mut digest = crc32::Digest::new(crc32::IEEE);
        digest.write(&prefix[4..]);
        digest.write(bytes);
        let crc = digest.sum32();

        // An erased commit word first, so an interrupted write is never committed.
        block!(self.flash.write(slot_address + (self.slot_size - COMMIT_SIZE), &[0xFF; COMMIT_SIZE]))?;
        block!(self.flash.write(slot_address, &prefix))?;
        block!(self.flash.write(slot_address + HEADER_SIZE, bytes))?;
        block!(self.flash.write(slot_address + HEADER_SIZE + bytes.len(), &crc.to_le_bytes()))?;

        let written = Slot { index: target, header: Some(header), committed: false };
        self.verify(&written).map_err(|_| Error::WriteVerifyFailed)?;

        block!(self.flash.write(
            slot_address + (self.slot_size - COMMIT_SIZE),
            &COMMITTED.to_le_bytes()
        ))?;
        info!("Committed {:?} ({} bytes) to slot {}, sequence {}", key, bytes.len(), target, sequence);
        Ok(())
    }

    fn slot_address(&self, index: usize) -> F::Address { self.base + index * self.slot_size }

    fn scan(&mut self) -> Result<Vec<Slot, MAX_SLOTS>, Error> {
        let mut slots = Vec::new();
        for index in 0..self.slot_count {
            let address = self.slot_address(index);
            let mut prefix = [0u8; HEADER_SIZE];
            block!(self.flash.read(address, &mut prefix))?;
            let mut commit = [0u8; COMMIT_SIZE];
            block!(self.flash.read(address + (self.slot_size - COMMIT_SIZE), &mut commit))?;

            let magic = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
            let header = (magic == MAGIC).then(|| Header {
                key: prefix[4],
                length: u16::from_le_bytes([prefix[5], prefix[6]]),
                sequence: u32::from_le_bytes([prefix[7], prefix[8], prefix[9], prefix[10]]),
            });
            let committed = header.is_some() && u32::from_le_bytes(commit) == COMMITTED;
            // Capacity is bounded by `MAX_SLOTS`, checked at construction.
            let _ = slots.push(Slot { index, header, committed });
        }
        Ok(slots)
    }

    /// Slots `read` would answer from: the newest committed copy of each
    /// key that passes its checksum.
    fn live_slots(&mut self, slots: &[Slot]) -> Result<Vec<usize, MAX_SLOTS>, Error> {
        let mut committed: Vec<Slot, MAX_SLOTS> = slots.iter().filter(|s| s.committed).copied().collect();
        committed.sort_unstable_by(|a, b| b.sequence().cmp(&a.sequence()));

        let mut keys: Vec<u8, MAX_SLOTS> = Vec::new();
        let mut live = Vec::new();
        for slot in committed.iter() {
            let key = match slot.header {
                Some(header) if !keys.contains(&header.key) => header.key,
                _ => continue,
            };
            match self.verify(slot) {
                Ok(()) => {
                    // Both bounded by the slot count.
                    let _ = keys.push(key);
                    let _ = live.push(slot.index);
                }
                Err(Error::RecordCorrupt) => (),
                Err(e) => return Err(e),
            }
        }
        Ok(live)
    }

    /// Oldest slot no key is read from. Unwritten and uncommitted slots
    /// go first.
    fn pick_target(&mut self, slots: &[Slot]) -> Result<usize, Error> {
        let live = self.live_slots(slots)?;
        slots
            .iter()
            .filter(|slot| !live.contains(&slot.index))
            .min_by_key(|slot| (slot.committed, slot.sequence()))
            .map(|slot| slot.index)
            .ok_or(Error::DeviceError("Configuration store has no free slot"))
    }

    fn verify(&mut self, slot: &Slot) -> Result<(), Error> {
        let header = slot.header.ok_or(Error::RecordCorrupt)?;
        let length = header.length as usize;
        if length > self.capacity() {
            return Err(Error::RecordCorrupt);
        }

        let address = self.slot_address(slot.index);
        let mut digest = crc32::Digest::new(crc32::IEEE);
        let mut chunk = [0u8; 32];
        let mut offset = 4;
        while offset < HEADER_SIZE + length {
            let size = chunk.len().min(HEADER_SIZE + length - offset);
            block!(self.flash.read(address + offset, &mut chunk[..size]))?;
            digest.write(&chunk[..size]);
            offset += size;
        }

        let mut stored = [0u8; CRC_SIZE];
        block!(self.flash.read(address + HEADER_SIZE + length, &mut stored))?;
        if u32::from_le_bytes(stored) == digest.sum32() {
            Ok(())
        } else {
            Err(Error::RecordCorrupt)
        }
    }

    fn copy_payload(&mut self, slot: &Slot, buffer: &mut [u8]) -> Result<usize, Error> {
        let length = slot.header.map_or(0, |h| h.length as usize);
        let destination = buffer.get_mut(..length).ok_or(Error::RecordTooLarge)?;
        block!(self.flash.read(self.slot_address(slot.index) + HEADER_SIZE, destination))?;
        Ok(length)
    }
}

impl<F: Flash> ConfigStore<F>
where
    F::Address: From<u32>,
{
    pub fn from_geometry(flash: F, geometry: StoreGeometry) -> Result<Self, Error> {
        Self::new(
            flash,
            F::Address::from(geometry.base),
            geometry.slot_size as usize,
            geometry.slot_count as usize,
        )
    }
}

/// Anything that can persist the controller features on behalf of the
/// protocol engine.
pub trait PersistFeatures {
    fn persist_features(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

impl<F: Flash> PersistFeatures for ConfigStore<F> {
    fn persist_features(&mut self, bytes: &[u8]) -> Result<(), Error> { self.write(Key::Features, bytes) }
}
