//! Flash partition table and store geometry.
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaId {
    Bootloader,
    Primary,
    Secondary,
    SwapStatus,
    Scratch,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashDevice {
    Internal,
    External,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlashArea {
    pub id: AreaId,
    pub device: FlashDevice,
    pub offset: u32,
    pub size: u32,
}

impl FlashArea {
    pub fn end(&self) -> u32 { self.offset + self.size }
}

/// Partition table shared with the boot library, plus the geometry of the
/// wear leveled configuration store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryConfiguration {
    pub internal_flash_base: u32,
    pub external_flash_base: u32,
    pub image_header_size: u32,
    /// Offset of the image-ok flag, counted back from the end of the primary area.
    pub image_ok_offset: u32,
    pub areas: Vec<FlashArea>,
    pub store: StoreGeometry,
    pub ram: RamArea,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreGeometry {
    /// Offset of the first slot, in internal flash.
    pub offset: u32,
    pub slot_size: u32,
    pub slot_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RamArea {
    pub origin: u32,
    pub size_kb: u32,
}

impl StoreGeometry {
    pub fn end(&self) -> u32 { self.offset + self.slot_size * self.slot_count }
}

impl MemoryConfiguration {
    pub fn area(&self, id: AreaId) -> Option<&FlashArea> { self.areas.iter().find(|a| a.id == id) }

    /// Absolute address where the application vector table starts.
    pub fn application_origin(&self) -> Option<u32> {
        let primary = self.area(AreaId::Primary)?;
        Some(self.device_base(primary.device) + primary.offset + self.image_header_size)
    }

    /// Absolute address of the image-ok flag in the primary image trailer.
    pub fn image_ok_address(&self) -> Option<u32> {
        let primary = self.area(AreaId::Primary)?;
        Some(self.device_base(primary.device) + primary.end() - self.image_ok_offset)
    }

    pub fn device_base(&self, device: FlashDevice) -> u32 {
        match device {
            FlashDevice::Internal => self.internal_flash_base,
            FlashDevice::External => self.external_flash_base,
        }
    }
}
