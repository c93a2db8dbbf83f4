//! Flash partition table shared with the boot library, and the boot
//! response it hands over when an image is ready to run.
use crate::error::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum AreaId {
    Bootloader,
    Primary,
    Secondary,
    SwapStatus,
    Scratch,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum FlashDevice {
    Internal,
    External,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct FlashArea {
    pub id: AreaId,
    pub device: FlashDevice,
    /// Relative to the start of `device`.
    pub offset: u32,
    pub size: u32,
}

impl FlashArea {
    pub fn end(&self) -> u32 { self.offset + self.size }

    /// Whether a device relative offset falls inside this area.
    pub fn contains(&self, offset: u32) -> bool { offset >= self.offset && offset < self.end() }
}

pub fn area(areas: &[FlashArea], id: AreaId) -> Option<&FlashArea> { areas.iter().find(|a| a.id == id) }

/// Where the boot library found a runnable image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct BootResponse {
    pub flash_device_id: FlashDevice,
    pub image_offset: u32,
    pub header_size: u32,
}

impl BootResponse {
    fn compute(&self, internal_base: u32, external_base: u32) -> Option<u32> {
        let base = match self.flash_device_id {
            FlashDevice::Internal => internal_base,
            FlashDevice::External => external_base,
        };
        base.checked_add(self.image_offset)?.checked_add(self.header_size)
    }

    /// Application entry address. Computed twice from independent reads, so
    /// a glitched computation is caught rather than jumped to.
    pub fn application_address(&self, internal_base: u32, external_base: u32) -> Result<u32, Error> {
        let first = self.compute(internal_base, external_base);
        let second = core::hint::black_box(self).compute(
            core::hint::black_box(internal_base),
            core::hint::black_box(external_base),
        );
        match (first, second) {
            (Some(first), Some(second)) if first == second => Ok(first),
            (None, _) | (_, None) => Err(Error::ConfigurationError("Boot response overflows flash")),
            _ => Err(Error::DeviceError("Application address mismatch")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const AREAS: [FlashArea; 3] = [
        FlashArea { id: AreaId::Bootloader, device: FlashDevice::Internal, offset: 0, size: 0x18000 },
        FlashArea { id: AreaId::Primary, device: FlashDevice::Internal, offset: 0x18000, size: 0x20000 },
        FlashArea { id: AreaId::Secondary, device: FlashDevice::External, offset: 0, size: 0x20000 },
    ];

    #[test]
    fn areas_are_found_by_id() {
        assert_eq!(Some(&AREAS[1]), area(&AREAS, AreaId::Primary));
        assert_eq!(None, area(&AREAS, AreaId::Scratch));
        assert!(AREAS[1].contains(0x18000));
        assert!(!AREAS[1].contains(0x38000));
    }

    #[test]
    fn application_address_skips_the_image_header() {
        let response = BootResponse { flash_device_id: FlashDevice::Internal, image_offset: 0x18000, header_size: 0x400 };
        assert_eq!(Ok(0x1001_8400), response.application_address(0x1000_0000, 0x1800_0000));

        let external = BootResponse { flash_device_id: FlashDevice::External, ..response };
        assert_eq!(Ok(0x1801_8400), external.application_address(0x1000_0000, 0x1800_0000));
    }

    #[test]
    fn overflowing_boot_response_is_rejected() {
        let response = BootResponse { flash_device_id: FlashDevice::Internal, image_offset: u32::MAX, header_size: 0x400 };
        assert!(response.application_address(0x1000_0000, 0).is_err());
    }
}
