//! Full project ports for specific boards. The board configuration file
//! is turned into the `generated` module at build time; a port turns it
//! into concrete drivers for the supervisor.

/// An MCU pin, by port and index within the port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct PinId {
    pub port: u8,
    pub pin: u8,
}

impl PinId {
    pub const fn new(port: u8, pin: u8) -> Self { Self { port, pin } }
}

/// Pins wired to one drive facing connector. `None` when not connected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DfcPinSet {
    pub prsnt: Option<PinId>,
    pub ifdet: Option<PinId>,
    pub ifdet2: Option<PinId>,
    pub actdetect: Option<PinId>,
    pub persta: Option<PinId>,
    pub perstb: Option<PinId>,
    pub pwrdis: Option<PinId>,
    pub refclken: Option<PinId>,
    pub dualporten: Option<PinId>,
}

/// Pins wired to one host facing connector. The two wire lines are owned
/// by the bus peripheral and listed for completeness.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HfcPinSet {
    pub sda: Option<PinId>,
    pub scl: Option<PinId>,
    pub i2c_reset: Option<PinId>,
    pub change_detect: Option<PinId>,
    pub bp_type: Option<PinId>,
    pub perst: Option<PinId>,
}

/// Factory backplane table, pin map and flash map of the configured board.
#[allow(clippy::all)]
pub mod generated {
    include!(concat!(env!("OUT_DIR"), "/backplane.rs"));
}

#[cfg(all(target_arch = "arm", feature = "psoc6_ubm"))]
port!(psoc6_ubm);

#[cfg(test)]
mod test {
    use super::generated::*;
    use crate::devices::flash_map::{area, AreaId};

    #[test]
    fn factory_backplane_is_valid_and_matches_the_pin_map() {
        let backplane = factory_backplane().unwrap();
        assert_eq!(DFC_PINS.len(), backplane.num_of_dfc());
        assert_eq!(HFC_PINS.len(), backplane.num_of_hfc());
    }

    #[test]
    fn store_and_image_flag_sit_outside_the_bootloader() {
        let bootloader = area(&FLASH_AREAS, AreaId::Bootloader).unwrap();
        let store_offset = STORE_GEOMETRY.base - INTERNAL_FLASH_BASE;
        assert!(!bootloader.contains(store_offset));
        assert!(!bootloader.contains(IMAGE_OK_ADDRESS - INTERNAL_FLASH_BASE));
        assert!(PRIMARY_BOOT.application_address(INTERNAL_FLASH_BASE, EXTERNAL_FLASH_BASE).is_ok());
    }
}
