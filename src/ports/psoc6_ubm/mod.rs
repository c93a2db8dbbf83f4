//! Port for the PSoC 6 UBM backplane. Clocks, pin drive modes and the
//! SCB blocks are set up by the board support package before `main`.
pub mod clock;
pub mod events;
mod ffi;
pub mod flash;
pub mod gpio;
pub mod two_wire;
pub mod watchdog;

use crate::{
    devices::{
        backplane::BackplaneConfig,
        signals::{DfcPins, HfcPins, PinSignalDriver},
    },
    error::Error,
    hal::gpio::OutputPin,
    ports::{
        generated::{DFC_PINS, HFC_PINS},
        PinId,
    },
};
use gpio::Pin;
use two_wire::TwoWire;

pub const CORE_CLOCK_HZ: u32 = 144_000_000;

/// Used by host facing connectors no route names a controller for.
const FALLBACK_ADDRESS: u8 = 0x60;

pub type Signals = PinSignalDriver<Pin, Pin>;

fn claim(id: Option<PinId>) -> Option<Pin> { id.and_then(Pin::new) }

/// Builds the signal driver from the generated pin map and drives
/// BP_TYPE low on every host facing connector to identify the backplane.
pub fn signals() -> Result<Signals, Error> {
    for set in HFC_PINS.iter() {
        if let Some(mut bp_type) = claim(set.bp_type) {
            bp_type.set_low();
        }
    }

    let dfc = DFC_PINS.iter().map(|set| DfcPins {
        prsnt: claim(set.prsnt),
        ifdet: claim(set.ifdet),
        ifdet2: claim(set.ifdet2),
        actdetect: claim(set.actdetect),
        persta: claim(set.persta),
        perstb: claim(set.perstb),
        pwrdis: claim(set.pwrdis),
        refclken: claim(set.refclken),
        dualporten: claim(set.dualporten),
    });
    let hfc = HFC_PINS.iter().map(|set| HfcPins {
        perst: claim(set.perst),
        two_wire_reset: claim(set.i2c_reset),
        change_detect: claim(set.change_detect),
    });
    PinSignalDriver::new(dfc, hfc)
}

/// One bus per host facing connector, answering at the controller
/// address its routes advertise.
pub fn buses(config: &BackplaneConfig) -> impl Iterator<Item = TwoWire> + '_ {
    (0..config.num_of_hfc() as u8).map(move |hfc| {
        let address = config.routes.for_hfc(hfc).next().map_or(FALLBACK_ADDRESS, |route| route.ctrl_address);
        TwoWire::new(hfc, address)
    })
}
