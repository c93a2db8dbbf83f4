//! Board pin wiring for every drive facing and host facing connector.
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A physical pin, named after its port and index (`P(3, 5)` is `P3_5`),
/// or `NC` if the signal is not connected on this board.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pin {
    P(u8, u8),
    NC,
}

impl Pin {
    pub fn is_connected(&self) -> bool { matches!(self, Pin::P(..)) }
}

impl Display for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pin::P(port, index) => write!(f, "P{}_{}", port, index),
            Pin::NC => f.write_str("NC"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DfcPins {
    pub prsnt: Pin,
    pub ifdet: Pin,
    pub ifdet2: Pin,
    #[serde(default = "not_connected")]
    pub actdetect: Pin,
    pub persta: Pin,
    pub perstb: Pin,
    pub pwrdis: Pin,
    pub refclken: Pin,
    pub dualporten: Pin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HfcPins {
    pub sda: Pin,
    pub scl: Pin,
    pub i2c_reset: Pin,
    pub change_detect: Pin,
    pub bp_type: Pin,
    pub perst: Pin,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PinMap {
    pub dfc: Vec<DfcPins>,
    pub hfc: Vec<HfcPins>,
}

impl PinMap {
    /// Every connected pin on the board, with a label for diagnostics.
    pub fn connected(&self) -> impl Iterator<Item = (String, Pin)> + '_ {
        let dfc = self.dfc.iter().enumerate().flat_map(|(i, p)| {
            [
                ("prsnt", p.prsnt),
                ("ifdet", p.ifdet),
                ("ifdet2", p.ifdet2),
                ("actdetect", p.actdetect),
                ("persta", p.persta),
                ("perstb", p.perstb),
                ("pwrdis", p.pwrdis),
                ("refclken", p.refclken),
                ("dualporten", p.dualporten),
            ]
            .into_iter()
            .map(move |(name, pin)| (format!("DFC{} {}", i, name), pin))
        });
        let hfc = self.hfc.iter().enumerate().flat_map(|(i, p)| {
            [
                ("sda", p.sda),
                ("scl", p.scl),
                ("i2c_reset", p.i2c_reset),
                ("change_detect", p.change_detect),
                ("bp_type", p.bp_type),
                ("perst", p.perst),
            ]
            .into_iter()
            .map(move |(name, pin)| (format!("HFC{} {}", i, name), pin))
        });
        dfc.chain(hfc).filter(|(_, pin)| pin.is_connected())
    }
}

fn not_connected() -> Pin { Pin::NC }
