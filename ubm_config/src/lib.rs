//! This sub-crate contains all definitions needed to describe a UBM
//! backplane board, and to generate the code the firmware includes
//! from that description.
//!
//! NOTE: This code is not included anywhere from the firmware itself! This
//! is a dependency of the **build script**. The build script deserializes a
//! board configuration file, validates it, and generates the factory default
//! backplane table, pin map and memory layout that the firmware includes.

use std::fmt::Display;

use backplane::{Backplane, Domain};
use itertools::Itertools;
use memory::{AreaId, FlashDevice, MemoryConfiguration};
use pins::PinMap;
use port::Port;
use serde::{Deserialize, Serialize};

pub mod backplane;
pub mod codegen;
pub mod memory;
pub mod pins;
pub mod port;

/// Capacity limits of the firmware's fixed size tables. Must match the
/// constants in the firmware's `devices::backplane` module.
pub mod limits {
    pub const MAX_HFC: usize = 4;
    pub const MAX_DFC: usize = 16;
    pub const MAX_ROUTES: usize = 32;
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Configuration {
    pub port: Port,
    pub backplane: Backplane,
    pub pins: PinMap,
    pub memory_configuration: MemoryConfiguration,
}

impl Configuration {
    pub fn complete(&self) -> bool { self.violations().next().is_none() }

    /// Every reason why this configuration can't be turned into firmware.
    pub fn violations(&self) -> impl Iterator<Item = Violation> + '_ {
        let backplane = &self.backplane;
        let hfc = backplane.num_of_hfc as usize;
        let dfc = backplane.num_of_dfc as usize;

        let bounds = [
            (hfc == 0 || hfc > limits::MAX_HFC).then(|| Violation::HfcCount(hfc)),
            (dfc == 0 || dfc > limits::MAX_DFC).then(|| Violation::DfcCount(dfc)),
            (backplane.routes.len() > limits::MAX_ROUTES)
                .then(|| Violation::TooManyRoutes(backplane.routes.len())),
            (self.pins.dfc.len() != dfc).then(|| Violation::DfcPins(self.pins.dfc.len())),
            (self.pins.hfc.len() != hfc).then(|| Violation::HfcPins(self.pins.hfc.len())),
            self.memory_configuration
                .area(AreaId::Primary)
                .is_none()
                .then(|| Violation::MissingArea(AreaId::Primary)),
            (self.memory_configuration.store.slot_count < 2).then(|| Violation::StoreSlots),
        ];

        let store = &self.memory_configuration.store;
        let store_overlaps = self
            .memory_configuration
            .areas
            .iter()
            .filter(move |a| {
                a.device == FlashDevice::Internal && a.offset < store.end() && store.offset < a.end()
            })
            .map(|a| Violation::StoreOverlap(a.id));

        let route_ranges = backplane.routes.iter().enumerate().filter_map(move |(i, r)| {
            (r.drive_connector_idx as usize >= dfc
                || r.slot_offset as usize >= dfc
                || r.hfc_identifier as usize >= hfc)
                .then(|| Violation::RouteOutOfRange(i))
        });

        let duplicates = backplane
            .routes
            .iter()
            .map(|r| (r.hfc_identifier, r.drive_connector_idx, r.domain))
            .sorted()
            .tuple_windows()
            .filter(|(a, b)| a == b)
            .map(|(a, _)| Violation::DuplicateRoute { hfc: a.0, dfc: a.1, domain: a.2 })
            .dedup();

        let pin_clashes = self
            .pins
            .connected()
            .sorted_by_key(|(_, pin)| format!("{}", pin))
            .tuple_windows()
            .filter(|((_, a), (_, b))| a == b)
            .map(|((first, pin), (second, _))| Violation::PinClash {
                pin: format!("{}", pin),
                first,
                second,
            });

        bounds
            .into_iter()
            .flatten()
            .chain(store_overlaps)
            .chain(route_ranges)
            .chain(duplicates)
            .chain(pin_clashes)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Violation {
    HfcCount(usize),
    DfcCount(usize),
    TooManyRoutes(usize),
    DfcPins(usize),
    HfcPins(usize),
    MissingArea(AreaId),
    StoreSlots,
    StoreOverlap(AreaId),
    RouteOutOfRange(usize),
    DuplicateRoute { hfc: u8, dfc: u8, domain: Domain },
    PinClash { pin: String, first: String, second: String },
}

impl Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::HfcCount(n) => {
                write!(f, "[Topology] {} HFCs (must be 1..={})", n, limits::MAX_HFC)
            }
            Violation::DfcCount(n) => {
                write!(f, "[Topology] {} DFCs (must be 1..={})", n, limits::MAX_DFC)
            }
            Violation::TooManyRoutes(n) => {
                write!(f, "[Routes] {} routes (at most {})", n, limits::MAX_ROUTES)
            }
            Violation::DfcPins(n) => write!(f, "[Pins] {} DFC pin sets, one per DFC required", n),
            Violation::HfcPins(n) => write!(f, "[Pins] {} HFC pin sets, one per HFC required", n),
            Violation::MissingArea(id) => write!(f, "[Memory Map] Missing {:?} flash area", id),
            Violation::StoreSlots => {
                write!(f, "[Memory Map] Store needs at least two slots to keep a prior copy")
            }
            Violation::StoreOverlap(id) => {
                write!(f, "[Memory Map] Store overlaps the {:?} flash area", id)
            }
            Violation::RouteOutOfRange(i) => {
                write!(f, "[Routes] Route {} references a connector outside the backplane", i)
            }
            Violation::DuplicateRoute { hfc, dfc, domain } => write!(
                f,
                "[Routes] Duplicate route for HFC {}, DFC {}, {:?} domain",
                hfc, dfc, domain
            ),
            Violation::PinClash { pin, first, second } => {
                write!(f, "[Pins] {} is used for both {} and {}", pin, first, second)
            }
        }
    }
}
