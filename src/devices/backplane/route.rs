use super::{
    ControllerType, Domain, LinkWidth, PcieRate, PortType, SasRate, SataRate, MAX_ROUTES,
};
use crate::{error::Error, utilities::iterator::Unique};
use bitflags::bitflags;
use heapless::Vec;

bitflags! {
    /// Drive types a connector is wired to accept.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct DriveTypes: u8 {
        const SFF_TA_1001 = 1 << 0;
        const GEN_Z = 1 << 1;
        const SAS_SATA = 1 << 2;
        const QUAD_PCIE = 1 << 3;
        const DFC_EMPTY = 1 << 4;
    }
}

#[cfg(target_arch = "arm")]
impl defmt::Format for DriveTypes {
    fn format(&self, f: defmt::Formatter) { defmt::write!(f, "DriveTypes({=u8:#x})", self.bits()) }
}

/// Connects one host facing connector to one drive facing connector
/// through one of the drive's ports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct Route {
    pub ctrl_type: ControllerType,
    pub ctrl_address: u8,
    pub dfc: u8,
    pub drive_types: DriveTypes,
    pub link_width: LinkWidth,
    pub port_type: PortType,
    pub domain: Domain,
    pub max_sata_rate: SataRate,
    pub max_pcie_rate: PcieRate,
    pub max_sas_rate: SasRate,
    pub hfc_starting_lane: u8,
    pub hfc: u8,
    pub slot_offset: u8,
    /// Ignored by the UBM 1.x schema.
    pub dfc_status_and_control: bool,
    /// Ignored by the UBM 1.x schema.
    pub actdetect: bool,
}

impl Route {
    fn key(&self) -> (u8, u8, Domain) { (self.hfc, self.dfc, self.domain) }
}

/// Validated route table. Every `(hfc, dfc, domain)` is unique and every
/// index is inside the backplane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route, MAX_ROUTES>,
}

impl RouteTable {
    pub fn new(routes: &[Route], num_of_hfc: u8, num_of_dfc: u8) -> Result<Self, Error> {
        if routes.len() > MAX_ROUTES {
            return Err(Error::TooManyRoutes);
        }
        if routes
            .iter()
            .any(|r| r.hfc >= num_of_hfc || r.dfc >= num_of_dfc || r.slot_offset >= num_of_dfc)
        {
            return Err(Error::RouteOutOfRange);
        }
        if !routes.iter().map(Route::key).all_unique() {
            return Err(Error::DuplicateRoute);
        }
        let routes = Vec::from_slice(routes).map_err(|_| Error::TooManyRoutes)?;
        Ok(Self { routes })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> + Clone { self.routes.iter() }

    pub fn len(&self) -> usize { self.routes.len() }

    pub fn is_empty(&self) -> bool { self.routes.is_empty() }

    /// Routes reachable from a host facing connector, in table order.
    pub fn for_hfc(&self, hfc: u8) -> impl Iterator<Item = &Route> + Clone {
        self.routes.iter().filter(move |r| r.hfc == hfc)
    }

    /// Host facing connectors wired to a drive facing connector.
    pub fn hfcs_for(&self, dfc: u8) -> impl Iterator<Item = u8> + '_ {
        self.routes.iter().filter(move |r| r.dfc == dfc).map(|r| r.hfc)
    }

    /// First route from `hfc` to `dfc`, if they are connected at all.
    pub fn route(&self, hfc: u8, dfc: u8) -> Option<&Route> {
        self.for_hfc(hfc).find(|r| r.dfc == dfc)
    }

    /// Whether the secondary port of a drive is wired to any host.
    pub fn has_secondary(&self, dfc: u8) -> bool {
        self.routes.iter().any(|r| r.dfc == dfc && r.domain == Domain::Secondary)
    }
}
