//! Backplane description: topology, identity, capabilities and the route
//! table. Immutable at runtime. A new table only takes effect after it is
//! persisted through `Supervisor::reprovision` and the controller restarts.

use crate::error::Error;

pub mod codec;
mod route;

pub use route::{DriveTypes, Route, RouteTable};

pub const MAX_HFC: usize = 4;
pub const MAX_DFC: usize = 16;
pub const MAX_ROUTES: usize = 32;

wire_enum! {
    /// Versioned route entry layout. A stored table carries exactly one.
    pub enum RouteSchema { Ubm1 = 0, Ubm0_5 = 1 }
}

wire_enum! {
    pub enum TwoWireArrangement { NoMux = 0, Mux = 1 }
}

wire_enum! {
    pub enum MaxByteCount { Bytes32 = 0, Bytes64 = 1, Bytes128 = 2, Bytes256 = 3 }
}

impl MaxByteCount {
    pub const fn bytes(self) -> usize { 32 << (self as usize) }
}

wire_enum! {
    pub enum PerstOverride { FollowHost = 0, HoldUntilReleased = 1 }
}

wire_enum! {
    pub enum TwoWireResetOperation {
        NotSupported = 0,
        ResetsController = 1,
        ResetsFruControllerMux = 2,
    }
}

wire_enum! {
    pub enum ControllerType { SpecDefined = 0, Vendor = 1 }
}

wire_enum! {
    pub enum LinkWidth { X1 = 0, X2 = 1, X4 = 2, X8 = 3, X16 = 4 }
}

wire_enum! {
    pub enum PortType { Converged = 0, Segregated = 1 }
}

wire_enum! {
    pub enum Domain { Primary = 0, Secondary = 1 }
}

wire_enum! {
    pub enum SataRate { NoLimit = 0, Gbps1_5 = 1, Gbps3 = 2, Gbps6 = 3 }
}

wire_enum! {
    pub enum PcieRate { NoLimit = 0, Gen1 = 1, Gen2 = 2, Gen3 = 3, Gen4 = 4, Gen5 = 5 }
}

wire_enum! {
    pub enum SasRate { NoLimit = 0, Gbps3 = 1, Gbps6 = 2, Gbps12 = 3, Gbps22_5 = 4 }
}

/// Runtime settings the host can read and write. The copy in the
/// overview area is the factory default; the live copy is persisted
/// separately in the configuration store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct ControllerFeatures {
    pub read_checksum_creation: bool,
    pub write_checksum_checking: bool,
    pub cprsnt_legacy_mode: bool,
    pub pcie_reset_change_count_mask: bool,
    pub drive_type_installed_change_count_mask: bool,
    pub operational_state_change_count_mask: bool,
    pub perst_management_override: PerstOverride,
    pub smbus_reset_control: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct OverviewArea {
    pub two_wire_device_arrangement: TwoWireArrangement,
    pub two_wire_mux_address: u8,
    pub two_wire_max_byte_count: MaxByteCount,
    /// In units of 100ms.
    pub ubm_max_time_limit: u8,
    pub ubm_controller_features: ControllerFeatures,
    pub maximum_power_per_dfc: u8,
    pub mux_channel_count: u8,
    pub mux_enable_bit_location: u8,
    pub mux_type: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct SiliconIdentity {
    pub pcie_vendor_id: u16,
    pub device_code: u32,
    pub fw_version_minor: u8,
    pub fw_version_major: u8,
    pub vendor_specific: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct BackplaneInfo {
    pub backplane_type: u8,
    pub backplane_number: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct Capabilities {
    pub clock_routing: bool,
    pub slot_power_control: bool,
    pub pcie_reset_control: bool,
    pub dual_port: bool,
    pub i2c_reset_operation: TwoWireResetOperation,
    pub change_detect_interrupt: bool,
    pub dfc_change_count_supported: bool,
    pub prsnt_reported: bool,
    pub ifdet_reported: bool,
    pub ifdet2_reported: bool,
    pub perst_override_supported: bool,
    pub smb_reset_supported: bool,
}

/// Every scalar of the backplane description, i.e. all but the routes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct Parameters {
    pub num_of_hfc: u8,
    pub num_of_dfc: u8,
    pub starting_slot: u8,
    pub bifurcate_port: bool,
    pub schema: RouteSchema,
    pub overview: OverviewArea,
    pub silicon_identity: SiliconIdentity,
    pub backplane_info: BackplaneInfo,
    pub capabilities: Capabilities,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackplaneConfig {
    pub parameters: Parameters,
    pub routes: RouteTable,
}

impl BackplaneConfig {
    /// Validates topology limits and the route table.
    pub fn new(parameters: Parameters, routes: &[Route]) -> Result<Self, Error> {
        let (hfc, dfc) = (parameters.num_of_hfc as usize, parameters.num_of_dfc as usize);
        if hfc == 0 || hfc > MAX_HFC || dfc == 0 || dfc > MAX_DFC {
            return Err(Error::TooManyConnectors);
        }
        let routes = RouteTable::new(routes, parameters.num_of_hfc, parameters.num_of_dfc)?;
        Ok(Self { parameters, routes })
    }

    pub fn num_of_hfc(&self) -> usize { self.parameters.num_of_hfc as usize }
    pub fn num_of_dfc(&self) -> usize { self.parameters.num_of_dfc as usize }
    pub fn capabilities(&self) -> &Capabilities { &self.parameters.capabilities }
    pub fn factory_features(&self) -> ControllerFeatures {
        self.parameters.overview.ubm_controller_features
    }

    /// Maximum time a drive is given to settle after insertion.
    pub fn settle_time(&self) -> crate::hal::time::Milliseconds {
        crate::hal::time::Milliseconds(self.parameters.overview.ubm_max_time_limit as u32 * 100)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Backplane used across device tests: two HFCs, four DFCs. HFC 0
    //! reaches DFCs 0 to 2, HFC 1 reaches DFC 3 and DFC 0's secondary port.
    use super::*;

    pub fn features() -> ControllerFeatures {
        ControllerFeatures {
            read_checksum_creation: true,
            write_checksum_checking: true,
            cprsnt_legacy_mode: false,
            pcie_reset_change_count_mask: false,
            drive_type_installed_change_count_mask: false,
            operational_state_change_count_mask: false,
            perst_management_override: PerstOverride::FollowHost,
            smbus_reset_control: false,
        }
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            clock_routing: true,
            slot_power_control: true,
            pcie_reset_control: true,
            dual_port: true,
            i2c_reset_operation: TwoWireResetOperation::ResetsController,
            change_detect_interrupt: true,
            dfc_change_count_supported: true,
            prsnt_reported: true,
            ifdet_reported: true,
            ifdet2_reported: true,
            perst_override_supported: true,
            smb_reset_supported: true,
        }
    }

    pub fn parameters() -> Parameters {
        Parameters {
            num_of_hfc: 2,
            num_of_dfc: 4,
            starting_slot: 8,
            bifurcate_port: false,
            schema: RouteSchema::Ubm1,
            overview: OverviewArea {
                two_wire_device_arrangement: TwoWireArrangement::NoMux,
                two_wire_mux_address: 0,
                two_wire_max_byte_count: MaxByteCount::Bytes32,
                ubm_max_time_limit: 4,
                ubm_controller_features: features(),
                maximum_power_per_dfc: 25,
                mux_channel_count: 0,
                mux_enable_bit_location: 0,
                mux_type: 0,
            },
            silicon_identity: SiliconIdentity {
                pcie_vendor_id: 0xAA55,
                device_code: 0xFACE_8D00,
                fw_version_minor: 0x00,
                fw_version_major: 0x20,
                vendor_specific: 0x1234,
            },
            backplane_info: BackplaneInfo { backplane_type: 0, backplane_number: 0x0A },
            capabilities: capabilities(),
        }
    }

    pub fn route(hfc: u8, dfc: u8, domain: Domain) -> Route {
        Route {
            ctrl_type: ControllerType::SpecDefined,
            ctrl_address: 0x60,
            dfc,
            drive_types: DriveTypes::SAS_SATA | DriveTypes::QUAD_PCIE,
            link_width: LinkWidth::X4,
            port_type: PortType::Converged,
            domain,
            max_sata_rate: SataRate::Gbps6,
            max_pcie_rate: PcieRate::Gen4,
            max_sas_rate: SasRate::NoLimit,
            hfc_starting_lane: 0,
            hfc,
            slot_offset: dfc,
            dfc_status_and_control: true,
            actdetect: true,
        }
    }

    pub fn routes() -> [Route; 5] {
        [
            route(0, 0, Domain::Primary),
            route(0, 1, Domain::Primary),
            route(0, 2, Domain::Primary),
            route(1, 3, Domain::Primary),
            route(1, 0, Domain::Secondary),
        ]
    }

    pub fn backplane() -> BackplaneConfig {
        BackplaneConfig::new(parameters(), &routes()).unwrap()
    }
}
