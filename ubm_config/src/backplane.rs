//! Backplane description: topology, identity, capabilities and the
//! route table that maps host facing connectors onto drive facing connectors.
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Backplane {
    pub num_of_hfc: u8,
    pub num_of_dfc: u8,
    pub starting_slot: u8,
    #[serde(default)]
    pub bifurcate_port: bool,
    #[serde(default)]
    pub schema: RouteSchema,
    pub overview_area: OverviewArea,
    pub silicon_identity: SiliconIdentity,
    pub backplane_info: BackplaneInfo,
    pub capabilities: Capabilities,
    pub routes: Vec<Route>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteSchema {
    Ubm1,
    Ubm0_5,
}

impl Default for RouteSchema {
    fn default() -> Self { Self::Ubm1 }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OverviewArea {
    pub two_wire_device_arrangement: TwoWireArrangement,
    pub two_wire_mux_address: u8,
    pub two_wire_max_byte_count: MaxByteCount,
    /// Device max time limit, in units of 100ms.
    pub ubm_max_time_limit: u8,
    pub ubm_controller_features: ControllerFeatures,
    pub maximum_power_per_dfc: u8,
    pub mux_channel_count: u8,
    pub mux_enable_bit_location: u8,
    pub mux_type: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwoWireArrangement {
    NoMux,
    Mux,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxByteCount {
    Bytes32,
    Bytes64,
    Bytes128,
    Bytes256,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerstOverride {
    FollowHost,
    HoldUntilReleased,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
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

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiliconIdentity {
    pub pcie_vendor_id: u16,
    pub device_code: u32,
    pub fw_version_minor: u8,
    pub fw_version_major: u8,
    pub vendor_specific: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackplaneInfo {
    pub backplane_type: u8,
    pub backplane_number: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwoWireResetOperation {
    NotSupported,
    ResetsController,
    ResetsFruControllerMux,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
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

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerType {
    SpecDefined,
    Vendor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkWidth {
    X1,
    X2,
    X4,
    X8,
    X16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortType {
    Converged,
    Segregated,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Domain {
    Primary,
    Secondary,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SataRate {
    NoLimit,
    Gbps1_5,
    Gbps3,
    Gbps6,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcieRate {
    NoLimit,
    Gen1,
    Gen2,
    Gen3,
    Gen4,
    Gen5,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SasRate {
    NoLimit,
    Gbps3,
    Gbps6,
    Gbps12,
    Gbps22_5,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DriveTypes {
    pub sff_ta_1001: bool,
    pub gen_z: bool,
    pub sas_sata: bool,
    pub quad_pcie: bool,
    pub dfc_empty: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Route {
    pub ubm_ctrl_type: ControllerType,
    pub ubm_ctrl_slave_addr: u8,
    pub drive_connector_idx: u8,
    pub drive_types_supported: DriveTypes,
    pub drive_link_width: LinkWidth,
    pub port_type: PortType,
    pub domain: Domain,
    pub max_sata_line_rate: SataRate,
    pub max_pcie_line_rate: PcieRate,
    pub max_sas_line_rate: SasRate,
    pub hfc_starting_phy_lane: u8,
    pub hfc_identifier: u8,
    pub slot_offset: u8,
    /// Only meaningful for the 0.5 route schema.
    #[serde(default = "enabled")]
    pub dfc_status_and_control: bool,
    /// Only meaningful for the 0.5 route schema.
    #[serde(default = "enabled")]
    pub actdetect: bool,
}

fn enabled() -> bool { true }
