use anyhow::Result;
use proc_macro2::TokenStream;
use quote::quote;
use std::{fs::File, io::Write};

use super::variant;
use crate::{
    backplane::{Backplane, ControllerFeatures, DriveTypes, Route},
    Configuration,
};

/// Generates the factory default backplane table: every scalar parameter
/// plus the route table, and a constructor that validates them.
pub fn generate_backplane(configuration: &Configuration, file: &mut File) -> Result<()> {
    let backplane = &configuration.backplane;
    let parameters = parameters(backplane);
    let routes = backplane.routes.iter().map(route);
    let route_count = backplane.routes.len();

    let code = quote! {
        use crate::devices::backplane::{
            BackplaneConfig, BackplaneInfo, Capabilities, ControllerFeatures, ControllerType,
            Domain, DriveTypes, LinkWidth, MaxByteCount, OverviewArea, Parameters, PcieRate,
            PerstOverride, PortType, Route, RouteSchema, SasRate, SataRate, SiliconIdentity,
            TwoWireArrangement, TwoWireResetOperation,
        };
        use crate::error::Error;

        pub const FACTORY_PARAMETERS: Parameters = #parameters;

        pub const FACTORY_ROUTES: [Route; #route_count] = [#(#routes),*];

        /// Backplane table this board ships with, used whenever the
        /// configuration store holds no valid copy.
        pub fn factory_backplane() -> Result<BackplaneConfig, Error> {
            BackplaneConfig::new(FACTORY_PARAMETERS, &FACTORY_ROUTES)
        }
    };

    file.write_all(format!("{}", code).as_bytes())?;
    Ok(())
}

fn parameters(backplane: &Backplane) -> TokenStream {
    let num_of_hfc = backplane.num_of_hfc;
    let num_of_dfc = backplane.num_of_dfc;
    let starting_slot = backplane.starting_slot;
    let bifurcate_port = backplane.bifurcate_port;
    let schema = variant(&backplane.schema);

    let overview = &backplane.overview_area;
    let arrangement = variant(&overview.two_wire_device_arrangement);
    let mux_address = overview.two_wire_mux_address;
    let max_byte_count = variant(&overview.two_wire_max_byte_count);
    let time_limit = overview.ubm_max_time_limit;
    let features = features(&overview.ubm_controller_features);
    let max_power = overview.maximum_power_per_dfc;
    let mux_channel_count = overview.mux_channel_count;
    let mux_enable_bit_location = overview.mux_enable_bit_location;
    let mux_type = overview.mux_type;

    let identity = &backplane.silicon_identity;
    let vendor_id = identity.pcie_vendor_id;
    let device_code = identity.device_code;
    let minor = identity.fw_version_minor;
    let major = identity.fw_version_major;
    let vendor_specific = identity.vendor_specific;

    let backplane_type = backplane.backplane_info.backplane_type;
    let backplane_number = backplane.backplane_info.backplane_number;

    let c = &backplane.capabilities;
    let (clock_routing, slot_power_control, pcie_reset_control, dual_port) =
        (c.clock_routing, c.slot_power_control, c.pcie_reset_control, c.dual_port);
    let i2c_reset_operation = variant(&c.i2c_reset_operation);
    let (change_detect_interrupt, dfc_change_count_supported) =
        (c.change_detect_interrupt, c.dfc_change_count_supported);
    let (prsnt_reported, ifdet_reported, ifdet2_reported) =
        (c.prsnt_reported, c.ifdet_reported, c.ifdet2_reported);
    let (perst_override_supported, smb_reset_supported) =
        (c.perst_override_supported, c.smb_reset_supported);

    quote! {
        Parameters {
            num_of_hfc: #num_of_hfc,
            num_of_dfc: #num_of_dfc,
            starting_slot: #starting_slot,
            bifurcate_port: #bifurcate_port,
            schema: RouteSchema::#schema,
            overview: OverviewArea {
                two_wire_device_arrangement: TwoWireArrangement::#arrangement,
                two_wire_mux_address: #mux_address,
                two_wire_max_byte_count: MaxByteCount::#max_byte_count,
                ubm_max_time_limit: #time_limit,
                ubm_controller_features: #features,
                maximum_power_per_dfc: #max_power,
                mux_channel_count: #mux_channel_count,
                mux_enable_bit_location: #mux_enable_bit_location,
                mux_type: #mux_type,
            },
            silicon_identity: SiliconIdentity {
                pcie_vendor_id: #vendor_id,
                device_code: #device_code,
                fw_version_minor: #minor,
                fw_version_major: #major,
                vendor_specific: #vendor_specific,
            },
            backplane_info: BackplaneInfo {
                backplane_type: #backplane_type,
                backplane_number: #backplane_number,
            },
            capabilities: Capabilities {
                clock_routing: #clock_routing,
                slot_power_control: #slot_power_control,
                pcie_reset_control: #pcie_reset_control,
                dual_port: #dual_port,
                i2c_reset_operation: TwoWireResetOperation::#i2c_reset_operation,
                change_detect_interrupt: #change_detect_interrupt,
                dfc_change_count_supported: #dfc_change_count_supported,
                prsnt_reported: #prsnt_reported,
                ifdet_reported: #ifdet_reported,
                ifdet2_reported: #ifdet2_reported,
                perst_override_supported: #perst_override_supported,
                smb_reset_supported: #smb_reset_supported,
            },
        }
    }
}

fn features(features: &ControllerFeatures) -> TokenStream {
    let read_checksum_creation = features.read_checksum_creation;
    let write_checksum_checking = features.write_checksum_checking;
    let cprsnt_legacy_mode = features.cprsnt_legacy_mode;
    let pcie_reset_mask = features.pcie_reset_change_count_mask;
    let drive_type_mask = features.drive_type_installed_change_count_mask;
    let operational_state_mask = features.operational_state_change_count_mask;
    let perst = variant(&features.perst_management_override);
    let smbus_reset_control = features.smbus_reset_control;
    quote! {
        ControllerFeatures {
            read_checksum_creation: #read_checksum_creation,
            write_checksum_checking: #write_checksum_checking,
            cprsnt_legacy_mode: #cprsnt_legacy_mode,
            pcie_reset_change_count_mask: #pcie_reset_mask,
            drive_type_installed_change_count_mask: #drive_type_mask,
            operational_state_change_count_mask: #operational_state_mask,
            perst_management_override: PerstOverride::#perst,
            smbus_reset_control: #smbus_reset_control,
        }
    }
}

/// Bit layout shared with `DriveTypes` in the firmware.
fn drive_type_bits(types: &DriveTypes) -> u8 {
    [types.sff_ta_1001, types.gen_z, types.sas_sata, types.quad_pcie, types.dfc_empty]
        .iter()
        .enumerate()
        .filter(|(_, supported)| **supported)
        .fold(0u8, |bits, (i, _)| bits | (1 << i))
}

fn route(route: &Route) -> TokenStream {
    let ctrl_type = variant(&route.ubm_ctrl_type);
    let ctrl_address = route.ubm_ctrl_slave_addr;
    let dfc = route.drive_connector_idx;
    let drive_types = drive_type_bits(&route.drive_types_supported);
    let link_width = variant(&route.drive_link_width);
    let port_type = variant(&route.port_type);
    let domain = variant(&route.domain);
    let sata = variant(&route.max_sata_line_rate);
    let pcie = variant(&route.max_pcie_line_rate);
    let sas = variant(&route.max_sas_line_rate);
    let lane = route.hfc_starting_phy_lane;
    let hfc = route.hfc_identifier;
    let slot_offset = route.slot_offset;
    let dfc_status_and_control = route.dfc_status_and_control;
    let actdetect = route.actdetect;

    quote! {
        Route {
            ctrl_type: ControllerType::#ctrl_type,
            ctrl_address: #ctrl_address,
            dfc: #dfc,
            drive_types: DriveTypes::from_bits_retain(#drive_types),
            link_width: LinkWidth::#link_width,
            port_type: PortType::#port_type,
            domain: Domain::#domain,
            max_sata_rate: SataRate::#sata,
            max_pcie_rate: PcieRate::#pcie,
            max_sas_rate: SasRate::#sas,
            hfc_starting_lane: #lane,
            hfc: #hfc,
            slot_offset: #slot_offset,
            dfc_status_and_control: #dfc_status_and_control,
            actdetect: #actdetect,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn drive_type_bits_follow_declaration_order() {
        let types = DriveTypes { sas_sata: true, quad_pcie: true, ..Default::default() };
        assert_eq!(0b0_1100, drive_type_bits(&types));
        let types = DriveTypes { sff_ta_1001: true, dfc_empty: true, ..Default::default() };
        assert_eq!(0b1_0001, drive_type_bits(&types));
    }
}
