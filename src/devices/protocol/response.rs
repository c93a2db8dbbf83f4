//! Response serialization. Every response is `[status, length, data...]`,
//! followed by a checksum when read checksum creation is enabled.
use super::{frame::read_address, frame::checksum, Status};
use crate::{
    devices::{
        backplane::{codec, BackplaneConfig, ControllerFeatures},
        change::ChangeFields,
        connector::DfcState,
    },
    error::Error,
};
use heapless::Vec;

/// Longest data field of any response.
pub const MAX_DATA: usize = 16;
/// Status, length and checksum around the data field.
pub const FRAMING: usize = 3;
pub const MAX_RESPONSE: usize = MAX_DATA + FRAMING;

/// Reported in place of a drive type when nothing is installed.
pub const DRIVE_TYPE_EMPTY: u8 = 0x05;

pub type Data = Vec<u8, MAX_DATA>;
pub type Response = Vec<u8, MAX_RESPONSE>;

fn data(bytes: &[u8]) -> Result<Data, Error> { Vec::from_slice(bytes).map_err(|_| Error::ResponseTooLong) }

/// Frames `data` for the host. Fails with `ResponseTooLong` when the frame
/// doesn't fit in `limit` bytes.
pub fn build(status: Status, data: &[u8], address: u8, with_checksum: bool, limit: usize) -> Result<Response, Error> {
    let length = FRAMING - usize::from(!with_checksum) + data.len();
    if length > limit || length > MAX_RESPONSE {
        return Err(Error::ResponseTooLong);
    }
    let mut response = Response::new();
    response.push(status.code()).map_err(|_| Error::ResponseTooLong)?;
    response.push(data.len() as u8).map_err(|_| Error::ResponseTooLong)?;
    response.extend_from_slice(data).map_err(|_| Error::ResponseTooLong)?;
    if with_checksum {
        let sum = checksum(read_address(address), &response);
        response.push(sum).map_err(|_| Error::ResponseTooLong)?;
    }
    Ok(response)
}

pub fn operational_state(ready: bool, config_corrupt: bool) -> Result<Data, Error> {
    data(&[u8::from(ready) | u8::from(config_corrupt) << 1])
}

pub fn silicon_identity(config: &BackplaneConfig) -> Result<Data, Error> {
    let identity = &config.parameters.silicon_identity;
    let mut bytes = Data::new();
    bytes.extend_from_slice(&identity.pcie_vendor_id.to_le_bytes()).map_err(|_| Error::ResponseTooLong)?;
    bytes.extend_from_slice(&identity.device_code.to_le_bytes()).map_err(|_| Error::ResponseTooLong)?;
    bytes.extend_from_slice(&[identity.fw_version_minor, identity.fw_version_major]).map_err(|_| Error::ResponseTooLong)?;
    bytes.extend_from_slice(&identity.vendor_specific.to_le_bytes()).map_err(|_| Error::ResponseTooLong)?;
    Ok(bytes)
}

pub fn host_facing_connector_info(config: &BackplaneConfig, hfc: u8) -> Result<Data, Error> {
    let overview = &config.parameters.overview;
    data(&[
        overview.two_wire_device_arrangement.code(),
        overview.two_wire_mux_address,
        overview.two_wire_max_byte_count.code(),
        overview.ubm_max_time_limit,
        overview.maximum_power_per_dfc,
        overview.mux_channel_count,
        overview.mux_enable_bit_location,
        overview.mux_type,
        hfc,
        config.routes.for_hfc(hfc).count() as u8,
    ])
}

pub fn backplane_info(config: &BackplaneConfig) -> Result<Data, Error> {
    let p = &config.parameters;
    data(&[
        p.backplane_info.backplane_type,
        p.backplane_info.backplane_number,
        p.num_of_hfc,
        p.num_of_dfc,
        u8::from(p.bifurcate_port),
    ])
}

pub fn starting_slot(config: &BackplaneConfig) -> Result<Data, Error> { data(&[config.parameters.starting_slot]) }

pub fn capabilities(config: &BackplaneConfig) -> Result<Data, Error> {
    data(&codec::encode_capabilities(config.capabilities()).to_le_bytes())
}

pub fn features(features: &ControllerFeatures) -> Result<Data, Error> { data(&codec::encode_features(features)) }

pub fn change_count(count: u8, dirty: ChangeFields) -> Result<Data, Error> { data(&[count, dirty.bits()]) }

pub fn route_information(config: &BackplaneConfig, hfc: u8, index: u8) -> Result<Data, Error> {
    let route = config.routes.for_hfc(hfc).nth(index as usize).ok_or(Error::IndexOutOfRange(index))?;
    let mut buffer = [0u8; MAX_DATA];
    let size = codec::encode_route(route, config.parameters.schema, &mut buffer)?;
    data(&buffer[..size])
}

/// `[operational state, drive type, status bits, change count]`. Status
/// bits are PERST# asserted, power disabled and installed, from bit 0 up.
pub fn dfc_status(state: &DfcState, report_change_count: bool) -> Result<Data, Error> {
    let drive_type = match (state.installed, state.drive_type_detected) {
        (true, Some(drive)) => drive.code(),
        _ => DRIVE_TYPE_EMPTY,
    };
    let status = u8::from(state.perst_asserted)
        | u8::from(state.pwr_disabled) << 1
        | u8::from(state.installed) << 2;
    let change_count = if report_change_count { state.change_count } else { 0 };
    data(&[state.operational_state.code(), drive_type, status, change_count])
}
