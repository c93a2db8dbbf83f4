//! Little endian byte encoding of the backplane description and the
//! controller features, used both for persistence and for host replies.
//!
//! Backplane record layout (version 1):
//!
//! | Offset | Field                                                    |
//! |--------|----------------------------------------------------------|
//! | 0      | codec version                                            |
//! | 1      | route schema                                             |
//! | 2..6   | HFC count, DFC count, starting slot, bifurcate port      |
//! | 6..16  | overview area (features take two bytes at 10..12)        |
//! | 16..26 | silicon identity                                         |
//! | 26..28 | backplane info                                           |
//! | 28..30 | capabilities                                             |
//! | 30     | route count, followed by the route entries              |
use super::{
    BackplaneConfig, BackplaneInfo, Capabilities, ControllerFeatures, DriveTypes, OverviewArea,
    Parameters, Route, RouteSchema, SiliconIdentity, MAX_ROUTES,
};
use crate::{
    error::Error,
    utilities::bitwise::{BitBuild, BitFlags},
};
use core::convert::TryFrom;
use heapless::Vec;
use static_assertions::const_assert;

pub const CODEC_VERSION: u8 = 1;
pub const FEATURES_SIZE: usize = 2;
pub const PARAMETERS_SIZE: usize = 31;
pub const ROUTE_SIZE: usize = 13;
pub const LEGACY_ROUTE_SIZE: usize = ROUTE_SIZE + 1;
pub const MAX_ENCODED_SIZE: usize = PARAMETERS_SIZE + MAX_ROUTES * LEGACY_ROUTE_SIZE;

// A full table must fit a single store slot of the smallest supported size.
const_assert!(MAX_ENCODED_SIZE <= 512 - crate::devices::config_store::RECORD_OVERHEAD);

pub const fn route_size(schema: RouteSchema) -> usize {
    match schema {
        RouteSchema::Ubm1 => ROUTE_SIZE,
        RouteSchema::Ubm0_5 => LEGACY_ROUTE_SIZE,
    }
}

struct Writer<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl<'a> Writer<'a> {
    fn new(buffer: &'a mut [u8]) -> Self { Self { buffer, position: 0 } }

    fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.position + bytes.len();
        self.buffer
            .get_mut(self.position..end)
            .ok_or(Error::RecordTooLarge)?
            .copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    fn byte(&mut self, byte: u8) -> Result<(), Error> { self.put(&[byte]) }
    fn flag(&mut self, flag: bool) -> Result<(), Error> { self.byte(flag as u8) }
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self { Self { bytes, position: 0 } }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let end = self.position + N;
        let slice = self.bytes.get(self.position..end).ok_or(Error::MalformedRecord)?;
        self.position = end;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn byte(&mut self) -> Result<u8, Error> { Ok(self.take::<1>()?[0]) }
    fn u16(&mut self) -> Result<u16, Error> { Ok(u16::from_le_bytes(self.take()?)) }
    fn u32(&mut self) -> Result<u32, Error> { Ok(u32::from_le_bytes(self.take()?)) }

    fn flag(&mut self) -> Result<bool, Error> {
        match self.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::MalformedRecord),
        }
    }

    fn code<T: TryFrom<u8, Error = Error>>(&mut self) -> Result<T, Error> {
        T::try_from(self.byte()?)
    }
}

pub fn encode_features(features: &ControllerFeatures) -> [u8; FEATURES_SIZE] {
    let flags = 0u8
        .with_bit(0, features.read_checksum_creation)
        .with_bit(1, features.write_checksum_checking)
        .with_bit(2, features.cprsnt_legacy_mode)
        .with_bit(3, features.pcie_reset_change_count_mask)
        .with_bit(4, features.drive_type_installed_change_count_mask)
        .with_bit(5, features.operational_state_change_count_mask)
        .with_bit(6, features.smbus_reset_control);
    [flags, features.perst_management_override.code()]
}

pub fn decode_features(bytes: &[u8]) -> Result<ControllerFeatures, Error> {
    match bytes {
        [flags, perst] if flags & 0x80 == 0 => Ok(ControllerFeatures {
            read_checksum_creation: flags.is_set(0),
            write_checksum_checking: flags.is_set(1),
            cprsnt_legacy_mode: flags.is_set(2),
            pcie_reset_change_count_mask: flags.is_set(3),
            drive_type_installed_change_count_mask: flags.is_set(4),
            operational_state_change_count_mask: flags.is_set(5),
            smbus_reset_control: flags.is_set(6),
            perst_management_override: TryFrom::try_from(*perst)?,
        }),
        _ => Err(Error::MalformedRecord),
    }
}

pub fn encode_capabilities(capabilities: &Capabilities) -> u16 {
    let reset_operation = (capabilities.i2c_reset_operation.code() as u16) << 4;
    0u16.with_bit(0, capabilities.clock_routing)
        .with_bit(1, capabilities.slot_power_control)
        .with_bit(2, capabilities.pcie_reset_control)
        .with_bit(3, capabilities.dual_port)
        .with_bit(6, capabilities.change_detect_interrupt)
        .with_bit(7, capabilities.dfc_change_count_supported)
        .with_bit(8, capabilities.prsnt_reported)
        .with_bit(9, capabilities.ifdet_reported)
        .with_bit(10, capabilities.ifdet2_reported)
        .with_bit(11, capabilities.perst_override_supported)
        .with_bit(12, capabilities.smb_reset_supported)
        | reset_operation
}

pub fn decode_capabilities(bits: u16) -> Result<Capabilities, Error> {
    if bits & 0xE000 != 0 {
        return Err(Error::MalformedRecord);
    }
    Ok(Capabilities {
        clock_routing: bits.is_set(0),
        slot_power_control: bits.is_set(1),
        pcie_reset_control: bits.is_set(2),
        dual_port: bits.is_set(3),
        i2c_reset_operation: TryFrom::try_from(((bits >> 4) & 0b11) as u8)?,
        change_detect_interrupt: bits.is_set(6),
        dfc_change_count_supported: bits.is_set(7),
        prsnt_reported: bits.is_set(8),
        ifdet_reported: bits.is_set(9),
        ifdet2_reported: bits.is_set(10),
        perst_override_supported: bits.is_set(11),
        smb_reset_supported: bits.is_set(12),
    })
}

/// Encodes a single route entry, as stored and as returned to the host.
pub fn encode_route(route: &Route, schema: RouteSchema, buffer: &mut [u8]) -> Result<usize, Error> {
    let mut writer = Writer::new(buffer);
    write_route(&mut writer, route, schema)?;
    Ok(writer.position)
}

fn write_route(writer: &mut Writer, route: &Route, schema: RouteSchema) -> Result<(), Error> {
    writer.put(&[
        route.ctrl_type.code(),
        route.ctrl_address,
        route.dfc,
        route.drive_types.bits(),
        route.link_width.code(),
        route.port_type.code(),
        route.domain.code(),
        route.max_sata_rate.code(),
        route.max_pcie_rate.code(),
        route.max_sas_rate.code(),
        route.hfc_starting_lane,
        route.hfc,
        route.slot_offset,
    ])?;
    if schema == RouteSchema::Ubm0_5 {
        writer.byte(0u8.with_bit(0, route.dfc_status_and_control).with_bit(1, route.actdetect))?;
    }
    Ok(())
}

fn read_route(reader: &mut Reader, schema: RouteSchema) -> Result<Route, Error> {
    let mut route = Route {
        ctrl_type: reader.code()?,
        ctrl_address: reader.byte()?,
        dfc: reader.byte()?,
        drive_types: DriveTypes::from_bits(reader.byte()?).ok_or(Error::MalformedRecord)?,
        link_width: reader.code()?,
        port_type: reader.code()?,
        domain: reader.code()?,
        max_sata_rate: reader.code()?,
        max_pcie_rate: reader.code()?,
        max_sas_rate: reader.code()?,
        hfc_starting_lane: reader.byte()?,
        hfc: reader.byte()?,
        slot_offset: reader.byte()?,
        dfc_status_and_control: true,
        actdetect: true,
    };
    if schema == RouteSchema::Ubm0_5 {
        let bits = reader.byte()?;
        route.dfc_status_and_control = bits.is_set(0);
        route.actdetect = bits.is_set(1);
    }
    Ok(route)
}

pub fn encode(config: &BackplaneConfig, buffer: &mut [u8]) -> Result<usize, Error> {
    encode_parts(&config.parameters, config.routes.iter(), buffer)
}

/// Encodes a backplane without validating its routes.
pub fn encode_parts<'a, I>(parameters: &Parameters, routes: I, buffer: &mut [u8]) -> Result<usize, Error>
where
    I: Iterator<Item = &'a Route> + Clone,
{
    let route_count = routes.clone().count();
    if route_count > MAX_ROUTES {
        return Err(Error::TooManyRoutes);
    }

    let mut writer = Writer::new(buffer);
    let p = parameters;
    writer.put(&[CODEC_VERSION, p.schema.code(), p.num_of_hfc, p.num_of_dfc, p.starting_slot])?;
    writer.flag(p.bifurcate_port)?;

    let o = &p.overview;
    writer.put(&[
        o.two_wire_device_arrangement.code(),
        o.two_wire_mux_address,
        o.two_wire_max_byte_count.code(),
        o.ubm_max_time_limit,
    ])?;
    writer.put(&encode_features(&o.ubm_controller_features))?;
    writer.put(&[
        o.maximum_power_per_dfc,
        o.mux_channel_count,
        o.mux_enable_bit_location,
        o.mux_type,
    ])?;

    let s = &p.silicon_identity;
    writer.put(&s.pcie_vendor_id.to_le_bytes())?;
    writer.put(&s.device_code.to_le_bytes())?;
    writer.put(&[s.fw_version_minor, s.fw_version_major])?;
    writer.put(&s.vendor_specific.to_le_bytes())?;

    writer.put(&[p.backplane_info.backplane_type, p.backplane_info.backplane_number])?;
    writer.put(&encode_capabilities(&p.capabilities).to_le_bytes())?;

    writer.byte(route_count as u8)?;
    for route in routes {
        write_route(&mut writer, route, p.schema)?;
    }
    Ok(writer.position)
}

/// Decodes a backplane record. Malformed bytes are reported as
/// `MalformedRecord`; well formed records with an invalid route table
/// carry the route validation error.
pub fn decode(bytes: &[u8]) -> Result<BackplaneConfig, Error> {
    let mut reader = Reader::new(bytes);
    if reader.byte()? != CODEC_VERSION {
        return Err(Error::MalformedRecord);
    }
    let schema: RouteSchema = reader.code()?;
    let (num_of_hfc, num_of_dfc, starting_slot) = (reader.byte()?, reader.byte()?, reader.byte()?);
    let bifurcate_port = reader.flag()?;

    let two_wire_device_arrangement = reader.code()?;
    let two_wire_mux_address = reader.byte()?;
    let two_wire_max_byte_count = reader.code()?;
    let ubm_max_time_limit = reader.byte()?;
    let ubm_controller_features = decode_features(&reader.take::<FEATURES_SIZE>()?)?;
    let overview = OverviewArea {
        two_wire_device_arrangement,
        two_wire_mux_address,
        two_wire_max_byte_count,
        ubm_max_time_limit,
        ubm_controller_features,
        maximum_power_per_dfc: reader.byte()?,
        mux_channel_count: reader.byte()?,
        mux_enable_bit_location: reader.byte()?,
        mux_type: reader.byte()?,
    };

    let silicon_identity = SiliconIdentity {
        pcie_vendor_id: reader.u16()?,
        device_code: reader.u32()?,
        fw_version_minor: reader.byte()?,
        fw_version_major: reader.byte()?,
        vendor_specific: reader.u16()?,
    };
    let backplane_info =
        BackplaneInfo { backplane_type: reader.byte()?, backplane_number: reader.byte()? };
    let capabilities = decode_capabilities(reader.u16()?)?;

    let route_count = reader.byte()? as usize;
    if route_count > MAX_ROUTES {
        return Err(Error::MalformedRecord);
    }
    let mut routes: Vec<Route, MAX_ROUTES> = Vec::new();
    for _ in 0..route_count {
        routes.push(read_route(&mut reader, schema)?).map_err(|_| Error::MalformedRecord)?;
    }
    if reader.position != bytes.len() {
        return Err(Error::MalformedRecord);
    }

    let parameters = Parameters {
        num_of_hfc,
        num_of_dfc,
        starting_slot,
        bifurcate_port,
        schema,
        overview,
        silicon_identity,
        backplane_info,
        capabilities,
    };
    BackplaneConfig::new(parameters, &routes)
}
