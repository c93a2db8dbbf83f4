//! Command frame parsing: checksum, opcode and length validation.
use crate::error::Error;

/// Longest command frame the engine accepts off the bus.
pub const MAX_COMMAND: usize = 8;

/// Reserved bits of a DFC control byte. Must be written as zero.
pub const CONTROL_RESERVED: u8 = 0xF0;

/// Command opcodes. Unknown values are carried through parsing so they
/// can be reported back to the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum Opcode {
    OperationalState,
    LastCommandStatus,
    SiliconIdentity,
    HostFacingConnectorInfo,
    BackplaneInfo,
    StartingSlot,
    Capabilities,
    Features,
    ChangeCount,
    RouteInformation,
    DfcStatusAndControl,
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Opcode::OperationalState,
            0x01 => Opcode::LastCommandStatus,
            0x02 => Opcode::SiliconIdentity,
            0x04 => Opcode::HostFacingConnectorInfo,
            0x05 => Opcode::BackplaneInfo,
            0x06 => Opcode::StartingSlot,
            0x07 => Opcode::Capabilities,
            0x08 => Opcode::Features,
            0x09 => Opcode::ChangeCount,
            0x0B => Opcode::RouteInformation,
            0x40 => Opcode::DfcStatusAndControl,
            other => Opcode::Unknown(other),
        }
    }
}

impl Opcode {
    pub fn code(self) -> u8 {
        match self {
            Opcode::OperationalState => 0x00,
            Opcode::LastCommandStatus => 0x01,
            Opcode::SiliconIdentity => 0x02,
            Opcode::HostFacingConnectorInfo => 0x04,
            Opcode::BackplaneInfo => 0x05,
            Opcode::StartingSlot => 0x06,
            Opcode::Capabilities => 0x07,
            Opcode::Features => 0x08,
            Opcode::ChangeCount => 0x09,
            Opcode::RouteInformation => 0x0B,
            Opcode::DfcStatusAndControl => 0x40,
            Opcode::Unknown(code) => code,
        }
    }

    /// Valid payload lengths (bytes after the opcode).
    fn payload_lengths(self) -> &'static [usize] {
        match self {
            Opcode::Features => &[0, 2],
            Opcode::ChangeCount => &[0, 1],
            Opcode::RouteInformation => &[1],
            Opcode::DfcStatusAndControl => &[1, 2],
            Opcode::Unknown(_) => &[],
            _ => &[0],
        }
    }
}

/// A fully parsed, well formed command. Index ranges and permissions are
/// checked later, against the backplane.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum Request {
    OperationalState,
    LastCommandStatus,
    SiliconIdentity,
    HostFacingConnectorInfo,
    BackplaneInfo,
    StartingSlot,
    Capabilities,
    ReadFeatures,
    WriteFeatures([u8; 2]),
    ReadChangeCount,
    ClearChangeCount,
    RouteInformation(u8),
    ReadDfcStatus(u8),
    WriteDfcControl(u8, u8),
}

/// Two's complement of the 8 bit sum of the address byte and `bytes`.
pub fn checksum(address_byte: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(address_byte, |sum, b| sum.wrapping_add(*b)).wrapping_neg()
}

/// Address byte of a host write to `address`.
pub fn write_address(address: u8) -> u8 { address << 1 }

/// Address byte of a host read from `address`.
pub fn read_address(address: u8) -> u8 { (address << 1) | 1 }

/// Parses a command frame received on `address`. With checking enabled the
/// last byte is the command checksum. With checking disabled frames carry
/// no checksum, and every byte after the opcode is payload.
pub fn parse(frame: &[u8], address: u8, check: bool) -> Result<Request, Error> {
    let body = if check {
        let (last, body) = frame.split_last().ok_or(Error::MalformedFrame)?;
        if checksum(write_address(address), body) != *last {
            return Err(Error::ChecksumMismatch);
        }
        body
    } else {
        frame
    };

    let (&code, payload) = body.split_first().ok_or(Error::MalformedFrame)?;
    let opcode = Opcode::from(code);
    if let Opcode::Unknown(code) = opcode {
        return Err(Error::UnknownOpcode(code));
    }

    if !opcode.payload_lengths().contains(&payload.len()) {
        return Err(Error::MalformedFrame);
    }

    let request = match (opcode, payload) {
        (Opcode::OperationalState, _) => Request::OperationalState,
        (Opcode::LastCommandStatus, _) => Request::LastCommandStatus,
        (Opcode::SiliconIdentity, _) => Request::SiliconIdentity,
        (Opcode::HostFacingConnectorInfo, _) => Request::HostFacingConnectorInfo,
        (Opcode::BackplaneInfo, _) => Request::BackplaneInfo,
        (Opcode::StartingSlot, _) => Request::StartingSlot,
        (Opcode::Capabilities, _) => Request::Capabilities,
        (Opcode::Features, []) => Request::ReadFeatures,
        (Opcode::Features, [first, second]) => Request::WriteFeatures([*first, *second]),
        (Opcode::ChangeCount, []) => Request::ReadChangeCount,
        (Opcode::ChangeCount, [_]) => Request::ClearChangeCount,
        (Opcode::RouteInformation, [index]) => Request::RouteInformation(*index),
        (Opcode::DfcStatusAndControl, [index]) => Request::ReadDfcStatus(*index),
        (Opcode::DfcStatusAndControl, [_, control]) if control & CONTROL_RESERVED != 0 => {
            return Err(Error::MalformedFrame)
        }
        (Opcode::DfcStatusAndControl, [index, control]) => Request::WriteDfcControl(*index, *control),
        _ => return Err(Error::MalformedFrame),
    };
    Ok(request)
}
