//! The AoE header at the start of every AoE frame's payload.

use crate::AOE_VERSION;
use aoecrab_wire::{AoeWireRead, AoeWireSized, AoeWireWrite, AoeWireWriteSized, WireError};

bitflags::bitflags! {
    /// Flags held in the low nibble of the AoE version/flags byte.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct AoeFlags: u8 {
        /// The frame is a response from a target.
        const RESPONSE = 1 << 3;
        /// The response carries an error code in the error field.
        const ERROR = 1 << 2;
    }
}

/// AoE command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AoeCommand {
    /// Issue ATA command.
    Ata,
    /// Query config information.
    Config,
    /// Any other command code. Vendor specific commands start at `0xf0`.
    Unknown(u8),
}

impl From<u8> for AoeCommand {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Ata,
            1 => Self::Config,
            other => Self::Unknown(other),
        }
    }
}

impl From<AoeCommand> for u8 {
    fn from(value: AoeCommand) -> Self {
        match value {
            AoeCommand::Ata => 0,
            AoeCommand::Config => 1,
            AoeCommand::Unknown(other) => other,
        }
    }
}

/// Error code returned by a target when [`AoeFlags::ERROR`] is set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AoeErrorCode {
    /// Unrecognized command code.
    UnrecognizedCommand,
    /// Bad argument parameter.
    BadArgument,
    /// Device unavailable.
    DeviceUnavailable,
    /// Config string present.
    ConfigStringPresent,
    /// Unsupported version.
    UnsupportedVersion,
    /// Anything else.
    Unknown(u8),
}

impl From<u8> for AoeErrorCode {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::UnrecognizedCommand,
            2 => Self::BadArgument,
            3 => Self::DeviceUnavailable,
            4 => Self::ConfigStringPresent,
            5 => Self::UnsupportedVersion,
            other => Self::Unknown(other),
        }
    }
}

impl AoeErrorCode {
    /// Human readable description.
    pub const fn description(&self) -> &'static str {
        match self {
            AoeErrorCode::UnrecognizedCommand => "unrecognized command code",
            AoeErrorCode::BadArgument => "bad argument parameter",
            AoeErrorCode::DeviceUnavailable => "device unavailable",
            AoeErrorCode::ConfigStringPresent => "config string present",
            AoeErrorCode::UnsupportedVersion => "unsupported version",
            AoeErrorCode::Unknown(_) => "no such error",
        }
    }
}

/// AoE header.
///
/// Followed by either an [`AtaHeader`](crate::AtaHeader) or a
/// [`ConfigHeader`](crate::ConfigHeader) depending on [`command`](AoeHeader::command).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AoeHeader {
    /// Protocol version, stored in the high nibble of the first byte.
    pub version: u8,
    /// Flags, stored in the low nibble of the first byte.
    pub flags: AoeFlags,
    /// Error code, only meaningful when [`AoeFlags::ERROR`] is set.
    pub error: u8,
    /// Shelf address.
    pub major: u16,
    /// Slot address.
    pub minor: u8,
    /// Command.
    pub command: AoeCommand,
    /// Initiator-chosen tag, echoed back in the response.
    pub tag: u32,
}

impl AoeHeader {
    /// Create a request header with the given address, command and tag.
    pub fn request(major: u16, minor: u8, command: AoeCommand, tag: u32) -> Self {
        Self {
            version: AOE_VERSION,
            flags: AoeFlags::empty(),
            error: 0,
            major,
            minor,
            command,
            tag,
        }
    }

    /// Turn a request header into the matching response header.
    pub fn into_response(self) -> Self {
        Self {
            flags: self.flags | AoeFlags::RESPONSE,
            ..self
        }
    }

    /// Whether this header belongs to a response.
    pub fn is_response(&self) -> bool {
        self.flags.contains(AoeFlags::RESPONSE)
    }

    /// The error code carried by this header, if any.
    pub fn error_code(&self) -> Option<AoeErrorCode> {
        self.flags
            .contains(AoeFlags::ERROR)
            .then(|| AoeErrorCode::from(self.error))
    }
}

impl AoeWireSized for AoeHeader {
    const PACKED_LEN: usize = 10;

    type Buffer = [u8; 10];

    fn buffer() -> Self::Buffer {
        [0u8; 10]
    }
}

impl AoeWireRead for AoeHeader {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        let buf = buf
            .get(0..Self::PACKED_LEN)
            .ok_or(WireError::ReadBufferTooShort)?;

        Ok(Self {
            version: buf[0] >> 4,
            flags: AoeFlags::from_bits_truncate(buf[0] & 0x0f),
            error: buf[1],
            major: u16::unpack_from_slice(&buf[2..4])?,
            minor: buf[4],
            command: AoeCommand::from(buf[5]),
            tag: u32::unpack_from_slice(&buf[6..10])?,
        })
    }
}

impl AoeWireWrite for AoeHeader {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let buf = &mut buf[0..Self::PACKED_LEN];

        buf[0] = (self.version << 4) | (self.flags.bits() & 0x0f);
        buf[1] = self.error;
        self.major.pack_to_slice_unchecked(&mut buf[2..4]);
        buf[4] = self.minor;
        buf[5] = u8::from(self.command);
        self.tag.pack_to_slice_unchecked(&mut buf[6..10]);

        buf
    }

    fn packed_len(&self) -> usize {
        Self::PACKED_LEN
    }
}

impl AoeWireWriteSized for AoeHeader {
    fn pack(&self) -> Self::Buffer {
        let mut buf = Self::buffer();

        self.pack_to_slice_unchecked(&mut buf);

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pack_request() {
        let header = AoeHeader::request(0x0102, 0x03, AoeCommand::Ata, 0x0a0b_0c0d);

        assert_eq!(
            header.pack(),
            [0x10, 0x00, 0x01, 0x02, 0x03, 0x00, 0x0a, 0x0b, 0x0c, 0x0d]
        );
    }

    #[test]
    fn parse_error_response() {
        let raw = [0x1c, 0x03, 0x00, 0x07, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00];

        let header = AoeHeader::unpack_from_slice(&raw).unwrap();

        assert!(header.is_response());
        assert_eq!(header.major, 7);
        assert_eq!(header.minor, 1);
        assert_eq!(header.command, AoeCommand::Config);
        assert_eq!(header.error_code(), Some(AoeErrorCode::DeviceUnavailable));
        assert_eq!(
            header.error_code().map(|e| e.description()),
            Some("device unavailable")
        );
    }

    #[test]
    fn short_header() {
        assert_eq!(
            AoeHeader::unpack_from_slice(&[0x18, 0x00, 0x00]),
            Err(WireError::ReadBufferTooShort)
        );
    }

    #[test]
    fn vendor_command() {
        let raw = [0x18, 0x00, 0x00, 0x01, 0x01, 0xf0, 0x00, 0x00, 0x00, 0x01];

        let header = AoeHeader::unpack_from_slice(&raw).unwrap();

        assert_eq!(header.command, AoeCommand::Unknown(0xf0));
        assert_eq!(header.error_code(), None);
    }
}
