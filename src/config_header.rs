//! Query Config Information header.

use crate::AOE_VERSION;
use aoecrab_wire::{AoeWireRead, AoeWireSized, AoeWireWrite, AoeWireWriteSized, WireError};

/// Config sub-command, held in the low nibble of the `aoeccmd` byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigCommand {
    /// Read config string.
    #[default]
    Read,
    /// Test config string for an exact match.
    Test,
    /// Test config string for a prefix match.
    TestPrefix,
    /// Set config string if empty.
    Set,
    /// Force set config string.
    ForceSet,
    /// Anything else.
    Unknown(u8),
}

impl From<u8> for ConfigCommand {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Read,
            1 => Self::Test,
            2 => Self::TestPrefix,
            3 => Self::Set,
            4 => Self::ForceSet,
            other => Self::Unknown(other),
        }
    }
}

impl From<ConfigCommand> for u8 {
    fn from(value: ConfigCommand) -> Self {
        match value {
            ConfigCommand::Read => 0,
            ConfigCommand::Test => 1,
            ConfigCommand::TestPrefix => 2,
            ConfigCommand::Set => 3,
            ConfigCommand::ForceSet => 4,
            ConfigCommand::Unknown(other) => other & 0x0f,
        }
    }
}

/// Config header following an [`AoeHeader`](crate::AoeHeader) with command
/// [`Config`](crate::AoeCommand::Config).
///
/// The config string itself, if any, follows this header and is ignored by the initiator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConfigHeader {
    /// Number of outstanding commands the target can buffer.
    pub buffer_count: u16,
    /// Target firmware version.
    pub firmware_version: u16,
    /// Maximum sectors per ATA command. Zero on old targets.
    pub sector_count: u8,
    /// AoE version supported by the target.
    pub version: u8,
    /// Config sub-command.
    pub command: ConfigCommand,
    /// Length of the config string.
    pub config_len: u16,
}

impl ConfigHeader {
    /// An empty Read query.
    pub fn query() -> Self {
        Self {
            version: AOE_VERSION,
            ..Self::default()
        }
    }
}

impl AoeWireSized for ConfigHeader {
    const PACKED_LEN: usize = 8;

    type Buffer = [u8; 8];

    fn buffer() -> Self::Buffer {
        [0u8; 8]
    }
}

impl AoeWireRead for ConfigHeader {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        let buf = buf
            .get(0..Self::PACKED_LEN)
            .ok_or(WireError::ReadBufferTooShort)?;

        Ok(Self {
            buffer_count: u16::unpack_from_slice(&buf[0..2])?,
            firmware_version: u16::unpack_from_slice(&buf[2..4])?,
            sector_count: buf[4],
            version: buf[5] >> 4,
            command: ConfigCommand::from(buf[5] & 0x0f),
            config_len: u16::unpack_from_slice(&buf[6..8])?,
        })
    }
}

impl AoeWireWrite for ConfigHeader {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let buf = &mut buf[0..Self::PACKED_LEN];

        self.buffer_count.pack_to_slice_unchecked(&mut buf[0..2]);
        self.firmware_version.pack_to_slice_unchecked(&mut buf[2..4]);
        buf[4] = self.sector_count;
        buf[5] = (self.version << 4) | u8::from(self.command);
        self.config_len.pack_to_slice_unchecked(&mut buf[6..8]);

        buf
    }

    fn packed_len(&self) -> usize {
        Self::PACKED_LEN
    }
}

impl AoeWireWriteSized for ConfigHeader {
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
    fn query() {
        assert_eq!(ConfigHeader::query().pack(), [0, 0, 0, 0, 0, 0x10, 0, 0]);
    }

    #[test]
    fn parse_target_response() {
        let raw = [0x00, 0x10, 0x40, 0x1f, 0x02, 0x10, 0x00, 0x05, b'h', b'e'];

        let header = ConfigHeader::unpack_from_slice(&raw).unwrap();

        assert_eq!(
            header,
            ConfigHeader {
                buffer_count: 16,
                firmware_version: 0x401f,
                sector_count: 2,
                version: 1,
                command: ConfigCommand::Read,
                config_len: 5,
            }
        );
    }
}
