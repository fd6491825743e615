//! ATA command header carried inside an AoE ATA frame, and IDENTIFY DEVICE parsing.

use crate::{SECTOR_SIZE, buf::Direction};
use aoecrab_wire::{AoeWireRead, AoeWireSized, AoeWireWrite, AoeWireWriteSized, WireError};

/// First sector that can't be addressed with a 28 bit LBA.
pub(crate) const LBA28_LIMIT: u64 = 1 << 28;
/// First sector that can't be addressed with a 48 bit LBA.
pub(crate) const LBA48_LIMIT: u64 = 1 << 48;

pub(crate) const ATA_READ: u8 = 0x20;
pub(crate) const ATA_READ_EXT: u8 = 0x24;
pub(crate) const ATA_WRITE: u8 = 0x30;
pub(crate) const ATA_WRITE_EXT: u8 = 0x34;
pub(crate) const ATA_IDENTIFY: u8 = 0xec;

/// `BSY | DF | DRQ | ERR`. Any of these set in a response means the command failed.
const ATA_STATUS_FAILED: u8 = 0xa9;

/// Length of the IDENTIFY DEVICE data block.
pub(crate) const IDENTIFY_LEN: usize = 512;

bitflags::bitflags! {
    /// AoE ATA header flags.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct AtaFlags: u8 {
        /// LBA48 extended command.
        const EXTENDED = 1 << 6;
        /// Sets bit 4 of the Device/Head register.
        const DEVICE = 1 << 4;
        /// Asynchronous write.
        const ASYNC = 1 << 1;
        /// Data flows from initiator to target.
        const WRITE = 1 << 0;
    }
}

/// ATA header following an [`AoeHeader`](crate::AoeHeader) with command
/// [`Ata`](crate::AoeCommand::Ata).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct AtaHeader {
    /// AoE ATA flags.
    pub flags: AtaFlags,
    /// Error register in responses, feature register in requests.
    pub error_feature: u8,
    /// Sector count.
    pub sector_count: u8,
    /// Command register in requests, status register in responses.
    pub command_status: u8,
    /// LBA bytes, least significant first.
    pub lba: [u8; 6],
}

impl AtaHeader {
    /// A read or write of `sectors` sectors starting at `sector`.
    ///
    /// With `lba48` all six LBA bytes are used and the extended flag is set. Otherwise only 28 bits
    /// of `sector` are sent, with the LBA mode bits set in the fourth LBA byte.
    pub fn read_write(direction: Direction, sector: u64, sectors: u8, lba48: bool) -> Self {
        let mut flags = AtaFlags::empty();

        let mut lba = [
            sector as u8,
            (sector >> 8) as u8,
            (sector >> 16) as u8,
            (sector >> 24) as u8,
            (sector >> 32) as u8,
            (sector >> 40) as u8,
        ];

        let command_status = if lba48 {
            flags |= AtaFlags::EXTENDED;

            match direction {
                Direction::Read => ATA_READ_EXT,
                Direction::Write => ATA_WRITE_EXT,
            }
        } else {
            lba[3] = (lba[3] & 0x0f) | 0xe0;
            lba[4] = 0;
            lba[5] = 0;

            match direction {
                Direction::Read => ATA_READ,
                Direction::Write => ATA_WRITE,
            }
        };

        if direction == Direction::Write {
            flags |= AtaFlags::WRITE;
        }

        Self {
            flags,
            error_feature: 0,
            sector_count: sectors,
            command_status,
            lba,
        }
    }

    /// ATA IDENTIFY DEVICE.
    pub fn identify() -> Self {
        Self {
            flags: AtaFlags::empty(),
            error_feature: 0,
            sector_count: 1,
            command_status: ATA_IDENTIFY,
            lba: [0, 0, 0, 0xa0, 0, 0],
        }
    }

    /// The logical block address in this header.
    ///
    /// Only the low 28 bits are returned unless [`AtaFlags::EXTENDED`] is set.
    pub fn lba(&self) -> u64 {
        let lba = self
            .lba
            .iter()
            .rev()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));

        if self.flags.contains(AtaFlags::EXTENDED) {
            lba
        } else {
            lba & (LBA28_LIMIT - 1)
        }
    }

    /// Number of data bytes the command transfers.
    pub fn data_len(&self) -> usize {
        usize::from(self.sector_count) * SECTOR_SIZE
    }

    /// Whether a response's status register reports failure.
    pub fn failed(&self) -> bool {
        self.command_status & ATA_STATUS_FAILED != 0
    }
}

impl AoeWireSized for AtaHeader {
    const PACKED_LEN: usize = 12;

    type Buffer = [u8; 12];

    fn buffer() -> Self::Buffer {
        [0u8; 12]
    }
}

impl AoeWireRead for AtaHeader {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        let buf = buf
            .get(0..Self::PACKED_LEN)
            .ok_or(WireError::ReadBufferTooShort)?;

        Ok(Self {
            flags: AtaFlags::from_bits_retain(buf[0]),
            error_feature: buf[1],
            sector_count: buf[2],
            command_status: buf[3],
            lba: <[u8; 6]>::unpack_from_slice(&buf[4..10])?,
        })
    }
}

impl AoeWireWrite for AtaHeader {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let buf = &mut buf[0..Self::PACKED_LEN];

        buf[0] = self.flags.bits();
        buf[1] = self.error_feature;
        buf[2] = self.sector_count;
        buf[3] = self.command_status;
        buf[4..10].copy_from_slice(&self.lba);
        // Reserved
        buf[10..12].fill(0);

        buf
    }

    fn packed_len(&self) -> usize {
        Self::PACKED_LEN
    }
}

impl AoeWireWriteSized for AtaHeader {
    fn pack(&self) -> Self::Buffer {
        let mut buf = Self::buffer();

        self.pack_to_slice_unchecked(&mut buf);

        buf
    }
}

/// Disk geometry reported through [`Ioctl::GetGeometry`](crate::Ioctl::GetGeometry).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Geometry {
    /// Cylinder count. Saturates for disks larger than the field can describe.
    pub cylinders: u16,
    /// Heads per cylinder.
    pub heads: u8,
    /// Sectors per track.
    pub sectors: u8,
    /// Start sector. Always zero for a whole disk.
    pub start: u64,
}

/// Capacity and geometry parsed from an IDENTIFY DEVICE block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveIdentity {
    /// Capacity in sectors.
    pub sectors: u64,
    /// Disk geometry.
    pub geometry: Geometry,
    /// Whether the drive supports 48 bit addressing.
    pub lba48: bool,
}

impl DriveIdentity {
    /// Parse the 256 little-endian words returned by IDENTIFY DEVICE.
    pub fn parse(id: &[u8]) -> Result<Self, WireError> {
        let id = id.get(0..IDENTIFY_LEN).ok_or(WireError::ReadBufferTooShort)?;

        let word = |n: usize| u16::from_le_bytes([id[n * 2], id[n * 2 + 1]]);

        // Command set supported (word 83) or enabled (word 86), bit 10: 48 bit address feature set.
        let lba48 = (word(83) | word(86)) & (1 << 10) != 0;

        if lba48 {
            let sectors = (0..4).rev().fold(0u64, |acc, n| (acc << 16) | u64::from(word(100 + n)));

            Ok(Self {
                sectors,
                geometry: Geometry {
                    cylinders: u16::try_from(sectors / (255 * 63)).unwrap_or(u16::MAX),
                    heads: 255,
                    sectors: 63,
                    start: 0,
                },
                lba48,
            })
        } else {
            let sectors = u64::from(word(60)) | (u64::from(word(61)) << 16);

            Ok(Self {
                sectors,
                geometry: Geometry {
                    cylinders: word(54),
                    heads: word(55) as u8,
                    sectors: word(56) as u8,
                    start: 0,
                },
                lba48,
            })
        }
    }
}
