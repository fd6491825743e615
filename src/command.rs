//! AoE commands issued by the initiator and the Ethernet frames that carry them.

use crate::{
    AOE_ETHERTYPE, AoeAddress, AoeCommand, AoeHeader, AtaHeader, ConfigHeader, EthernetAddress,
    ethernet::{EthernetFrame, HEADER_LEN, MIN_FRAME_LEN},
};
use aoecrab_wire::{AoeWireSized, AoeWireWrite};
use alloc::{vec, vec::Vec};

/// Bytes of AoE and ATA header in front of the data of every ATA command, excluding the Ethernet
/// header. The MTU left over after these is what can carry sector data.
pub(crate) const ATA_OVERHEAD: usize = AoeHeader::PACKED_LEN + AtaHeader::PACKED_LEN;

/// A command the initiator sends to a target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Command<'data> {
    /// An ATA command, followed by write data if any.
    Ata {
        /// ATA header.
        header: AtaHeader,
        /// Data to write. Empty for reads and IDENTIFY.
        data: &'data [u8],
    },
    /// Query Config Information with an empty config string.
    ConfigQuery,
}

impl Command<'_> {
    fn aoe_command(&self) -> AoeCommand {
        match self {
            Command::Ata { .. } => AoeCommand::Ata,
            Command::ConfigQuery => AoeCommand::Config,
        }
    }

    fn payload_len(&self) -> usize {
        AoeHeader::PACKED_LEN
            + match self {
                Command::Ata { data, .. } => AtaHeader::PACKED_LEN + data.len(),
                Command::ConfigQuery => ConfigHeader::PACKED_LEN,
            }
    }

    /// Build a complete Ethernet frame for this command, padded to the Ethernet minimum.
    pub(crate) fn frame(
        &self,
        dst: EthernetAddress,
        src: EthernetAddress,
        address: AoeAddress,
        tag: u32,
    ) -> Vec<u8> {
        let len = (HEADER_LEN + self.payload_len()).max(MIN_FRAME_LEN);

        let mut buf = vec![0u8; len];

        let mut frame = EthernetFrame::new_unchecked(buf.as_mut_slice());

        frame.set_dst_addr(dst);
        frame.set_src_addr(src);
        frame.set_ethertype(AOE_ETHERTYPE);

        let header = AoeHeader::request(address.major, address.minor, self.aoe_command(), tag);

        let rest = write_packed(header, frame.payload_mut());

        match self {
            Command::Ata { header, data } => {
                let rest = write_packed(*header, rest);

                write_packed(*data, rest);
            }
            Command::ConfigQuery => {
                write_packed(ConfigHeader::query(), rest);
            }
        }

        buf
    }
}

/// Write a packed value into the start of `buf`, returning the remainder.
fn write_packed(value: impl AoeWireWrite, buf: &mut [u8]) -> &mut [u8] {
    let len = value.packed_len();

    value.pack_to_slice_unchecked(buf);

    &mut buf[len..]
}
