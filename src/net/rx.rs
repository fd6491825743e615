use crate::{
    AOE_ETHERTYPE, AoeCommand, AoeHeader, Initiator, Interface,
    ethernet::EthernetFrame,
    error::Error,
    fmt,
};
use aoecrab_wire::{AoeWireRead, AoeWireSized};
use alloc::sync::Arc;

/// What happened to a received Ethernet frame.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveAction {
    /// The frame was ignored.
    ///
    /// This can be caused by other, non-AoE traffic on the chosen network interface, requests from
    /// other initiators, error responses, or responses to frames this initiator no longer waits
    /// for.
    Ignored,

    /// The frame was successfully processed as an AoE response.
    Processed,
}

/// AoE frame receive adapter for one network interface.
pub struct AoeRx<'init> {
    initiator: &'init Initiator,
    netif: Arc<Interface>,
}

impl<'init> AoeRx<'init> {
    pub(crate) fn new(initiator: &'init Initiator, netif: Arc<Interface>) -> Self {
        Self { initiator, netif }
    }

    /// The interface this adapter receives on.
    pub fn interface(&self) -> &Interface {
        &self.netif
    }

    /// Given a complete Ethernet II frame, parse an AoE response from it and hand it to the
    /// device it belongs to.
    // NOTE: &mut self so this struct can only be used in one place.
    pub fn receive_frame(&mut self, ethernet_frame: &[u8]) -> Result<ReceiveAction, Error> {
        if self.should_exit() {
            return Ok(ReceiveAction::Ignored);
        }

        let raw_packet = EthernetFrame::new_checked(ethernet_frame)?;

        // Our own broadcasts are looped back on some interfaces.
        if raw_packet.ethertype() != AOE_ETHERTYPE || raw_packet.src_addr() == self.netif.mac() {
            fmt::trace!("Ignore frame");

            return Ok(ReceiveAction::Ignored);
        }

        let payload = raw_packet.payload();

        let header = AoeHeader::unpack_from_slice(payload).inspect_err(|&e| {
            fmt::error!("Failed to parse AoE header: {}", e);
        })?;

        if !header.is_response() {
            fmt::trace!("Ignoring AoE request from {}", raw_packet.src_addr());

            return Ok(ReceiveAction::Ignored);
        }

        // Tags with the high bit set belong to other initiators on this host.
        if header.tag & (1 << 31) != 0 {
            fmt::trace!("Ignoring response with foreign tag {:#010x}", header.tag);

            return Ok(ReceiveAction::Ignored);
        }

        if let Some(code) = header.error_code() {
            fmt::error!(
                "Error packet from e{}.{}: ecode={} '{}'",
                header.major,
                header.minor,
                header.error,
                code.description()
            );

            return Ok(ReceiveAction::Ignored);
        }

        let body = &payload[AoeHeader::PACKED_LEN..];

        match header.command {
            AoeCommand::Ata => {
                self.initiator
                    .handle_ata_response(raw_packet.src_addr(), header, body)
            }
            AoeCommand::Config => self.initiator.handle_config_response(
                &self.netif,
                raw_packet.src_addr(),
                header,
                body,
            ),
            AoeCommand::Unknown(command) => {
                fmt::info!(
                    "Unknown AoE command {:#04x} from e{}.{}",
                    command,
                    header.major,
                    header.minor
                );

                Ok(ReceiveAction::Ignored)
            }
        }
    }

    /// Returns `true` if the RX task should exit.
    pub fn should_exit(&self) -> bool {
        self.initiator.should_exit()
    }
}
