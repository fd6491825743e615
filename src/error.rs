//! aoecrab error types.

use core::fmt;

pub use aoecrab_wire::WireError;

/// An aoecrab error.
///
/// Only the first four variants ever reach a request's [`IoFuture`](crate::IoFuture). Everything
/// else is returned from setup, front-end bookkeeping or the network adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The request failed: the target reported an ATA error, or the device was downed while the
    /// request was queued or in flight.
    Io,
    /// The device is not up.
    NoDevice,
    /// No bookkeeping space was left for another request on this device.
    NoMemory,
    /// The request reaches past sector `2^28` on a target without 48 bit addressing.
    Addressing {
        /// Last sector touched by the request.
        sector: u64,
    },
    /// The request is empty, or contains a segment that is not a whole number of sectors.
    InvalidRequest,
    /// The block-device control command is not supported.
    InvalidIoctl(u32),
    /// The device is still open and cannot be removed.
    Busy,
    /// No device is registered at the given AoE address.
    UnknownDevice {
        /// Shelf address.
        major: u16,
        /// Slot address.
        minor: u8,
    },
    /// A network interface name is longer than the platform allows.
    InterfaceName,
    /// A frame or header could not be decoded.
    Wire(WireError),
    /// A frame was only partially sent.
    PartialSend {
        /// Frame length.
        len: usize,
        /// Number of bytes actually written to the network.
        sent: usize,
    },
    /// Failed to send a frame over the network interface.
    SendFrame,
    /// Failed to receive a frame from the network interface.
    ReceiveFrame,
    /// The initiator has been shut down.
    ShuttingDown,
    /// An internal error occurred. This indicates a bug in aoecrab.
    Internal,
}

impl Error {
    /// The Linux `errno` value a block layer would complete a request with for this error.
    pub const fn errno(&self) -> i32 {
        match self {
            Error::Io => 5,
            Error::NoDevice | Error::UnknownDevice { .. } => 6,
            Error::NoMemory => 12,
            Error::Busy => 16,
            Error::ShuttingDown => 19,
            Error::Addressing { .. }
            | Error::InvalidRequest
            | Error::InvalidIoctl(_)
            | Error::InterfaceName => 22,
            Error::Wire(_)
            | Error::PartialSend { .. }
            | Error::SendFrame
            | Error::ReceiveFrame
            | Error::Internal => 5,
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io => f.write_str("I/O error"),
            Error::NoDevice => f.write_str("device is not up"),
            Error::NoMemory => f.write_str("no space for another request"),
            Error::Addressing { sector } => write!(
                f,
                "sector {} requires 48 bit addressing which the target does not support",
                sector
            ),
            Error::InvalidRequest => {
                f.write_str("request must be a non-empty whole number of sectors")
            }
            Error::InvalidIoctl(cmd) => write!(f, "unknown ioctl {:#06x}", cmd),
            Error::Busy => f.write_str("device is open"),
            Error::UnknownDevice { major, minor } => write!(f, "no device e{}.{}", major, minor),
            Error::InterfaceName => f.write_str("interface name too long"),
            Error::Wire(e) => write!(f, "wire: {}", e),
            Error::PartialSend { len, sent } => {
                write!(f, "frame of {} bytes only sent {} bytes", len, sent)
            }
            Error::SendFrame => f.write_str("failed to send frame"),
            Error::ReceiveFrame => f.write_str("failed to receive frame"),
            Error::ShuttingDown => f.write_str("initiator is shutting down"),
            Error::Internal => f.write_str("internal error"),
        }
    }
}

impl From<WireError> for Error {
    fn from(value: WireError) -> Self {
        Self::Wire(value)
    }
}
