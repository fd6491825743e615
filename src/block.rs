//! Block device front-end.

use crate::{
    AOE_PARTITIONS, AoeAddress, DeviceInfo, EthernetAddress, Geometry, IoFuture, Request,
    ata::{LBA28_LIMIT, LBA48_LIMIT},
    buf::Buf,
    command::Command,
    device::{Device, DeviceFlags},
    error::Error,
    fmt,
};
use alloc::{
    format,
    string::{String, ToString},
    sync::Arc,
};

/// `HDIO_GETGEO`.
const HDIO_GETGEO: u32 = 0x0301;

/// Block device control commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ioctl {
    /// Get the disk geometry.
    GetGeometry,
    /// Any other command. Always rejected.
    Other(u32),
}

impl Ioctl {
    /// Decode a raw ioctl number.
    pub fn from_raw(cmd: u32) -> Self {
        match cmd {
            HDIO_GETGEO => Self::GetGeometry,
            other => Self::Other(other),
        }
    }
}

/// A handle to the block device of an identified AoE target.
///
/// Handles are cheap to clone. Every clone refers to the same device.
#[derive(Debug, Clone)]
pub struct BlockDevice {
    device: Arc<Device>,
    clock: fn() -> u64,
}

impl BlockDevice {
    pub(crate) fn new(device: Arc<Device>, clock: fn() -> u64) -> Self {
        Self { device, clock }
    }

    /// AoE address of the target.
    pub fn address(&self) -> AoeAddress {
        self.device.address()
    }

    /// Device name, e.g. `etherd/e1.0`.
    pub fn name(&self) -> String {
        format!("etherd/{}", self.address())
    }

    /// First block-device minor number of this device. Each device owns [`AOE_PARTITIONS`]
    /// minors.
    pub fn minor_number(&self) -> u32 {
        self.address().system_minor() * AOE_PARTITIONS
    }

    /// Capacity in sectors. Zero while the device is down.
    pub fn capacity(&self) -> u64 {
        self.device.lock().sectors
    }

    /// Open the device.
    pub fn open(&self) -> Result<(), Error> {
        let mut state = self.device.lock();

        if !state.is_up() {
            return Err(Error::NoDevice);
        }

        state.open_count += 1;

        Ok(())
    }

    /// Close the device.
    ///
    /// If the device went down while open, closing it for the last time asks the target to
    /// report its config again so it can be re-identified.
    pub fn close(&self) {
        self.device.with_state(|state| {
            let Some(count) = state.open_count.checked_sub(1) else {
                fmt::warn!("{}: close without open", state.address);

                return;
            };

            state.open_count = count;

            if count == 0 && state.flags.contains(DeviceFlags::CLOSEWAIT) {
                state.flags.remove(DeviceFlags::CLOSEWAIT);

                fmt::debug!("{}: last close, revalidating", state.address);

                let query =
                    Command::ConfigQuery.frame(state.mac, state.netif.mac(), state.address, 0);

                state.sendq.push(query);
            }
        });
    }

    /// Submit a read or write.
    ///
    /// Fails immediately if the device is not up or the request cannot be queued. Otherwise
    /// frame production starts straight away and the returned future resolves once every frame
    /// of the request has been answered, or the device goes down.
    pub fn submit(&self, request: Request) -> Result<IoFuture, Error> {
        let now = (self.clock)();

        self.device.with_state(|state| {
            if !state.is_up() {
                return Err(Error::NoDevice);
            }

            request.validate()?;

            let Some(last) = request.last_sector() else {
                fmt::warn!(
                    "{}: request at sector {} overflows the address space",
                    state.address,
                    request.sector()
                );

                return Err(Error::Addressing {
                    sector: request.sector(),
                });
            };

            let (limit, bits) = if state.flags.contains(DeviceFlags::EXT) {
                (LBA48_LIMIT, 48)
            } else {
                (LBA28_LIMIT, 28)
            };

            if last >= limit {
                fmt::warn!(
                    "{}: sector {} is beyond {} bit addressing",
                    state.address,
                    last,
                    bits
                );

                return Err(Error::Addressing { sector: last });
            }

            if last >= state.sectors {
                fmt::warn!(
                    "{}: sector {} is beyond the end of the disk ({} sectors)",
                    state.address,
                    last,
                    state.sectors
                );

                return Err(Error::Addressing { sector: last });
            }

            let (buf, fut) = Buf::new(request, now);

            if state.bufs.enqueue(buf).is_err() {
                fmt::warn!("{}: request limit reached", state.address);

                return Err(Error::NoMemory);
            }

            state.work(now);

            Ok(fut)
        })
    }

    /// Run a block device control command.
    pub fn ioctl(&self, cmd: Ioctl) -> Result<Geometry, Error> {
        match cmd {
            Ioctl::GetGeometry => Ok(self.device.lock().geometry),
            Ioctl::Other(cmd) => {
                fmt::info!("{}: unknown ioctl {:#06x}", self.address(), cmd);

                Err(Error::InvalidIoctl(cmd))
            }
        }
    }

    /// `up` or `down`, followed by `,closewait` if the device is waiting for its last close.
    pub fn state(&self) -> String {
        self.device.lock().state_attr()
    }

    /// Target MAC address as 12 hex digits.
    pub fn mac(&self) -> String {
        format!("{:x}", self.mac_address())
    }

    fn mac_address(&self) -> EthernetAddress {
        self.device.lock().mac
    }

    /// Name of the interface the target is reached through.
    pub fn netif(&self) -> String {
        self.device.lock().netif.name().to_string()
    }

    /// Target firmware version, e.g. `0x4019`.
    pub fn firmware_version(&self) -> String {
        format!("0x{:04x}", self.device.lock().fw_ver)
    }

    /// A snapshot of every attribute at once.
    pub fn info(&self) -> DeviceInfo {
        self.device.lock().info()
    }
}
