//! An AoE target as seen by the initiator.

mod engine;

pub(crate) use engine::{AtaOutcome, ConfigOutcome};

use crate::{
    AoeHeader, EthernetAddress, Geometry, InitiatorConfig, Interface, NPERSHELF, Timeouts,
    buf::BufQueue,
    fmt,
    frame_pool::FramePool,
    timeouts::micros,
};
use alloc::{string::String, sync::Arc, vec::Vec};
use core::fmt as core_fmt;

/// Default bytes of sector data per frame when the MTU or target can't tell us better.
pub(crate) const DEFAULT_DATA_LEN: usize = 1024;

/// Shelf/slot address of an AoE target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AoeAddress {
    /// Shelf.
    pub major: u16,
    /// Slot.
    pub minor: u8,
}

impl AoeAddress {
    /// Every shelf and slot. Used as the destination of discovery queries.
    pub const BROADCAST: Self = Self {
        major: 0xffff,
        minor: 0xff,
    };

    /// Create a new address.
    pub const fn new(major: u16, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Unique per-device index, `major * NPERSHELF + minor`.
    pub fn system_minor(&self) -> u32 {
        u32::from(self.major) * NPERSHELF + u32::from(self.minor)
    }
}

impl core_fmt::Display for AoeAddress {
    fn fmt(&self, f: &mut core_fmt::Formatter<'_>) -> core_fmt::Result {
        write!(f, "e{}.{}", self.major, self.minor)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub(crate) struct DeviceFlags: u8 {
        /// Identified and accepting I/O.
        const UP = 1 << 0;
        /// Being torn down.
        const TKILL = 1 << 1;
        /// Target supports LBA48.
        const EXT = 1 << 2;
        /// Went down while open. Re-identified once the last opener closes.
        const CLOSEWAIT = 1 << 3;
        /// Waiting for the block device to be created.
        const DISK_PENDING = 1 << 4;
        /// Block device exists.
        const DISK = 1 << 5;
    }
}

/// A validated ATA response waiting for its device's lock.
#[derive(Debug)]
pub(crate) struct Response {
    pub(crate) header: AoeHeader,
    pub(crate) payload: Vec<u8>,
}

/// Frames built under a device lock, sent once the lock is released.
#[must_use]
pub(crate) struct Egress {
    netif: Arc<Interface>,
    frames: Vec<Vec<u8>>,
}

impl Egress {
    pub(crate) fn transmit(self) {
        if !self.frames.is_empty() {
            self.netif.enqueue(self.frames);
        }
    }
}

/// Mutable device state, only touched with the device lock held.
#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) address: AoeAddress,
    pub(crate) flags: DeviceFlags,
    /// Target MAC address, refreshed by every config response.
    pub(crate) mac: EthernetAddress,
    /// Interface the target was last heard on.
    pub(crate) netif: Arc<Interface>,
    pub(crate) fw_ver: u16,
    /// Maximum sector data bytes per frame.
    pub(crate) max_data_len: usize,
    /// Capacity in sectors. Zero while down.
    pub(crate) sectors: u64,
    pub(crate) geometry: Geometry,
    pub(crate) frames: FramePool,
    pub(crate) bufs: BufQueue,
    /// Frames waiting to be handed to the interface after the lock is dropped.
    pub(crate) sendq: Vec<Vec<u8>>,
    /// Smoothed round trip time in microseconds.
    pub(crate) rtt_avg: u64,
    pub(crate) timeouts: Timeouts,
    pub(crate) open_count: usize,
}

impl DeviceState {
    pub(crate) fn take_egress(&mut self) -> Egress {
        Egress {
            netif: Arc::clone(&self.netif),
            frames: core::mem::take(&mut self.sendq),
        }
    }

    pub(crate) fn is_up(&self) -> bool {
        self.flags.contains(DeviceFlags::UP)
    }

    /// `up` or `down`, with `,closewait` appended while waiting for the last close.
    pub(crate) fn state_attr(&self) -> String {
        let mut state = String::from(if self.is_up() { "up" } else { "down" });

        if self.flags.contains(DeviceFlags::CLOSEWAIT) {
            state.push_str(",closewait");
        }

        state
    }

    pub(crate) fn info(&self) -> DeviceInfo {
        DeviceInfo {
            address: self.address,
            mac: self.mac,
            netif: String::from(self.netif.name()),
            state: self.state_attr(),
            firmware_version: self.fw_ver,
            sectors: self.sectors,
            geometry: self.geometry,
            lba48: self.flags.contains(DeviceFlags::EXT),
            max_data_len: self.max_data_len,
            frames: self.frames.capacity(),
            frames_outstanding: self.frames.outstanding(),
            requests: self.bufs.len(),
            open_count: self.open_count,
            rtt_avg_us: self.rtt_avg,
        }
    }
}

/// An AoE target known to the initiator.
pub(crate) struct Device {
    address: AoeAddress,
    state: spin::Mutex<DeviceState>,
    /// ATA responses from the receive path, drained under the lock.
    inbox: heapless::mpmc::Q32<Response>,
}

impl Device {
    pub(crate) fn new(
        address: AoeAddress,
        mac: EthernetAddress,
        netif: Arc<Interface>,
        nframes: u16,
        config: &InitiatorConfig,
        timeouts: Timeouts,
    ) -> Self {
        fmt::debug!("{}: new device with {} frames", address, nframes);

        Self {
            address,
            state: spin::Mutex::new(DeviceState {
                address,
                flags: DeviceFlags::empty(),
                mac,
                netif,
                fw_ver: 0,
                max_data_len: DEFAULT_DATA_LEN,
                sectors: 0,
                geometry: Geometry::default(),
                frames: FramePool::new(nframes),
                bufs: BufQueue::new(config.max_requests),
                sendq: Vec::new(),
                rtt_avg: micros(timeouts.rtt_max),
                timeouts,
                open_count: 0,
            }),
            inbox: heapless::mpmc::Q32::new(),
        }
    }

    pub(crate) fn address(&self) -> AoeAddress {
        self.address
    }

    pub(crate) fn lock(&self) -> spin::MutexGuard<'_, DeviceState> {
        self.state.lock()
    }

    /// Run `f` with the device locked, then send whatever frames it queued.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let (result, egress) = {
            let mut state = self.lock();

            let result = f(&mut state);

            (result, state.take_egress())
        };

        egress.transmit();

        result
    }

    /// Post an ATA response and process everything in the inbox.
    ///
    /// Returns `true` if a processed response means the device needs a block device.
    pub(crate) fn deliver(&self, response: Response, now: u64) -> bool {
        let mut needs_disk = false;

        if let Err(response) = self.inbox.enqueue(response) {
            // Full: make room and retry once. The frame is retransmitted if this fails too.
            needs_disk |= self.process_inbox(now);

            if self.inbox.enqueue(response).is_err() {
                fmt::warn!("{}: inbox full, dropping response", self.address);
            }
        }

        needs_disk | self.process_inbox(now)
    }

    fn process_inbox(&self, now: u64) -> bool {
        self.with_state(|state| {
            let mut needs_disk = false;

            while let Some(response) = self.inbox.dequeue() {
                needs_disk |= state.on_ata_response(&response.header, &response.payload, now)
                    == AtaOutcome::NeedsDisk;
            }

            needs_disk
        })
    }
}

impl core_fmt::Debug for Device {
    fn fmt(&self, f: &mut core_fmt::Formatter<'_>) -> core_fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// A snapshot of a device's state and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInfo {
    /// AoE address.
    pub address: AoeAddress,
    /// Target MAC address.
    pub mac: EthernetAddress,
    /// Name of the interface the target was last heard on.
    pub netif: String,
    /// `up` or `down`, optionally followed by `,closewait`.
    pub state: String,
    /// Target firmware version.
    pub firmware_version: u16,
    /// Capacity in sectors.
    pub sectors: u64,
    /// Disk geometry.
    pub geometry: Geometry,
    /// Whether 48 bit addressing is used.
    pub lba48: bool,
    /// Maximum sector data bytes per frame.
    pub max_data_len: usize,
    /// Frame pool size.
    pub frames: usize,
    /// Frames currently awaiting a response.
    pub frames_outstanding: usize,
    /// Requests queued or in flight.
    pub requests: usize,
    /// Number of openers.
    pub open_count: usize,
    /// Smoothed round trip time in microseconds.
    pub rtt_avg_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display() {
        let address = AoeAddress::new(7, 3);

        assert_eq!(format!("{}", address), "e7.3");
        assert_eq!(address.system_minor(), 7 * 16 + 3);
    }
}
