//! Command issue, response handling and retransmission for a single device.
//!
//! Everything here runs with the device lock held. Frames are never handed to an interface
//! directly: they are pushed onto the device's send queue and flushed by the caller once the lock
//! is released.

use super::{DEFAULT_DATA_LEN, DeviceFlags, DeviceState};
use crate::{
    AoeHeader, AtaHeader, ConfigHeader, Direction, DriveIdentity, EthernetAddress, Interface,
    SECTOR_SIZE,
    ata::{ATA_IDENTIFY, ATA_READ, ATA_READ_EXT, ATA_WRITE, ATA_WRITE_EXT, IDENTIFY_LEN},
    command::{ATA_OVERHEAD, Command},
    fmt,
    timeouts::micros,
};
use aoecrab_wire::{AoeWireRead, AoeWireSized};
use alloc::{sync::Arc, vec::Vec};

/// What handling an ATA response did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum AtaOutcome {
    /// No outstanding frame has this tag.
    Unsolicited,
    /// Response too short. The frame stays outstanding.
    Runt,
    /// A frame was answered.
    Done,
    /// IDENTIFY answered and the device has no block device yet.
    NeedsDisk,
}

/// What handling a config response did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ConfigOutcome {
    /// Address refreshed. The device is open or being torn down so it was left alone.
    Refreshed,
    /// IDENTIFY sent.
    Identifying,
    /// Frames are still outstanding, or none could be allocated for IDENTIFY.
    Busy,
}

impl DeviceState {
    /// Slice queued bufs into frames while both bufs and free frames remain.
    pub(crate) fn work(&mut self, now: u64) {
        if !self.is_up() {
            return;
        }

        while self.frames.has_free() {
            let Some(key) = self.bufs.next_work() else {
                return;
            };

            let Some(slot) = self.frames.alloc() else {
                return;
            };

            self.build_command(key, slot, now);
        }
    }

    /// Fill frame `slot` with the next chunk of buf `key` and queue it for sending.
    fn build_command(&mut self, key: usize, slot: u16, now: u64) {
        let lba48 = self.flags.contains(DeviceFlags::EXT);

        let Some(buf) = self.bufs.get_mut(key) else {
            fmt::error!("{}: in-process buf {} vanished", self.address, key);

            self.bufs.finish_in_process();
            self.frames.release(slot);

            return;
        };

        let bcnt = buf.resid.min(self.max_data_len).min(buf.seg_resid);

        fmt::debug_assert!(bcnt > 0 && bcnt % SECTOR_SIZE == 0);

        let ata = AtaHeader::read_write(
            buf.request.direction,
            buf.sector,
            (bcnt / SECTOR_SIZE) as u8,
            lba48,
        );

        let (segment, offset) = (buf.segment, buf.seg_offset);

        let write_data = match buf.request.direction {
            Direction::Write => buf.request.segments[segment][offset..offset + bcnt].to_vec(),
            Direction::Read => Vec::new(),
        };

        buf.frames_out += 1;
        buf.advance(bcnt);

        let sliced = buf.resid == 0;

        if sliced {
            self.bufs.finish_in_process();
        }

        let frame = self.frames.frame_mut(slot);

        frame.buf = Some(key);
        frame.segment = segment;
        frame.offset = offset;
        frame.len = bcnt;
        frame.ata = ata;
        frame.write_data = write_data;

        fmt::trace!(
            "{}: tag {:#010x} {} bytes at sector {}",
            self.address,
            frame.tag,
            bcnt,
            ata.lba()
        );

        self.transmit(slot, now);
    }

    /// Queue frame `slot` for (re)transmission, stamping its send time.
    fn transmit(&mut self, slot: u16, now: u64) {
        let frame = self.frames.frame_mut(slot);

        frame.sent_at = now;

        let bytes = Command::Ata {
            header: frame.ata,
            data: &frame.write_data,
        }
        .frame(self.mac, self.netif.mac(), self.address, frame.tag);

        self.sendq.push(bytes);
    }

    /// Handle an ATA response addressed to this device.
    pub(crate) fn on_ata_response(
        &mut self,
        header: &AoeHeader,
        payload: &[u8],
        now: u64,
    ) -> AtaOutcome {
        let Some(slot) = self.frames.find(header.tag) else {
            fmt::warn!(
                "{}: unsolicited response with tag {:#010x}",
                self.address,
                header.tag
            );

            return AtaOutcome::Unsolicited;
        };

        let Ok(ata) = AtaHeader::unpack_from_slice(payload) else {
            fmt::warn!("{}: runt ATA response", self.address);

            return AtaOutcome::Runt;
        };

        let data = &payload[AtaHeader::PACKED_LEN..];

        let (sent_at, key, segment, offset, len, command) = {
            let frame = self.frames.frame(slot);

            (
                frame.sent_at,
                frame.buf,
                frame.segment,
                frame.offset,
                frame.len,
                frame.ata.command_status,
            )
        };

        self.update_rtt(now.saturating_sub(sent_at));

        let mut outcome = AtaOutcome::Done;

        if ata.failed() {
            fmt::error!(
                "{}: ATA error: cmd {:#04x} stat {:#04x}",
                self.address,
                command,
                ata.command_status
            );

            if let Some(buf) = key.and_then(|key| self.bufs.get_mut(key)) {
                buf.failed = true;
            }
        } else {
            match command {
                ATA_READ | ATA_READ_EXT => {
                    if data.len() < len {
                        fmt::warn!(
                            "{}: runt data size in read: {} < {}",
                            self.address,
                            data.len(),
                            len
                        );

                        return AtaOutcome::Runt;
                    }

                    if let Some(buf) = key.and_then(|key| self.bufs.get_mut(key)) {
                        buf.request.segments[segment][offset..offset + len]
                            .copy_from_slice(&data[..len]);

                        buf.acked += len;
                    }
                }
                ATA_WRITE | ATA_WRITE_EXT => {
                    if let Some(buf) = key.and_then(|key| self.bufs.get_mut(key)) {
                        buf.acked += len;
                    }
                }
                ATA_IDENTIFY => {
                    if data.len() < IDENTIFY_LEN {
                        fmt::warn!(
                            "{}: runt data size in identify: {}",
                            self.address,
                            data.len()
                        );

                        return AtaOutcome::Runt;
                    }

                    outcome = self.on_identify(&data[..IDENTIFY_LEN]);
                }
                other => {
                    fmt::warn!("{}: unrecognized ATA command {:#04x}", self.address, other);
                }
            }
        }

        if let Some(key) = key {
            let done = self.bufs.get_mut(key).is_some_and(|buf| {
                buf.frames_out -= 1;

                buf.is_done()
            });

            if done {
                if let Some(buf) = self.bufs.remove(key) {
                    fmt::trace!(
                        "{}: request at sector {} complete after {} us",
                        self.address,
                        buf.request.sector,
                        now.saturating_sub(buf.submitted_at)
                    );

                    buf.complete();
                }
            }
        }

        self.frames.release(slot);

        self.work(now);

        outcome
    }

    /// Fold a round trip sample into the smoothed estimate.
    fn update_rtt(&mut self, sample: u64) {
        let min = micros(self.timeouts.rtt_min);
        let max = micros(self.timeouts.rtt_max);

        let sample = sample.clamp(min, max) as i64;
        let avg = self.rtt_avg as i64;

        // Gain of 1/4.
        self.rtt_avg = (avg + (sample - avg) / 4).clamp(min as i64, max as i64) as u64;
    }

    /// Send ATA IDENTIFY DEVICE.
    pub(crate) fn identify(&mut self, now: u64) -> bool {
        let Some(slot) = self.frames.alloc() else {
            fmt::error!("{}: can't get a frame for identify", self.address);

            return false;
        };

        self.rtt_avg = micros(self.timeouts.rtt_max);

        let frame = self.frames.frame_mut(slot);

        frame.ata = AtaHeader::identify();
        frame.len = IDENTIFY_LEN;

        fmt::debug!("{}: identify", self.address);

        self.transmit(slot, now);

        true
    }

    fn on_identify(&mut self, id: &[u8]) -> AtaOutcome {
        let identity = match DriveIdentity::parse(id) {
            Ok(identity) => identity,
            Err(e) => {
                fmt::error!("{}: bad identify data: {}", self.address, e);

                return AtaOutcome::Done;
            }
        };

        self.flags.set(DeviceFlags::EXT, identity.lba48);

        if self.sectors != identity.sectors {
            fmt::info!(
                "{} {} v{:04x} has {} sectors",
                self.mac,
                self.address,
                self.fw_ver,
                identity.sectors
            );
        }

        self.sectors = identity.sectors;
        self.geometry = identity.geometry;

        if self.flags.contains(DeviceFlags::TKILL) {
            return AtaOutcome::Done;
        }

        if self.flags.contains(DeviceFlags::DISK) {
            if !self.is_up() {
                fmt::info!("{}: up", self.address);

                self.flags.insert(DeviceFlags::UP);
            }

            AtaOutcome::Done
        } else if !self.flags.contains(DeviceFlags::DISK_PENDING) {
            self.flags.insert(DeviceFlags::DISK_PENDING);

            AtaOutcome::NeedsDisk
        } else {
            AtaOutcome::Done
        }
    }

    /// Refresh the device from a config response and identify it if it is idle.
    pub(crate) fn on_config(
        &mut self,
        netif: &Arc<Interface>,
        mac: EthernetAddress,
        config: &ConfigHeader,
        now: u64,
    ) -> ConfigOutcome {
        self.netif = Arc::clone(netif);
        self.mac = mac;

        let sectors = (netif.mtu().saturating_sub(ATA_OVERHEAD) / SECTOR_SIZE)
            .min(usize::from(config.sector_count));

        let max_data_len = if sectors > 0 {
            sectors * SECTOR_SIZE
        } else {
            DEFAULT_DATA_LEN
        };

        if max_data_len != self.max_data_len {
            fmt::info!(
                "{}: setting {} byte data frames on {}",
                self.address,
                max_data_len,
                netif.name()
            );

            self.max_data_len = max_data_len;
        }

        if (self.is_up() && self.open_count > 0)
            || self
                .flags
                .intersects(DeviceFlags::CLOSEWAIT | DeviceFlags::TKILL)
        {
            return ConfigOutcome::Refreshed;
        }

        self.fw_ver = config.firmware_version;

        if self.frames.outstanding() > 0 {
            return ConfigOutcome::Busy;
        }

        if self.identify(now) {
            ConfigOutcome::Identifying
        } else {
            ConfigOutcome::Busy
        }
    }

    /// Retransmit every frame whose deadline has passed, downing the device if any frame has
    /// waited too long in total. Returns `true` if the device was downed.
    pub(crate) fn rexmit_scan(&mut self, now: u64) -> bool {
        if self.flags.contains(DeviceFlags::TKILL) {
            return false;
        }

        let timeout = 2 * self.rtt_avg;
        let dead = micros(self.timeouts.dead);

        let mut resent = 0usize;

        for slot in self.frames.busy_slots() {
            let frame = self.frames.frame_mut(slot);

            if now.saturating_sub(frame.sent_at) < timeout {
                continue;
            }

            frame.waited += timeout;

            if frame.waited > dead {
                fmt::error!(
                    "{}: waited {} sec for tag {:#010x}, downing",
                    self.address,
                    frame.waited / 1_000_000,
                    frame.tag
                );

                self.downdev();

                return true;
            }

            let old = frame.tag;
            let new = self.frames.retag(slot);

            fmt::debug!(
                "{}: retransmit tag {:#010x} -> {:#010x}",
                self.address,
                old,
                new
            );

            self.transmit(slot, now);

            resent += 1;
        }

        if resent > 0 {
            self.rtt_avg = (self.rtt_avg * 2).min(micros(self.timeouts.rtt_max));
        }

        self.work(now);

        false
    }

    /// Mark the device down and fail every request it holds.
    pub(crate) fn downdev(&mut self) {
        if self.is_up() {
            fmt::info!("{}: down", self.address);
        }

        self.flags.remove(DeviceFlags::UP);

        if self.open_count > 0 {
            self.flags.insert(DeviceFlags::CLOSEWAIT);
        }

        self.sectors = 0;

        self.frames.release_all();
        self.sendq.clear();

        for buf in self.bufs.drain() {
            buf.fail();
        }
    }

    /// Down the device for good ahead of its removal.
    pub(crate) fn teardown(&mut self) {
        self.flags.insert(DeviceFlags::TKILL);

        self.downdev();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AoeAddress, AoeCommand, AtaFlags, InitiatorConfig, Request, Timeouts,
        buf::Buf,
        device::Device,
        error::Error,
        ethernet::EthernetFrame,
    };
    use alloc::vec;
    use aoecrab_wire::AoeWireWriteSized;
    use futures_lite::future;

    const TARGET: EthernetAddress = EthernetAddress([0x00, 0x10, 0x04, 0x00, 0x00, 0x01]);
    const HOST: EthernetAddress = EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

    /// A device that has been identified and is up, with `nframes` frames and `max_data_len`
    /// bytes per frame.
    fn up_device(nframes: u16, max_data_len: usize, lba48: bool) -> (Device, Arc<Interface>) {
        let netif = Arc::new(Interface::new("test0", HOST, 1500).unwrap());

        let device = Device::new(
            AoeAddress::new(1, 2),
            TARGET,
            Arc::clone(&netif),
            nframes,
            &InitiatorConfig::default(),
            Timeouts::default(),
        );

        {
            let mut state = device.lock();

            state.max_data_len = max_data_len;
            state.sectors = 1 << 40;
            state.flags = DeviceFlags::UP | DeviceFlags::DISK;
            state.flags.set(DeviceFlags::EXT, lba48);
        }

        (device, netif)
    }

    fn submit(device: &Device, request: Request, now: u64) -> crate::IoFuture {
        device.with_state(|state| {
            let (buf, fut) = Buf::new(request, now);

            state.bufs.enqueue(buf).unwrap();
            state.work(now);

            fut
        })
    }

    /// Parse an outgoing frame into its AoE header, ATA header and data.
    fn parse(frame: &[u8]) -> (AoeHeader, AtaHeader, Vec<u8>) {
        let eth = EthernetFrame::new_checked(frame).unwrap();

        let payload = eth.payload();

        let aoe = AoeHeader::unpack_from_slice(payload).unwrap();
        let ata = AtaHeader::unpack_from_slice(&payload[AoeHeader::PACKED_LEN..]).unwrap();

        (aoe, ata, payload[ATA_OVERHEAD..].to_vec())
    }

    /// Build the payload of a successful response to `frame`.
    fn respond(frame: &[u8], read_data: Option<&[u8]>) -> (AoeHeader, Vec<u8>) {
        let (aoe, mut ata, _) = parse(frame);

        ata.command_status = 0x40;

        let mut payload = ata.pack().to_vec();

        if let Some(data) = read_data {
            payload.extend_from_slice(data);
        }

        (aoe.into_response(), payload)
    }

    fn answer(device: &Device, response: (AoeHeader, Vec<u8>), now: u64) -> AtaOutcome {
        let (header, payload) = response;

        device.with_state(|state| state.on_ata_response(&header, &payload, now))
    }

    fn drain(netif: &Interface) -> Vec<Vec<u8>> {
        core::iter::from_fn(|| netif.dequeue()).collect()
    }

    #[test]
    fn single_frame_at_boundary() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        let fut = submit(&device, Request::write(0, vec![vec![0x5a; 1024]]), 0);

        let sent = drain(&netif);

        assert_eq!(sent.len(), 1);

        let (aoe, ata, data) = parse(&sent[0]);

        assert_eq!(aoe.command, AoeCommand::Ata);
        assert_eq!(ata.sector_count, 2);
        assert_eq!(ata.command_status, ATA_WRITE);
        assert_eq!(data, vec![0x5a; 1024]);

        assert_eq!(
            answer(&device, respond(&sent[0], None), 10),
            AtaOutcome::Done
        );

        assert!(future::block_on(fut).is_ok());
        assert_eq!(device.lock().frames.outstanding(), 0);
    }

    #[test]
    fn one_more_chunk_than_frames() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        // 5 chunks of 1024 bytes
        let fut = submit(&device, Request::read_len(100, 5 * 1024), 0);

        let sent = drain(&netif);

        assert_eq!(sent.len(), 4);
        assert_eq!(device.lock().frames.outstanding(), 4);

        let lbas = sent.iter().map(|f| parse(f).1.lba()).collect::<Vec<_>>();

        assert_eq!(lbas, vec![100, 102, 104, 106]);

        // Answering the first frame frees a slot for the fifth chunk.
        let (header, payload) = respond(&sent[0], Some(&[1u8; 1024]));

        answer(&device, (header, payload), 10);

        let fifth = drain(&netif);

        assert_eq!(fifth.len(), 1);
        assert_eq!(parse(&fifth[0]).1.lba(), 108);

        for (n, frame) in sent[1..].iter().chain(fifth.iter()).enumerate() {
            let (header, payload) = respond(frame, Some(&[n as u8 + 2; 1024]));

            answer(&device, (header, payload), 20);
        }

        let data = future::block_on(fut).unwrap().into_bytes();

        assert_eq!(data.len(), 5 * 1024);
        assert!(data[..1024].iter().all(|b| *b == 1));
        assert!(data[4096..].iter().all(|b| *b == 5));
    }

    #[test]
    fn chunks_respect_segments() {
        crate::test_logger();

        let (device, netif) = up_device(16, 8192, false);

        let _fut = submit(
            &device,
            Request::write(0, vec![vec![1; 1536], vec![2; 512], vec![3; 1024]]),
            0,
        );

        let lens = drain(&netif)
            .iter()
            .map(|f| parse(f).1.data_len())
            .collect::<Vec<_>>();

        assert_eq!(lens, vec![1536, 512, 1024]);
    }

    #[test]
    fn lba48_uses_extended_commands() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, true);

        let _fut = submit(&device, Request::read_len(1 << 30, 512), 0);

        let (_, ata, _) = parse(&drain(&netif)[0]);

        assert_eq!(ata.command_status, ATA_READ_EXT);
        assert!(ata.flags.contains(AtaFlags::EXTENDED));
        assert_eq!(ata.lba(), 1 << 30);
    }

    #[test]
    fn runt_read_leaves_frame_outstanding() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        let fut = submit(&device, Request::read_len(0, 1024), 0);

        let sent = drain(&netif);
        let (header, payload) = respond(&sent[0], Some(&[0u8; 100]));

        assert_eq!(
            answer(&device, (header, payload), 10),
            AtaOutcome::Runt
        );
        assert_eq!(device.lock().frames.outstanding(), 1);
        assert!(!fut.is_complete());
    }

    #[test]
    fn ata_error_fails_request() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        let fut = submit(&device, Request::write(0, vec![vec![0; 2048]]), 0);

        let sent = drain(&netif);

        assert_eq!(sent.len(), 2);

        let (header, mut payload) = respond(&sent[0], None);
        // ERR
        payload[3] = 0x51;

        answer(&device, (header, payload), 10);

        // Not done until the other frame is answered.
        assert!(!fut.is_complete());

        answer(&device, respond(&sent[1], None), 10);

        assert_eq!(future::block_on(fut), Err(Error::Io));
    }

    #[test]
    fn unsolicited_tag() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        let fut = submit(&device, Request::read_len(0, 512), 0);

        let sent = drain(&netif);
        let (mut header, payload) = respond(&sent[0], Some(&[0u8; 512]));

        header.tag ^= 0x0100_0000;

        assert_eq!(
            answer(&device, (header, payload), 10),
            AtaOutcome::Unsolicited
        );
        assert_eq!(device.lock().frames.outstanding(), 1);
        assert!(!fut.is_complete());
    }

    #[test]
    fn downdev_fails_everything_once() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        let in_flight = submit(&device, Request::read_len(0, 3 * 1024), 0);
        let queued = submit(&device, Request::read_len(64, 1024), 0);

        assert_eq!(drain(&netif).len(), 4);

        device.with_state(|state| {
            state.open_count = 1;
            state.downdev();
        });

        let state = device.lock();

        assert!(!state.is_up());
        assert!(state.flags.contains(DeviceFlags::CLOSEWAIT));
        assert_eq!(state.frames.outstanding(), 0);
        assert_eq!(state.sectors, 0);
        assert_eq!(state.bufs.len(), 0);

        drop(state);

        assert_eq!(future::block_on(in_flight), Err(Error::Io));
        assert_eq!(future::block_on(queued), Err(Error::Io));
        assert!(drain(&netif).is_empty());
    }

    #[test]
    fn retransmit_with_new_tag() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        let fut = submit(&device, Request::read_len(0, 512), 0);

        let first = drain(&netif);
        let old_tag = parse(&first[0]).0.tag;

        let rtt = device.lock().rtt_avg;

        // Not yet due
        device.with_state(|state| assert!(!state.rexmit_scan(2 * rtt - 1)));
        assert!(drain(&netif).is_empty());

        device.with_state(|state| assert!(!state.rexmit_scan(2 * rtt)));

        let resent = drain(&netif);

        assert_eq!(resent.len(), 1);

        let new_tag = parse(&resent[0]).0.tag;

        assert_ne!(old_tag, new_tag);

        // A late answer to the first transmission is ignored.
        let (header, payload) = respond(&first[0], Some(&[7u8; 512]));

        assert_eq!(
            answer(&device, (header, payload), 2 * rtt + 1),
            AtaOutcome::Unsolicited
        );

        let (header, payload) = respond(&resent[0], Some(&[7u8; 512]));

        answer(&device, (header, payload), 2 * rtt + 2);

        assert_eq!(future::block_on(fut).unwrap().into_bytes(), vec![7u8; 512]);
    }

    #[test]
    fn dead_device_is_downed() {
        crate::test_logger();

        let (device, netif) = up_device(4, 1024, false);

        let fut = submit(&device, Request::read_len(0, 512), 0);

        let mut now = 0;
        let mut downed = false;

        for _ in 0..1000 {
            now += 100_000;

            if device.with_state(|state| state.rexmit_scan(now)) {
                downed = true;

                break;
            }
        }

        assert!(downed);

        // Every retransmission waits at least 2 * rtt_min, so the dead bound is crossed after at
        // most 50 of them.
        assert!(drain(&netif).len() <= 51);
        assert!(now > micros(Timeouts::default().dead));
        assert_eq!(future::block_on(fut), Err(Error::Io));
        assert!(!device.lock().is_up());
    }

    #[test]
    fn rtt_estimate_stays_in_bounds() {
        crate::test_logger();

        let (device, _netif) = up_device(4, 1024, false);

        let mut state = device.lock();

        let min = micros(state.timeouts.rtt_min);
        let max = micros(state.timeouts.rtt_max);

        for _ in 0..50 {
            state.update_rtt(1);
        }

        assert_eq!(state.rtt_avg, min);

        for _ in 0..50 {
            state.update_rtt(u64::MAX / 4);
        }

        assert_eq!(state.rtt_avg, max);

        state.rtt_avg = min;
        state.update_rtt(min + 400);

        assert_eq!(state.rtt_avg, min + 100);
    }

    #[test]
    fn config_sets_frame_size_and_identifies() {
        crate::test_logger();

        let netif = Arc::new(Interface::new("test0", HOST, 9000).unwrap());

        let device = Device::new(
            AoeAddress::new(0, 1),
            TARGET,
            Arc::clone(&netif),
            2,
            &InitiatorConfig::default(),
            Timeouts::default(),
        );

        let config = ConfigHeader {
            buffer_count: 2,
            firmware_version: 0x4019,
            sector_count: 16,
            ..ConfigHeader::query()
        };

        let outcome = device.with_state(|state| state.on_config(&netif, TARGET, &config, 0));

        assert_eq!(outcome, ConfigOutcome::Identifying);
        assert_eq!(device.lock().max_data_len, 16 * 512);
        assert_eq!(device.lock().fw_ver, 0x4019);

        let sent = drain(&netif);

        assert_eq!(sent.len(), 1);
        assert_eq!(parse(&sent[0]).1, AtaHeader::identify());

        // Identify still outstanding
        let outcome = device.with_state(|state| state.on_config(&netif, TARGET, &config, 1));

        assert_eq!(outcome, ConfigOutcome::Busy);
        assert!(drain(&netif).is_empty());
    }

    #[test]
    fn small_mtu_or_old_target_uses_default() {
        crate::test_logger();

        let netif = Arc::new(Interface::new("test0", HOST, 1500).unwrap());

        let (device, _) = up_device(2, 1024, false);

        let config = ConfigHeader {
            sector_count: 0,
            ..ConfigHeader::query()
        };

        device.with_state(|state| {
            state.max_data_len = 0;
            state.on_config(&netif, TARGET, &config, 0);

            assert_eq!(state.max_data_len, DEFAULT_DATA_LEN);
        });

        let config = ConfigHeader {
            sector_count: 255,
            ..ConfigHeader::query()
        };

        device.with_state(|state| {
            state.on_config(&netif, TARGET, &config, 0);

            // (1500 - 22) / 512 = 2 sectors
            assert_eq!(state.max_data_len, 1024);
        });
    }

    #[test]
    fn open_device_is_not_reidentified() {
        crate::test_logger();

        let (device, netif) = up_device(2, 1024, false);

        device.lock().open_count = 1;

        let outcome = device.with_state(|state| {
            state.on_config(&netif, TARGET, &ConfigHeader::query(), 0)
        });

        assert_eq!(outcome, ConfigOutcome::Refreshed);
        assert!(drain(&netif).is_empty());
    }
}
