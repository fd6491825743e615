//! An in-process AoE target and helpers to drive an [`Initiator`] against it.

#![allow(unused)]

use aoecrab::{
    AOE_ETHERTYPE, AoeCommand, AoeFlags, AoeHeader, AoeRx, AoeTx, AtaHeader, ConfigCommand,
    ConfigHeader, EthernetAddress, EthernetFrame, Initiator, InitiatorConfig, SECTOR_SIZE,
    Timeouts,
};
use aoecrab_wire::{AoeWireRead, AoeWireSized, AoeWireWriteSized};
use std::{cell::Cell, time::Duration};

pub const HOST: EthernetAddress = EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const TARGET: EthernetAddress = EthernetAddress([0x00, 0x10, 0x04, 0x00, 0x00, 0x01]);

thread_local! {
    static NOW: Cell<u64> = const { Cell::new(1_000_000) };
}

/// Fake monotonic clock in microseconds, one per test thread.
pub fn now() -> u64 {
    NOW.with(Cell::get)
}

pub fn advance(by: Duration) {
    NOW.with(|now| now.set(now.get() + by.as_micros() as u64));
}

pub fn initiator(config: InitiatorConfig) -> Initiator {
    let _ = env_logger::builder().is_test(true).try_init();

    Initiator::new(config, Timeouts::default(), now)
}

/// A single AoE target backed by an in-memory disk.
#[derive(Debug)]
pub struct FakeTarget {
    pub mac: EthernetAddress,
    pub major: u16,
    pub minor: u8,
    pub buffer_count: u16,
    /// Maximum sectors per ATA command advertised in config responses.
    pub sector_count: u8,
    pub firmware_version: u16,
    pub lba48: bool,
    /// Reported capacity in sectors. Only the first `disk.len()` bytes are backed.
    pub sectors: u64,
    pub disk: Vec<u8>,
    /// Ignore every ATA command while set.
    pub mute: bool,
    /// Answer reads and writes at or beyond this sector with an ATA error.
    pub bad_sector: Option<u64>,
    /// Every ATA command received, in order.
    pub commands: Vec<(u32, AtaHeader)>,
}

impl FakeTarget {
    pub fn new(major: u16, minor: u8, disk_sectors: usize) -> Self {
        Self {
            mac: TARGET,
            major,
            minor,
            buffer_count: 16,
            sector_count: 2,
            firmware_version: 0x4019,
            lba48: false,
            sectors: disk_sectors as u64,
            disk: vec![0; disk_sectors * SECTOR_SIZE],
            mute: false,
            bad_sector: None,
            commands: Vec::new(),
        }
    }

    fn addressed(&self, header: &AoeHeader) -> bool {
        (header.major == self.major || header.major == 0xffff)
            && (header.minor == self.minor || header.minor == 0xff)
    }

    /// Handle one frame sent by the initiator, returning the response if there is one.
    pub fn handle(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let eth = EthernetFrame::new_checked(frame).ok()?;

        if eth.ethertype() != AOE_ETHERTYPE
            || (eth.dst_addr() != self.mac && !eth.dst_addr().is_broadcast())
        {
            return None;
        }

        let payload = eth.payload();

        let header = AoeHeader::unpack_from_slice(payload).ok()?;

        if header.is_response() || !self.addressed(&header) {
            return None;
        }

        let body = &payload[AoeHeader::PACKED_LEN..];

        let response_body = match header.command {
            AoeCommand::Config => ConfigHeader {
                buffer_count: self.buffer_count,
                firmware_version: self.firmware_version,
                sector_count: self.sector_count,
                version: 1,
                command: ConfigCommand::Read,
                config_len: 0,
            }
            .pack()
            .to_vec(),
            AoeCommand::Ata => {
                if self.mute {
                    return None;
                }

                let ata = AtaHeader::unpack_from_slice(body).ok()?;

                self.commands.push((header.tag, ata));

                self.ata(ata, &body[AtaHeader::PACKED_LEN..])
            }
            AoeCommand::Unknown(_) => return None,
        };

        let header = AoeHeader {
            major: self.major,
            minor: self.minor,
            ..header.into_response()
        };

        Some(self.frame(eth.src_addr(), header, &response_body))
    }

    fn ata(&mut self, mut ata: AtaHeader, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();

        let command = ata.command_status;

        // DRDY
        ata.command_status = 0x40;

        match command {
            0xec => {
                out.extend_from_slice(&self.identify());
            }
            cmd @ (0x20 | 0x24 | 0x30 | 0x34) => {
                let sector = ata.lba();
                let len = ata.data_len();
                let start = sector as usize * SECTOR_SIZE;

                let end = sector + (len / SECTOR_SIZE) as u64;

                let in_range = start + len <= self.disk.len()
                    && self.bad_sector.is_none_or(|bad| end <= bad);

                if !in_range {
                    // DRDY | ERR
                    ata.command_status = 0x41;
                } else if cmd == 0x20 || cmd == 0x24 {
                    out.extend_from_slice(&self.disk[start..start + len]);
                } else {
                    self.disk[start..start + len].copy_from_slice(&data[..len]);
                }
            }
            _ => ata.command_status = 0x41,
        }

        let mut body = ata.pack().to_vec();

        body.extend_from_slice(&out);

        body
    }

    fn identify(&self) -> [u8; 512] {
        let mut id = [0u8; 512];

        let mut word = |n: usize, value: u16| {
            id[n * 2..n * 2 + 2].copy_from_slice(&value.to_le_bytes());
        };

        word(54, 1024);
        word(55, 16);
        word(56, 63);

        if self.lba48 {
            word(83, 1 << 10);

            for n in 0..4 {
                word(100 + n, (self.sectors >> (16 * n)) as u16);
            }
        } else {
            word(60, self.sectors as u16);
            word(61, (self.sectors >> 16) as u16);
        }

        id
    }

    fn frame(&self, dst: EthernetAddress, header: AoeHeader, body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();

        frame.extend_from_slice(&dst.0);
        frame.extend_from_slice(&self.mac.0);
        frame.extend_from_slice(&AOE_ETHERTYPE.to_be_bytes());
        frame.extend_from_slice(&header.pack());
        frame.extend_from_slice(body);

        frame.resize(frame.len().max(60), 0);

        frame
    }
}

/// Take every frame the initiator has queued on this interface.
pub fn sent(tx: &mut AoeTx<'_>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();

    while let Some(frame) = tx.next_sendable_frame() {
        frame
            .send_blocking(|data| {
                frames.push(data.to_vec());

                Ok(data.len())
            })
            .expect("send");
    }

    frames
}

/// Deliver `frames` to every target and feed the responses back to the initiator.
pub fn deliver(rx: &mut AoeRx<'_>, targets: &mut [FakeTarget], frames: &[Vec<u8>]) {
    for frame in frames {
        for target in targets.iter_mut() {
            if let Some(response) = target.handle(frame) {
                rx.receive_frame(&response).expect("receive");
            }
        }
    }
}

/// Exchange frames until the initiator has nothing left to send. Returns the frames sent, one
/// batch per round. Every frame in a batch was in flight at the same time.
pub fn pump(
    tx: &mut AoeTx<'_>,
    rx: &mut AoeRx<'_>,
    targets: &mut [FakeTarget],
) -> Vec<Vec<Vec<u8>>> {
    let mut rounds = Vec::new();

    for _ in 0..10_000 {
        let frames = sent(tx);

        if frames.is_empty() {
            return rounds;
        }

        deliver(rx, targets, &frames);

        rounds.push(frames);
    }

    panic!("initiator never stopped sending");
}

/// Discover and identify every target, then create their block devices.
pub fn bring_up(
    initiator: &Initiator,
    tx: &mut AoeTx<'_>,
    rx: &mut AoeRx<'_>,
    targets: &mut [FakeTarget],
) {
    initiator.discover();

    pump(tx, rx, targets);

    initiator.process_pending_disks();
}

/// Parse the AoE and ATA headers of a frame sent by the initiator.
pub fn parse_ata(frame: &[u8]) -> (AoeHeader, AtaHeader) {
    let eth = EthernetFrame::new_checked(frame).expect("ethernet");

    let payload = eth.payload();

    let aoe = AoeHeader::unpack_from_slice(payload).expect("aoe");
    let ata = AtaHeader::unpack_from_slice(&payload[AoeHeader::PACKED_LEN..]).expect("ata");

    (aoe, ata)
}

/// An error response to `frame` with AoE error code `code`.
pub fn error_response(frame: &[u8], code: u8) -> Vec<u8> {
    let eth = EthernetFrame::new_checked(frame).expect("ethernet");

    let header = AoeHeader::unpack_from_slice(eth.payload()).expect("aoe");

    let header = AoeHeader {
        flags: AoeFlags::RESPONSE | AoeFlags::ERROR,
        error: code,
        ..header
    };

    let mut out = Vec::new();

    out.extend_from_slice(&eth.src_addr().0);
    out.extend_from_slice(&TARGET.0);
    out.extend_from_slice(&AOE_ETHERTYPE.to_be_bytes());
    out.extend_from_slice(&header.pack());
    out.resize(60, 0);

    out
}
