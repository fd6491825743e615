//! A pure Rust ATA over Ethernet (AoE) initiator.
//!
//! aoecrab discovers AoE targets on a local Ethernet segment, identifies them with ATA IDENTIFY
//! and exposes each one as a [`BlockDevice`] that accepts read and write [`Request`]s. Requests are
//! sliced into ATA commands sized to the negotiated MTU, matched with their responses by tag and
//! retransmitted on an adaptive, RTT based deadline.
//!
//! There is no background thread inside the crate. Work happens when a request is submitted, when
//! a frame is handed to an [`AoeRx`], and when the application (or [`std::timer_task`]) calls
//! [`Initiator::run_timers`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use aoecrab::{
//!     Initiator, InitiatorConfig, Request, Timeouts,
//!     std::{aoe_now, interface_mac, interface_mtu, timer_task, tx_rx_task},
//! };
//!
//! let initiator = Box::leak(Box::new(Initiator::new(
//!     InitiatorConfig::default(),
//!     Timeouts::default(),
//!     aoe_now,
//! )));
//!
//! let mac = interface_mac("eth0").expect("MAC");
//! let mtu = interface_mtu("eth0").expect("MTU");
//!
//! let (tx, rx) = initiator.add_interface("eth0", mac, mtu).expect("interface");
//!
//! smol::block_on(async {
//!     smol::spawn(tx_rx_task("eth0", tx, rx).expect("raw socket")).detach();
//!     smol::spawn(timer_task(initiator)).detach();
//!
//!     smol::Timer::after(std::time::Duration::from_secs(1)).await;
//!
//!     let disk = initiator.block_device(0, 1).expect("e0.1 not found");
//!
//!     disk.open().expect("open");
//!
//!     let request = disk
//!         .submit(Request::read_len(0, 4096))
//!         .expect("submit")
//!         .await
//!         .expect("read");
//!
//!     println!("first sector: {:02x?}", &request.into_bytes()[0..512]);
//!
//!     disk.close();
//! });
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(rustdoc::broken_intra_doc_links)]

extern crate alloc;

mod fmt;

mod aoe_header;
mod ata;
mod block;
mod buf;
mod command;
mod config_header;
mod device;
mod discovery;
pub mod error;
mod ethernet;
mod frame_pool;
mod initiator;
mod initiator_config;
mod net;
mod registry;
#[cfg(feature = "std")]
pub mod std;
mod timeouts;

pub use aoe_header::{AoeCommand, AoeErrorCode, AoeFlags, AoeHeader};
pub use ata::{AtaFlags, AtaHeader, DriveIdentity, Geometry};
pub use block::{BlockDevice, Ioctl};
pub use buf::{Direction, IoFuture, Request};
pub use config_header::{ConfigCommand, ConfigHeader};
pub use device::{AoeAddress, DeviceInfo};
pub use ethernet::{EthernetAddress, EthernetFrame};
pub use initiator::Initiator;
pub use initiator_config::InitiatorConfig;
pub use net::{AoeRx, AoeTx, Interface, ReceiveAction, SendableFrame};
pub use timeouts::Timeouts;

/// The AoE EtherType.
pub const AOE_ETHERTYPE: u16 = 0x88a2;

/// AoE protocol version spoken by this initiator.
pub const AOE_VERSION: u8 = 1;

/// Slots per shelf used to derive a device's system minor number.
pub const NPERSHELF: u32 = 16;

/// Block-device minors reserved per AoE device.
pub const AOE_PARTITIONS: u32 = 16;

/// ATA sector size in bytes.
pub const SECTOR_SIZE: usize = 512;

#[cfg(test)]
fn test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
