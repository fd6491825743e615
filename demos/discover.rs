//! Discover AoE targets on a network interface, list them and read the first sector of each.
//!
//! Needs `CAP_NET_RAW`. Run with e.g.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example discover --release -- eth0
//! ```

use aoecrab::{
    Initiator, InitiatorConfig, Request, SECTOR_SIZE, Timeouts,
    error::Error,
    std::{aoe_now, interface_mac, interface_mtu, timer_task, tx_rx_task},
};
use env_logger::Env;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let interface = std::env::args()
        .nth(1)
        .expect("Provide network interface as first argument.");

    log::info!("Discovering AoE targets on {}", interface);
    log::info!("Run with RUST_LOG=aoecrab=debug or =trace for debug information");

    let mac = interface_mac(&interface).expect("interface MAC");
    let mtu = interface_mtu(&interface).expect("interface MTU");

    let initiator: &'static Initiator = Box::leak(Box::new(Initiator::new(
        InitiatorConfig::default(),
        Timeouts::default(),
        aoe_now,
    )));

    let (tx, rx) = initiator.add_interface(&interface, mac, mtu)?;

    tokio::spawn(tx_rx_task(&interface, tx, rx).expect("spawn TX/RX task"));
    tokio::spawn(timer_task(initiator));

    // Give targets time to answer the first broadcast and be identified.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let devices = initiator.devices();

    if devices.is_empty() {
        log::warn!("No targets found");
    }

    for info in devices {
        log::info!(
            "{} at {} on {}: {}, {} sectors, {} byte frames, firmware {:#06x}",
            info.address,
            info.mac,
            info.netif,
            info.state,
            info.sectors,
            info.max_data_len,
            info.firmware_version
        );

        let Some(disk) = initiator.block_device(info.address.major, info.address.minor) else {
            continue;
        };

        disk.open()?;

        let sector = disk
            .submit(Request::read_len(0, SECTOR_SIZE))?
            .await?
            .into_bytes();

        log::info!("{} sector 0: {:02x?}", disk.name(), &sector[0..32]);

        disk.close();
    }

    initiator.shutdown();

    Ok(())
}
