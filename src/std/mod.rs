//! Items required for running in `std` environments.

#[cfg(target_os = "linux")]
mod unix;

use crate::{Initiator, fmt};
use futures_lite::StreamExt;

#[cfg(target_os = "linux")]
pub use unix::{aoe_now, interface_mac, interface_mtu, tx_rx_task};

/// Drive retransmission, periodic discovery and block device creation.
///
/// Calls [`Initiator::run_timers`] immediately, which broadcasts the first discovery query, then
/// once every [`Timeouts::tick`](crate::Timeouts::tick). Returns once
/// [`Initiator::shutdown`] has been called.
pub async fn timer_task(initiator: &Initiator) {
    let mut ticks = async_io::Timer::interval(initiator.timeouts().tick);

    loop {
        if initiator.should_exit() {
            fmt::debug!("Timer task was asked to exit");

            break;
        }

        initiator.run_timers();

        ticks.next().await;
    }
}

/// Get the current time in microseconds from an arbitrary, fixed starting point.
#[cfg(not(target_os = "linux"))]
pub fn aoe_now() -> u64 {
    use std::{sync::OnceLock, time::Instant};

    static START: OnceLock<Instant> = OnceLock::new();

    let elapsed = START.get_or_init(Instant::now).elapsed();

    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
