//! Network interfaces and the adapters that move AoE frames between them and the initiator.

mod rx;
mod tx;

pub use rx::{AoeRx, ReceiveAction};
pub use tx::{AoeTx, SendableFrame};

use crate::{EthernetAddress, error::Error, fmt};
use alloc::vec::Vec;
use atomic_waker::AtomicWaker;

/// Longest interface name, excluding the terminating NUL.
pub(crate) const IFNAME_LEN: usize = 15;

/// Frames an interface holds while waiting for its TX task.
pub(crate) const TX_QUEUE_LEN: usize = 256;

/// A network interface AoE frames are sent and received on.
///
/// Outgoing frames are queued here by the initiator and drained by the interface's [`AoeTx`].
#[derive(Debug)]
pub struct Interface {
    name: heapless::String<IFNAME_LEN>,
    mac: EthernetAddress,
    mtu: usize,
    queue: spin::Mutex<heapless::Deque<Vec<u8>, TX_QUEUE_LEN>>,
    tx_waker: AtomicWaker,
}

impl Interface {
    pub(crate) fn new(name: &str, mac: EthernetAddress, mtu: usize) -> Result<Self, Error> {
        let name = heapless::String::try_from(name).map_err(|_| {
            fmt::error!("Interface name {} is longer than {} bytes", name, IFNAME_LEN);

            Error::InterfaceName
        })?;

        Ok(Self {
            name,
            mac,
            mtu,
            queue: spin::Mutex::new(heapless::Deque::new()),
            tx_waker: AtomicWaker::new(),
        })
    }

    /// Interface name, e.g. `eth0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware address used as the source of every frame sent on this interface.
    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    /// Payload MTU, not including the Ethernet header.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Number of frames waiting to be sent.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Queue frames for transmission and wake the TX task.
    ///
    /// Frames that do not fit are dropped. Lost commands are recovered by retransmission.
    pub(crate) fn enqueue(&self, frames: impl IntoIterator<Item = Vec<u8>>) {
        let mut queued = 0;
        let mut dropped = 0;

        {
            let mut queue = self.queue.lock();

            for frame in frames {
                if queue.push_back(frame).is_ok() {
                    queued += 1;
                } else {
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            fmt::warn!(
                "TX queue on {} is full, dropped {} frames",
                self.name(),
                dropped
            );
        }

        if queued > 0 {
            fmt::trace!("Queued {} frames on {}", queued, self.name());

            self.tx_waker.wake();
        }
    }

    /// Put a frame that could not be sent back at the front of the queue.
    pub(crate) fn requeue(&self, frame: Vec<u8>) {
        if self.queue.lock().push_front(frame).is_err() {
            fmt::warn!("TX queue on {} is full, dropped unsent frame", self.name());
        }
    }

    pub(crate) fn dequeue(&self) -> Option<Vec<u8>> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn register_waker(&self, waker: &core::task::Waker) {
        self.tx_waker.register(waker);
    }

    pub(crate) fn wake(&self) {
        self.tx_waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn name_too_long() {
        crate::test_logger();

        assert_eq!(
            Interface::new("a-very-long-interface-name", EthernetAddress::default(), 1500)
                .unwrap_err(),
            Error::InterfaceName
        );
    }

    #[test]
    fn queue_order() {
        crate::test_logger();

        let netif = Interface::new("eth0", EthernetAddress::default(), 1500).unwrap();

        netif.enqueue([vec![1], vec![2]]);
        netif.requeue(vec![0]);

        assert_eq!(netif.pending(), 3);
        assert_eq!(netif.dequeue(), Some(vec![0]));
        assert_eq!(netif.dequeue(), Some(vec![1]));
        assert_eq!(netif.dequeue(), Some(vec![2]));
        assert_eq!(netif.dequeue(), None);
    }

    #[test]
    fn queue_is_bounded() {
        crate::test_logger();

        let netif = Interface::new("eth0", EthernetAddress::default(), 1500).unwrap();

        netif.enqueue((0..TX_QUEUE_LEN + 10).map(|i| vec![i as u8]));

        assert_eq!(netif.pending(), TX_QUEUE_LEN);

        netif.requeue(vec![0xff]);

        assert_eq!(netif.pending(), TX_QUEUE_LEN);
        assert_eq!(netif.dequeue(), Some(vec![0]));
    }
}
