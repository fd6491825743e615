use crate::{Initiator, Interface, error::Error, fmt};
use alloc::{sync::Arc, vec::Vec};
use core::task::Waker;

/// AoE frame transmit adapter for one network interface.
pub struct AoeTx<'init> {
    initiator: &'init Initiator,
    netif: Arc<Interface>,
}

impl<'init> AoeTx<'init> {
    pub(crate) fn new(initiator: &'init Initiator, netif: Arc<Interface>) -> Self {
        Self { initiator, netif }
    }

    /// The interface this adapter sends on.
    pub fn interface(&self) -> &Interface {
        &self.netif
    }

    /// Get the next frame queued for sending, if any.
    // NOTE: Mutable so it can only be used in one task.
    pub fn next_sendable_frame(&mut self) -> Option<SendableFrame> {
        if self.should_exit() {
            return None;
        }

        self.netif.dequeue().map(|data| SendableFrame {
            data,
            netif: Arc::clone(&self.netif),
        })
    }

    /// Set or replace the waker woken when new frames are queued on this interface.
    ///
    /// The waker must be set otherwise the future in charge of sending frames will not be woken
    /// again and commands will only go out when the retransmit timer fires.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use aoecrab::{EthernetAddress, Initiator, InitiatorConfig, Timeouts};
    /// use core::future::poll_fn;
    /// use core::task::Poll;
    ///
    /// # fn now() -> u64 { 0 }
    /// # let initiator = Initiator::new(InitiatorConfig::default(), Timeouts::default(), now);
    /// let (mut tx, _rx) = initiator
    ///     .add_interface("eth0", EthernetAddress([0x02, 0, 0, 0, 0, 1]), 1500)
    ///     .expect("interface");
    ///
    /// poll_fn(|ctx| {
    ///     // Set the waker so this future is polled again when new AoE frames are ready to be
    ///     // sent.
    ///     tx.replace_waker(ctx.waker());
    ///
    ///     // Send and receive packets over the network interface here
    ///
    ///     Poll::<()>::Pending
    /// });
    /// ```
    pub fn replace_waker(&self, waker: &Waker) {
        self.netif.register_waker(waker);
    }

    /// Returns `true` if the TX task should exit.
    ///
    /// This will be triggered by [`Initiator::shutdown`](crate::Initiator::shutdown).
    pub fn should_exit(&self) -> bool {
        self.initiator.should_exit()
    }
}

/// An AoE frame that is ready to be sent over the network.
///
/// This struct can be acquired by calling [`AoeTx::next_sendable_frame`].
///
/// # Examples
///
/// ```rust,no_run
/// # use aoecrab::{EthernetAddress, Initiator, InitiatorConfig, Timeouts};
/// use core::future::poll_fn;
/// use core::task::Poll;
///
/// # fn now() -> u64 { 0 }
/// # let initiator = Initiator::new(InitiatorConfig::default(), Timeouts::default(), now);
/// let (mut tx, _rx) = initiator
///     .add_interface("eth0", EthernetAddress([0x02, 0, 0, 0, 0, 1]), 1500)
///     .expect("interface");
///
/// poll_fn(|ctx| {
///     tx.replace_waker(ctx.waker());
///
///     while let Some(frame) = tx.next_sendable_frame() {
///         frame
///             .send_blocking(|data| {
///                 // Send packet over the network interface here
///
///                 // Return the number of bytes sent over the network
///                 Ok(data.len())
///             })
///             .expect("send");
///     }
///
///     Poll::<()>::Pending
/// });
/// ```
#[derive(Debug)]
pub struct SendableFrame {
    data: Vec<u8>,
    netif: Arc<Interface>,
}

impl SendableFrame {
    /// Get the Ethernet frame length of this frame.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Send the frame using a blocking callback.
    ///
    /// The closure must return the number of bytes sent over the network interface. Returning
    /// `Ok(0)` means the interface is not ready: the frame is put back at the front of the queue
    /// and `Ok(0)` is returned. Any other count that does not match the frame length is an error.
    pub fn send_blocking(
        self,
        send: impl FnOnce(&[u8]) -> Result<usize, Error>,
    ) -> Result<usize, Error> {
        let len = self.data.len();

        match send(&self.data) {
            Ok(bytes_sent) if bytes_sent == len => {
                fmt::trace!("Sent {} byte frame on {}", len, self.netif.name());

                Ok(bytes_sent)
            }
            Ok(0) => {
                self.release_sending_claim();

                Ok(0)
            }
            Ok(bytes_sent) => Err(Error::PartialSend {
                len,
                sent: bytes_sent,
            }),
            Err(res) => {
                self.release_sending_claim();

                Err(res)
            }
        }
    }

    /// Used on send failure to put the frame back so it can be sent again.
    fn release_sending_claim(self) {
        self.netif.requeue(self.data);
    }
}
