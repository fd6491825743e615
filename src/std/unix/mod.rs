//! Items to use when not in `no_std` environments.

mod linux;

pub use self::linux::{interface_mac, interface_mtu};

use self::linux::RawSocketDesc;
use crate::{AoeRx, AoeTx, error::Error, ethernet::HEADER_LEN, fmt};
use async_io::Async;
use core::{future::Future, pin::Pin, task::Poll};
use futures_lite::{AsyncRead, AsyncWrite};

struct TxRxFut<'a> {
    socket: Async<RawSocketDesc>,
    /// Receive buffer, one Ethernet frame at the interface MTU.
    buf: Vec<u8>,
    tx: Option<AoeTx<'a>>,
    rx: Option<AoeRx<'a>>,
}

impl<'a> Future for TxRxFut<'a> {
    type Output = Result<(AoeTx<'a>, AoeRx<'a>), Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut core::task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let (Some(tx), Some(rx)) = (this.tx.as_mut(), this.rx.as_mut()) else {
            fmt::error!("TX/RX future polled after completion");

            return Poll::Ready(Err(Error::Internal));
        };

        // Re-register waker to make sure this future is polled again
        tx.replace_waker(ctx.waker());

        if tx.should_exit() {
            fmt::debug!("TX/RX future was asked to exit");

            return match (this.tx.take(), this.rx.take()) {
                (Some(tx), Some(rx)) => Poll::Ready(Ok((tx, rx))),
                _ => Poll::Ready(Err(Error::Internal)),
            };
        }

        while let Some(frame) = tx.next_sendable_frame() {
            let res = frame.send_blocking(|data| {
                match Pin::new(&mut this.socket).poll_write(ctx, data) {
                    Poll::Ready(Ok(bytes_written)) => {
                        if bytes_written != data.len() {
                            fmt::error!("Only wrote {} of {} bytes", bytes_written, data.len());
                        }

                        Ok(bytes_written)
                    }
                    Poll::Ready(Err(e)) => {
                        fmt::error!("Send frame failed: {}", e);

                        Err(Error::SendFrame)
                    }
                    Poll::Pending => Ok(0),
                }
            });

            match res {
                // Socket is full. The frame is back at the head of the queue and the socket wakes
                // us when it has room.
                Ok(0) => break,
                Ok(_) => (),
                Err(e) => {
                    fmt::error!("Send frame failed: {}", e);

                    return Poll::Ready(Err(e));
                }
            }
        }

        match Pin::new(&mut this.socket).poll_read(ctx, &mut this.buf) {
            Poll::Ready(Ok(n)) => {
                // More frames may be waiting behind this one.
                ctx.waker().wake_by_ref();

                let packet = this.buf.get(0..n).ok_or(Error::Internal)?;

                if n == 0 {
                    fmt::warn!("Received zero bytes");
                }

                // Runts, foreign traffic and malformed AoE frames are dropped. They must not take
                // the interface down.
                if let Err(e) = rx.receive_frame(packet) {
                    fmt::debug!("Dropped frame: {}", e);
                }
            }
            Poll::Ready(Err(e)) => {
                fmt::error!("Receive frame failed: {}", e);

                return Poll::Ready(Err(Error::ReceiveFrame));
            }
            Poll::Pending => (),
        }

        Poll::Pending
    }
}

/// Create a task that sends and receives AoE frames on `interface` using a raw socket.
///
/// The interface must be the one `tx` and `rx` were created for with
/// [`Initiator::add_interface`](crate::Initiator::add_interface). Requires `CAP_NET_RAW`.
///
/// The task resolves once [`Initiator::shutdown`](crate::Initiator::shutdown) is called, giving
/// back the adapters.
pub fn tx_rx_task<'init>(
    interface: &str,
    tx: AoeTx<'init>,
    rx: AoeRx<'init>,
) -> Result<
    impl Future<Output = Result<(AoeTx<'init>, AoeRx<'init>), Error>> + use<'init>,
    std::io::Error,
> {
    let socket = RawSocketDesc::new(interface)?;

    let mtu = rx.interface().mtu();

    fmt::debug!("Opening {} with MTU {}", interface, mtu);

    let task = TxRxFut {
        socket: Async::new(socket)?,
        buf: vec![0; mtu + HEADER_LEN],
        tx: Some(tx),
        rx: Some(rx),
    };

    Ok(task)
}

/// Get the current time in microseconds from the system's monotonic clock.
///
/// Suitable as the `clock` argument of [`Initiator::new`](crate::Initiator::new).
pub fn aoe_now() -> u64 {
    let mut time = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut time);
    };

    let secs = u64::try_from(time.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(time.tv_nsec).unwrap_or(0);

    secs * 1_000_000 + nanos / 1_000
}

/// Request block for interface ioctls.
#[repr(C)]
#[derive(Debug)]
#[allow(non_camel_case_types)]
struct ifreq {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
    /// `ifr_ifindex`, `ifr_mtu` or `ifr_hwaddr`, depending on the request.
    ifr_ifru: [u8; 24],
}

impl ifreq {
    fn ifru_int(&self) -> libc::c_int {
        let [a, b, c, d, ..] = self.ifr_ifru;

        libc::c_int::from_ne_bytes([a, b, c, d])
    }
}

fn ifreq_for(name: &str) -> std::io::Result<ifreq> {
    // Room for the NUL terminator.
    if name.len() >= libc::IF_NAMESIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "interface name too long",
        ));
    }

    let mut ifreq = ifreq {
        ifr_name: [0; libc::IF_NAMESIZE],
        ifr_ifru: [0; 24],
    };

    for (dst, byte) in ifreq.ifr_name.iter_mut().zip(name.bytes()) {
        *dst = libc::c_char::from_ne_bytes([byte]);
    }

    Ok(ifreq)
}
