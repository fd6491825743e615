//! Linux `AF_PACKET` raw socket, after smoltcp's `RawSocketDesc`.

use super::{ifreq, ifreq_for};
use crate::{AOE_ETHERTYPE, EthernetAddress};
use async_io::IoSafe;
use core::ptr::addr_of;
use std::{
    io, mem,
    os::{
        fd::{AsFd, BorrowedFd},
        unix::io::{AsRawFd, RawFd},
    },
};

/// A non-blocking raw socket bound to one interface, receiving only AoE frames.
pub struct RawSocketDesc {
    lower: libc::c_int,
    ifreq: ifreq,
}

impl RawSocketDesc {
    pub fn new(name: &str) -> io::Result<Self> {
        let lower = open_socket(
            libc::AF_PACKET,
            libc::SOCK_RAW | libc::SOCK_NONBLOCK,
            libc::c_int::from(AOE_ETHERTYPE.to_be()),
        )?;

        let mut self_ = RawSocketDesc {
            lower,
            ifreq: ifreq_for(name)?,
        };

        self_.bind_interface()?;

        Ok(self_)
    }

    fn bind_interface(&mut self) -> io::Result<()> {
        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: AOE_ETHERTYPE.to_be(),
            sll_ifindex: ifreq_ioctl(self.lower, &mut self.ifreq, libc::SIOCGIFINDEX)?
                .ifru_int(),
            sll_hatype: 1,
            sll_pkttype: 0,
            sll_halen: 6,
            sll_addr: [0; 8],
        };

        unsafe {
            #[allow(trivial_casts)]
            let res = libc::bind(
                self.lower,
                addr_of!(sockaddr).cast(),
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            );

            if res == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(())
    }
}

impl AsRawFd for RawSocketDesc {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl AsFd for RawSocketDesc {
    fn as_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.lower) }
    }
}

// SAFETY: Implementing this trait pledges that the underlying socket resource will not be dropped
// by `Read` or `Write` impls. More information can be read
// [here](https://docs.rs/async-io/latest/async_io/trait.IoSafe.html).
unsafe impl IoSafe for RawSocketDesc {}

impl Drop for RawSocketDesc {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.lower);
        }
    }
}

impl io::Read for RawSocketDesc {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = unsafe { libc::read(self.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };

        usize::try_from(len).map_err(|_| io::Error::last_os_error())
    }
}

impl io::Write for RawSocketDesc {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = unsafe { libc::write(self.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };

        usize::try_from(len).map_err(|_| io::Error::last_os_error())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Get the hardware address of network interface `name`.
pub fn interface_mac(name: &str) -> io::Result<EthernetAddress> {
    let mut ifreq = ifreq_for(name)?;

    with_control_socket(|fd| ifreq_ioctl(fd, &mut ifreq, libc::SIOCGIFHWADDR).map(|_| ()))?;

    // `struct sockaddr`: two byte family, then the address.
    let mut mac = [0u8; 6];

    mac.copy_from_slice(&ifreq.ifr_ifru[2..8]);

    Ok(EthernetAddress(mac))
}

/// Get the MTU of network interface `name`.
pub fn interface_mtu(name: &str) -> io::Result<usize> {
    let mut ifreq = ifreq_for(name)?;

    let mtu = with_control_socket(|fd| {
        ifreq_ioctl(fd, &mut ifreq, libc::SIOCGIFMTU).map(|ifreq| ifreq.ifru_int())
    })?;

    usize::try_from(mtu).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative MTU"))
}

fn open_socket(domain: libc::c_int, ty: libc::c_int, protocol: libc::c_int) -> io::Result<RawFd> {
    let fd = unsafe { libc::socket(domain, ty, protocol) };

    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(fd)
}

/// Run `f` with a short lived datagram socket for interface queries, which unlike a raw socket
/// needs no privileges.
fn with_control_socket<T>(f: impl FnOnce(RawFd) -> io::Result<T>) -> io::Result<T> {
    let fd = open_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)?;

    let res = f(fd);

    unsafe {
        libc::close(fd);
    }

    res
}

fn ifreq_ioctl(
    lower: libc::c_int,
    ifreq: &mut ifreq,
    cmd: libc::c_ulong,
) -> io::Result<&mut ifreq> {
    unsafe {
        #[allow(trivial_casts)]
        #[cfg(target_env = "musl")]
        let res = libc::ioctl(lower, cmd as libc::c_int, ifreq as *mut ifreq);
        #[allow(trivial_casts)]
        #[cfg(not(target_env = "musl"))]
        let res = libc::ioctl(lower, cmd, ifreq as *mut ifreq);

        if res == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(ifreq)
}
