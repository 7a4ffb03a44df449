//! Linux `AF_PACKET`/`SOCK_DGRAM` raw sockets bound to a single interface and
//! EtherType, generalized from `edge-nal-std`'s broader STD networking stack
//! (TCP/UDP/DNS/multicast) down to just the raw link-layer piece a link-layer
//! DHCP agent needs: five constructors differing only in EtherType and in
//! which MAC they default a send to (broadcast vs a specific unicast peer).
//!
//! On Linux, creating the underlying socket requires `CAP_NET_RAW`.

use core::pin::pin;

use std::io::{self, ErrorKind};
use std::ops::Deref;
use std::os::fd::{AsFd, AsRawFd};

use async_io::Async;
use futures_lite::io::AsyncWriteExt as _;

use embedded_io_async::ErrorType;

use psa_net::{MacAddr, RawBind, RawReceive, RawSend, RawSplit, Readable};

mod iface;
pub use iface::{hwaddr_of, index_of};

mod sys {
    pub use libc::*;

    #[macro_export]
    macro_rules! syscall_los {
        ($ret:expr) => {{
            let result = $ret;

            if result == -1 {
                Err(::std::io::Error::last_os_error())
            } else {
                Ok(result)
            }
        }};
    }
}

pub const ETH_P_IP: u16 = libc::ETH_P_IP as u16;
pub const ETH_P_ARP: u16 = libc::ETH_P_ARP as u16;

const BROADCAST: MacAddr = [0xff; 6];

/// Binds an `AF_PACKET`/`SOCK_DGRAM` socket to `ifindex`, filtering on
/// `ethertype`. `default_dst` is the MAC `send_default` uses; the generic
/// [`RawSend::send`] always takes an explicit destination regardless.
struct Interface {
    ifindex: u32,
    ethertype: u16,
    default_dst: MacAddr,
}

impl RawBind for Interface {
    type Error = io::Error;

    type Socket<'a> = RawSocket;

    async fn bind(&self) -> Result<Self::Socket<'_>, Self::Error> {
        let socket = syscall_los!(unsafe {
            sys::socket(sys::PF_PACKET, sys::SOCK_DGRAM, self.ethertype.to_be() as _)
        })?;

        let sockaddr = sys::sockaddr_ll {
            sll_family: sys::AF_PACKET as _,
            sll_protocol: self.ethertype.to_be() as _,
            sll_ifindex: self.ifindex as _,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: Default::default(),
        };

        syscall_los!(unsafe {
            sys::bind(
                socket,
                &sockaddr as *const _ as *const _,
                core::mem::size_of::<sys::sockaddr_ll>() as _,
            )
        })?;

        let socket = {
            use std::os::fd::FromRawFd;
            unsafe { std::net::UdpSocket::from_raw_fd(socket) }
        };

        socket.set_nonblocking(true)?;
        socket.set_broadcast(true)?;

        Ok(RawSocket {
            io: Async::new(socket)?,
            ifindex: self.ifindex,
            default_dst: self.default_dst,
        })
    }
}

/// A bound raw link-layer socket; owns exactly one fd, closed on drop (and
/// on drop the one pending `receive().await` unblocks with an I/O error).
pub struct RawSocket {
    io: Async<std::net::UdpSocket>,
    ifindex: u32,
    default_dst: MacAddr,
}

impl RawSocket {
    /// Sends to the destination this socket was constructed with (broadcast
    /// for the `*_send_sock` constructors below, or the peer MAC passed to
    /// [`get_unicast_send_sock`]).
    pub async fn send_default(&mut self, data: &[u8]) -> io::Result<()> {
        let dst = self.default_dst;
        RawSend::send(self, dst, data).await
    }
}

impl Deref for RawSocket {
    type Target = Async<std::net::UdpSocket>;

    fn deref(&self) -> &Self::Target {
        &self.io
    }
}

impl ErrorType for &RawSocket {
    type Error = io::Error;
}

impl RawReceive for &RawSocket {
    async fn receive(&mut self, buffer: &mut [u8]) -> Result<(usize, MacAddr), Self::Error> {
        let fut = pin!(self.io.read_with(|io| {
            let mut storage: sys::sockaddr_storage = unsafe { core::mem::zeroed() };
            let mut addrlen = core::mem::size_of_val(&storage) as sys::socklen_t;

            let ret = syscall_los!(unsafe {
                sys::recvfrom(
                    io.as_fd().as_raw_fd(),
                    buffer.as_mut_ptr() as *mut _,
                    buffer.len(),
                    0,
                    &mut storage as *mut _ as *mut _,
                    &mut addrlen,
                )
            })?;

            let sockaddr = as_sockaddr_ll(&storage, addrlen as usize)?;

            let mut mac = [0u8; 6];
            mac.copy_from_slice(&sockaddr.sll_addr[..6]);

            Ok((ret as usize, mac))
        }));

        fut.await
    }
}

impl RawSend for &RawSocket {
    async fn send(&mut self, addr: MacAddr, data: &[u8]) -> Result<(), Self::Error> {
        let mut sockaddr = sys::sockaddr_ll {
            sll_family: sys::AF_PACKET as _,
            sll_protocol: (ETH_P_IP).to_be() as _,
            sll_ifindex: self.ifindex as _,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: addr.len() as _,
            sll_addr: Default::default(),
        };
        sockaddr.sll_addr[..addr.len()].copy_from_slice(&addr);

        let fut = pin!(self.io.write_with(|io| {
            let len = core::cmp::min(data.len(), u16::MAX as usize);

            let ret = syscall_los!(unsafe {
                sys::sendto(
                    io.as_fd().as_raw_fd(),
                    data.as_ptr() as *const _,
                    len,
                    sys::MSG_NOSIGNAL,
                    &sockaddr as *const _ as *const _,
                    core::mem::size_of::<sys::sockaddr_ll>() as _,
                )
            })?;
            Ok(ret as usize)
        }));

        let len = fut.await?;
        assert_eq!(len, data.len());

        Ok(())
    }
}

impl Readable for &RawSocket {
    async fn readable(&mut self) -> Result<(), Self::Error> {
        self.io.readable().await
    }
}

impl ErrorType for RawSocket {
    type Error = io::Error;
}

impl RawReceive for RawSocket {
    async fn receive(&mut self, buffer: &mut [u8]) -> Result<(usize, MacAddr), Self::Error> {
        let mut rself = &*self;
        let fut = pin!(rself.receive(buffer));
        fut.await
    }
}

impl RawSend for RawSocket {
    async fn send(&mut self, addr: MacAddr, data: &[u8]) -> Result<(), Self::Error> {
        let mut rself = &*self;
        let fut = pin!(rself.send(addr, data));
        fut.await
    }
}

impl RawSplit for RawSocket {
    type Receive<'a> = &'a RawSocket;
    type Send<'a> = &'a RawSocket;

    fn split(&mut self) -> (Self::Receive<'_>, Self::Send<'_>) {
        let socket = &*self;
        (socket, socket)
    }
}

impl Readable for RawSocket {
    async fn readable(&mut self) -> Result<(), Self::Error> {
        self.io.readable().await
    }
}

fn as_sockaddr_ll(storage: &sys::sockaddr_storage, len: usize) -> io::Result<&sys::sockaddr_ll> {
    match storage.ss_family as core::ffi::c_int {
        sys::AF_PACKET => {
            if len < core::mem::size_of::<sys::sockaddr_ll>() {
                return Err(io::Error::new(ErrorKind::InvalidInput, "short sockaddr_ll"));
            }
            Ok(unsafe { &*(storage as *const _ as *const sys::sockaddr_ll) })
        }
        _ => Err(io::Error::new(ErrorKind::InvalidInput, "invalid argument")),
    }
}

/// A broadcast-destined IPv4 send socket (link-layer destination
/// `ff:ff:ff:ff:ff:ff`).
pub async fn get_ip_send_sock(ifindex: u32) -> io::Result<RawSocket> {
    Interface {
        ifindex,
        ethertype: ETH_P_IP,
        default_dst: BROADCAST,
    }
    .bind()
    .await
}

/// Same as [`get_ip_send_sock`] but defaults to unicasting to `hw`.
pub async fn get_unicast_send_sock(ifindex: u32, hw: MacAddr) -> io::Result<RawSocket> {
    Interface {
        ifindex,
        ethertype: ETH_P_IP,
        default_dst: hw,
    }
    .bind()
    .await
}

/// A broadcast-destined ARP send socket (EtherType 0x0806).
pub async fn get_arp_send_sock(ifindex: u32) -> io::Result<RawSocket> {
    Interface {
        ifindex,
        ethertype: ETH_P_ARP,
        default_dst: BROADCAST,
    }
    .bind()
    .await
}

/// A non-blocking receive socket bound to EtherType 0x0800.
pub async fn get_ip_recv_sock(ifindex: u32) -> io::Result<RawSocket> {
    Interface {
        ifindex,
        ethertype: ETH_P_IP,
        default_dst: BROADCAST,
    }
    .bind()
    .await
}

/// A non-blocking receive socket bound to EtherType 0x0806.
pub async fn get_arp_recv_sock(ifindex: u32) -> io::Result<RawSocket> {
    Interface {
        ifindex,
        ethertype: ETH_P_ARP,
        default_dst: BROADCAST,
    }
    .bind()
    .await
}
