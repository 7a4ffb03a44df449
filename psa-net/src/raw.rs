//! Traits for sending and receiving raw link-layer datagrams.

use embedded_io_async::ErrorType;

use crate::Readable;

/// A MAC address.
pub type MacAddr = [u8; 6];

/// Implemented by raw sockets and models their datagram receiving functionality.
pub trait RawReceive: ErrorType {
    /// Receive a datagram into the provided buffer.
    ///
    /// If the received datagram exceeds the buffer's length, it is received regardless, and the
    /// remaining bytes are discarded. The full datagram size is still indicated in the result,
    /// allowing the recipient to detect that truncation.
    ///
    /// The remote Mac address is given in the result along with the number
    /// of bytes.
    async fn receive(&mut self, buffer: &mut [u8]) -> Result<(usize, MacAddr), Self::Error>;
}

/// Implemented by raw sockets and models their datagram sending functionality.
pub trait RawSend: ErrorType {
    /// Send the provided data to a peer.
    ///
    /// A MAC address is provided to specify the destination.
    /// If the destination mac address contains all `0xff`, the packet is broadcast.
    async fn send(&mut self, addr: MacAddr, data: &[u8]) -> Result<(), Self::Error>;
}

/// Implemented by raw sockets that can be split into independent send/receive halves.
pub trait RawSplit: ErrorType {
    type Receive<'a>: RawReceive<Error = Self::Error>
    where
        Self: 'a;
    type Send<'a>: RawSend<Error = Self::Error>
    where
        Self: 'a;

    fn split(&mut self) -> (Self::Receive<'_>, Self::Send<'_>);
}

/// Implemented by the factory that binds a raw socket to a network interface.
///
/// On Linux, creating the underlying `AF_PACKET` socket requires `CAP_NET_RAW`.
pub trait RawBind {
    type Error: embedded_io_async::Error;

    type Socket<'a>: RawReceive<Error = Self::Error>
        + RawSend<Error = Self::Error>
        + RawSplit<Error = Self::Error>
        + Readable<Error = Self::Error>
    where
        Self: 'a;

    async fn bind(&self) -> Result<Self::Socket<'_>, Self::Error>;
}

impl<T> RawReceive for &mut T
where
    T: RawReceive,
{
    async fn receive(&mut self, buffer: &mut [u8]) -> Result<(usize, MacAddr), Self::Error> {
        (**self).receive(buffer).await
    }
}

impl<T> RawSend for &mut T
where
    T: RawSend,
{
    async fn send(&mut self, addr: MacAddr, data: &[u8]) -> Result<(), Self::Error> {
        (**self).send(addr, data).await
    }
}

impl<T> RawBind for &T
where
    T: RawBind,
{
    type Error = T::Error;
    type Socket<'a>
        = T::Socket<'a>
    where
        Self: 'a;

    async fn bind(&self) -> Result<Self::Socket<'_>, Self::Error> {
        (*self).bind().await
    }
}
