//! IPv4, UDP, ARP and DHCP frame assembly/parsing, with RFC 1071 one's-complement
//! checksums. Generalized from a `no_std`/no-alloc IP+UDP codec into a `std` one
//! that also speaks ARP and the fixed-layout DHCP message on top.

use std::net::{Ipv4Addr, SocketAddrV4};

use self::udp::UdpPacketHeader;

pub mod arp;
pub mod bytes;
pub mod ip;
pub mod message;
pub mod udp;

use bytes::BytesIn;

/// An error type for decoding and encoding IP, UDP, ARP and DHCP packets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Error {
    DataUnderflow,
    BufferOverflow,
    InvalidFormat,
    InvalidChecksum,
    TruncatedOptions,
}

impl From<bytes::Error> for Error {
    fn from(value: bytes::Error) -> Self {
        match value {
            bytes::Error::BufferOverflow => Self::BufferOverflow,
            bytes::Error::DataUnderflow => Self::DataUnderflow,
            bytes::Error::InvalidFormat => Self::InvalidFormat,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let str = match self {
            Self::DataUnderflow => "data underflow",
            Self::BufferOverflow => "buffer overflow",
            Self::InvalidFormat => "invalid format",
            Self::InvalidChecksum => "invalid checksum",
            Self::TruncatedOptions => "truncated dhcp options",
        };

        write!(f, "{}", str)
    }
}

impl std::error::Error for Error {}

/// Synthesizes a DUID-LL-shaped client identifier from a MAC: `00 03 00 00`
/// (DUID-LL with a reserved-zero hw type, chosen so it can never collide with
/// a client-supplied option-61 value) followed by the 6 MAC bytes.
pub fn duid_ll_from_mac(mac: [u8; 6]) -> Vec<u8> {
    let mut v = vec![0x00, 0x03, 0x00, 0x00];
    v.extend_from_slice(&mac);
    v
}

/// Decodes an IP packet and its UDP payload.
#[allow(clippy::type_complexity)]
pub fn ip_udp_decode(
    packet: &[u8],
    filter_src: Option<SocketAddrV4>,
    filter_dst: Option<SocketAddrV4>,
) -> Result<Option<(SocketAddrV4, SocketAddrV4, &[u8])>, Error> {
    if let Some((src, dst, _proto, udp_packet)) = ip::decode(
        packet,
        filter_src.map(|a| *a.ip()).unwrap_or(Ipv4Addr::UNSPECIFIED),
        filter_dst.map(|a| *a.ip()).unwrap_or(Ipv4Addr::UNSPECIFIED),
        Some(UdpPacketHeader::PROTO),
    )? {
        udp::decode(
            src,
            dst,
            udp_packet,
            filter_src.map(|a| a.port()),
            filter_dst.map(|a| a.port()),
        )
    } else {
        Ok(None)
    }
}

/// Encodes an IP packet and its UDP payload.
pub fn ip_udp_encode<F>(
    buf: &mut [u8],
    src: SocketAddrV4,
    dst: SocketAddrV4,
    encoder: F,
) -> Result<&[u8], Error>
where
    F: FnOnce(&mut [u8]) -> Result<usize, Error>,
{
    ip::encode(buf, *src.ip(), *dst.ip(), UdpPacketHeader::PROTO, |buf| {
        Ok(udp::encode(buf, src, dst, encoder)?.len())
    })
}

/// Running RFC 1071 one's-complement accumulator over `bytes`, treating the
/// 16-bit word at `checksum_word` (already zeroed by the caller) as zero.
pub fn checksum_accumulate(bytes: &[u8], checksum_word: usize) -> u32 {
    let mut bytes = BytesIn::new(bytes);

    let mut sum: u32 = 0;
    while !bytes.is_empty() {
        let skip = (bytes.offset() >> 1) == checksum_word;
        let arr = bytes
            .arr()
            .ok()
            .unwrap_or_else(|| [bytes.byte().expect("checked non-empty above"), 0]);

        let word = if skip { 0 } else { u16::from_be_bytes(arr) };

        sum += word as u32;
    }

    sum
}

/// Folds a 32-bit accumulator down to the final 16-bit one's-complement checksum.
pub fn checksum_finish(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xffff);
    }

    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_zeroed_header_is_trivial() {
        let buf = [0u8; 20];
        let sum = checksum_accumulate(&buf, 5);
        assert_eq!(checksum_finish(sum), 0xffff);
    }
}
