//! Fixed 28-byte ARP request/reply frames for Ethernet + IPv4 (hw type 1,
//! proto type 0x0800, hw len 6, proto len 4).

use std::net::Ipv4Addr;

use super::Error;

pub const FRAME_LEN: usize = 28;

pub const OP_REQUEST: u16 = 1;
pub const OP_REPLY: u16 = 2;

pub type MacAddr = [u8; 6];

/// A decoded or to-be-encoded ARP frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Arp {
    pub opcode: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl Arp {
    /// Builds a broadcast ARP request probing `target_ip`, with sender `(mac, src_ip)`.
    pub fn request(mac: MacAddr, src_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            opcode: OP_REQUEST,
            sender_mac: mac,
            sender_ip: src_ip,
            target_mac: [0xff; 6],
            target_ip,
        }
    }

    /// Encodes this frame into a fresh 28-byte buffer.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut b = [0u8; FRAME_LEN];
        b[0..2].copy_from_slice(&1u16.to_be_bytes()); // hw type: ethernet
        b[2..4].copy_from_slice(&0x0800u16.to_be_bytes()); // proto type: ipv4
        b[4] = 6; // hw len
        b[5] = 4; // proto len
        b[6..8].copy_from_slice(&self.opcode.to_be_bytes());
        b[8..14].copy_from_slice(&self.sender_mac);
        b[14..18].copy_from_slice(&self.sender_ip.octets());
        b[18..24].copy_from_slice(&self.target_mac);
        b[24..28].copy_from_slice(&self.target_ip.octets());
        b
    }

    /// Decodes a frame. Requires exactly [`FRAME_LEN`] bytes, Ethernet/IPv4.
    pub fn decode(b: &[u8]) -> Result<Self, Error> {
        if b.len() != FRAME_LEN {
            return Err(Error::DataUnderflow);
        }
        if u16::from_be_bytes([b[0], b[1]]) != 1 || u16::from_be_bytes([b[2], b[3]]) != 0x0800 {
            return Err(Error::InvalidFormat);
        }
        if b[4] != 6 || b[5] != 4 {
            return Err(Error::InvalidFormat);
        }

        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&b[8..14]);
        let mut target_mac = [0u8; 6];
        target_mac.copy_from_slice(&b[18..24]);

        Ok(Self {
            opcode: u16::from_be_bytes([b[6], b[7]]),
            sender_mac,
            sender_ip: Ipv4Addr::new(b[14], b[15], b[16], b[17]),
            target_mac,
            target_ip: Ipv4Addr::new(b[24], b[25], b[26], b[27]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_request() {
        let arp = Arp::request(
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
            Ipv4Addr::new(0, 0, 0, 0),
            Ipv4Addr::new(192, 168, 1, 1),
        );
        let encoded = arp.encode();
        let decoded = Arp::decode(&encoded).unwrap();
        assert_eq!(decoded, arp);
        assert_eq!(decoded.opcode, OP_REQUEST);
    }

    #[test]
    fn rejects_short_frame() {
        assert!(Arp::decode(&[0u8; 10]).is_err());
    }
}
