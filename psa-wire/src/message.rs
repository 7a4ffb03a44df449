//! The fixed 240-byte DHCP header plus variable-length TLV options (RFC 2131 §2,
//! RFC 2132). This module only assembles/parses the wire shape; giving meaning
//! to option codes (message type, requested IP, ...) is `psa-proto`'s job.

use std::net::Ipv4Addr;

use super::Error;

pub const COOKIE: u32 = 0x6382_5363;
pub const MIN_LEN: usize = 240;

pub const OP_REQUEST: u8 = 1;
pub const OP_REPLY: u8 = 2;

pub const HTYPE_ETHER: u8 = 1;

pub const FLAG_BROADCAST: u16 = 1 << 15;

pub const CLIENT_PORT: u16 = 68;
pub const SERVER_PORT: u16 = 67;

/// DHCP option codes this system knows about (RFC 2132).
pub mod opt {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS: u8 = 6;
    pub const HOST_NAME: u8 = 12;
    pub const DOMAIN_NAME: u8 = 15;
    pub const INTERFACE_MTU: u8 = 26;
    pub const BROADCAST_ADDRESS: u8 = 28;
    pub const NTP: u8 = 42;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_DURATION: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_IDENTIFIER: u8 = 54;
    pub const PARAMETER_REQUEST_LIST: u8 = 55;
    pub const MESSAGE: u8 = 56;
    pub const MAX_MESSAGE_SIZE: u8 = 57;
    pub const RENEWAL_DURATION: u8 = 58;
    pub const REBIND_DURATION: u8 = 59;
    pub const CLIENT_IDENTIFIER: u8 = 61;
    pub const END: u8 = 255;
}

/// The eight RFC 2131 message types this system emits or understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => return None,
        })
    }
}

/// A single `code, length, value` DHCP option.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Opt {
    pub code: u8,
    pub data: Vec<u8>,
}

impl Opt {
    pub fn new(code: u8, data: Vec<u8>) -> Self {
        Self { code, data }
    }

    pub fn u8(code: u8, v: u8) -> Self {
        Self::new(code, vec![v])
    }

    pub fn u16(code: u8, v: u16) -> Self {
        Self::new(code, v.to_be_bytes().to_vec())
    }

    pub fn u32(code: u8, v: u32) -> Self {
        Self::new(code, v.to_be_bytes().to_vec())
    }

    pub fn ipv4(code: u8, v: Ipv4Addr) -> Self {
        Self::new(code, v.octets().to_vec())
    }

    pub fn ipv4s(code: u8, vs: &[Ipv4Addr]) -> Self {
        let mut data = Vec::with_capacity(vs.len() * 4);
        for v in vs {
            data.extend_from_slice(&v.octets());
        }
        Self::new(code, data)
    }

    pub fn str(code: u8, s: &str) -> Self {
        Self::new(code, s.as_bytes().to_vec())
    }
}

/// A decoded or to-be-encoded DHCP message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub cookie: u32,
    pub options: Vec<Opt>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            op: OP_REQUEST,
            htype: HTYPE_ETHER,
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0; 16],
            sname: [0; 64],
            file: [0; 128],
            cookie: COOKIE,
            options: Vec::new(),
        }
    }
}

impl Message {
    /// A message built for a 6-byte Ethernet `chaddr`; the common case.
    pub fn for_mac(mac: [u8; 6]) -> Self {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(&mac);
        Self {
            chaddr,
            ..Default::default()
        }
    }

    pub fn mac(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.chaddr[..6]);
        mac
    }

    pub fn broadcast(&self) -> bool {
        self.flags & FLAG_BROADCAST != 0
    }

    /// Emits the 240-byte fixed header with exact offsets, followed by
    /// `code, len, data` for every option and a single 0xFF terminator if
    /// any options were present. Zero padding throughout.
    pub fn encode(&self) -> Vec<u8> {
        let mut b = vec![0u8; MIN_LEN];
        b[0] = self.op;
        b[1] = self.htype;
        b[2] = self.hlen;
        b[3] = self.hops;
        b[4..8].copy_from_slice(&self.xid.to_be_bytes());
        b[8..10].copy_from_slice(&self.secs.to_be_bytes());
        b[10..12].copy_from_slice(&self.flags.to_be_bytes());
        b[12..16].copy_from_slice(&self.ciaddr.octets());
        b[16..20].copy_from_slice(&self.yiaddr.octets());
        b[20..24].copy_from_slice(&self.siaddr.octets());
        b[24..28].copy_from_slice(&self.giaddr.octets());
        b[28..44].copy_from_slice(&self.chaddr);
        b[44..108].copy_from_slice(&self.sname);
        b[108..236].copy_from_slice(&self.file);
        b[236..240].copy_from_slice(&self.cookie.to_be_bytes());

        for o in &self.options {
            b.push(o.code);
            b.push(o.data.len() as u8);
            b.extend_from_slice(&o.data);
        }
        if !self.options.is_empty() {
            b.push(opt::END);
        }
        b
    }

    /// Refuses any buffer shorter than 240 bytes. Walks options from offset
    /// 240: skips `0x00`, terminates on `0xFF`, else reads a length byte and
    /// that many payload bytes, failing with [`Error::TruncatedOptions`] if
    /// that would overrun the buffer. The cookie is parsed but not validated
    /// here — callers decide whether to require the DHCP magic.
    pub fn decode(b: &[u8]) -> Result<Self, Error> {
        if b.len() < MIN_LEN {
            return Err(Error::DataUnderflow);
        }

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&b[28..44]);
        let mut sname = [0u8; 64];
        sname.copy_from_slice(&b[44..108]);
        let mut file = [0u8; 128];
        file.copy_from_slice(&b[108..236]);

        let mut msg = Self {
            op: b[0],
            htype: b[1],
            hlen: b[2],
            hops: b[3],
            xid: u32::from_be_bytes(b[4..8].try_into().unwrap()),
            secs: u16::from_be_bytes(b[8..10].try_into().unwrap()),
            flags: u16::from_be_bytes(b[10..12].try_into().unwrap()),
            ciaddr: Ipv4Addr::new(b[12], b[13], b[14], b[15]),
            yiaddr: Ipv4Addr::new(b[16], b[17], b[18], b[19]),
            siaddr: Ipv4Addr::new(b[20], b[21], b[22], b[23]),
            giaddr: Ipv4Addr::new(b[24], b[25], b[26], b[27]),
            chaddr,
            sname,
            file,
            cookie: u32::from_be_bytes(b[236..240].try_into().unwrap()),
            options: Vec::new(),
        };

        let mut c = MIN_LEN;
        while c < b.len() {
            let code = b[c];
            c += 1;
            if code == opt::PAD {
                continue;
            }
            if code == opt::END {
                break;
            }
            if c >= b.len() {
                return Err(Error::TruncatedOptions);
            }
            let len = b[c] as usize;
            c += 1;
            if c + len > b.len() {
                return Err(Error::TruncatedOptions);
            }
            msg.options.push(Opt::new(code, b[c..c + len].to_vec()));
            c += len;
        }

        Ok(msg)
    }

    /// Scans the options for a `message_type` (code 53), last one wins.
    pub fn message_type(&self) -> Option<MessageType> {
        self.options
            .iter()
            .rev()
            .find(|o| o.code == opt::MESSAGE_TYPE)
            .and_then(|o| o.data.first().copied())
            .and_then(MessageType::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        let mut m = Message::for_mac([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        m.op = OP_REQUEST;
        m.htype = HTYPE_ETHER;
        m.xid = 0xDEAD;
        m.cookie = COOKIE;
        m.options = vec![
            Opt::u8(opt::MESSAGE_TYPE, MessageType::Discover as u8),
            Opt::new(opt::CLIENT_IDENTIFIER, vec![1, 2, 3, 4, 5, 6]),
            Opt::u16(opt::MAX_MESSAGE_SIZE, 1500),
        ];
        m
    }

    // S6: round-trip a concrete encoded message.
    #[test]
    fn round_trips_s6() {
        let m = sample();
        let decoded = Message::decode(&m.encode()).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.message_type(), Some(MessageType::Discover));
    }

    // Invariant 1: codec round-trip, for a message with no options too.
    #[test]
    fn round_trips_without_options() {
        let m = Message::for_mac([9, 9, 9, 9, 9, 9]);
        let decoded = Message::decode(&m.encode()).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(
            Message::decode(&[0u8; 100]),
            Err(Error::DataUnderflow)
        ));
    }

    #[test]
    fn rejects_overrunning_option_length() {
        let mut raw = vec![0u8; MIN_LEN];
        raw.push(61); // client identifier
        raw.push(200); // claims 200 bytes of payload, buffer has none
        assert!(matches!(
            Message::decode(&raw),
            Err(Error::TruncatedOptions)
        ));
    }

    #[test]
    fn skips_padding_and_preserves_option_order() {
        let mut raw = vec![0u8; MIN_LEN];
        raw.push(opt::PAD);
        raw.push(opt::PAD);
        raw.push(opt::MESSAGE_TYPE);
        raw.push(1);
        raw.push(MessageType::Offer as u8);
        raw.push(opt::SERVER_IDENTIFIER);
        raw.push(4);
        raw.extend_from_slice(&[192, 168, 1, 1]);
        raw.push(opt::END);

        let m = Message::decode(&raw).unwrap();
        assert_eq!(m.options.len(), 2);
        assert_eq!(m.options[0].code, opt::MESSAGE_TYPE);
        assert_eq!(m.options[1].code, opt::SERVER_IDENTIFIER);
    }
}
