//! The four client request flavors (§4.3), sharing one option builder and
//! differing only in IP envelope, `ciaddr`, and a couple of per-flavor
//! options.

use std::net::Ipv4Addr;

use psa_wire::message::{opt, Message, MessageType, Opt, FLAG_BROADCAST};

use crate::options::default_parameter_request_list;

const MAX_MESSAGE_SIZE: u16 = 1500;

/// A built message plus the IP envelope (source/destination) it must be
/// sent with; `message.broadcast()` tells the caller whether the link-layer
/// send should target the broadcast MAC as well.
#[derive(Clone, Debug)]
pub struct Template {
    pub message: Message,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

fn common_options(mac: [u8; 6], message_type: MessageType) -> Vec<Opt> {
    let mut opts = vec![
        Opt::u8(opt::MESSAGE_TYPE, message_type as u8),
        Opt::new(opt::CLIENT_IDENTIFIER, psa_wire::duid_ll_from_mac(mac)),
        Opt::u16(opt::MAX_MESSAGE_SIZE, MAX_MESSAGE_SIZE),
        Opt::new(opt::PARAMETER_REQUEST_LIST, default_parameter_request_list()),
    ];
    if let Some(host_name) = os_hostname() {
        opts.push(Opt::str(opt::HOST_NAME, &host_name));
    }
    opts
}

fn base_message(xid: u32, mac: [u8; 6], secs: u16, message_type: MessageType) -> Message {
    let mut m = Message::for_mac(mac);
    m.xid = xid;
    m.secs = secs;
    m.options = common_options(mac, message_type);
    m
}

/// DISCOVER: broadcast from `0.0.0.0`, `ciaddr = 0`.
pub fn discover(xid: u32, mac: [u8; 6], secs: u16) -> Template {
    let mut message = base_message(xid, mac, secs, MessageType::Discover);
    message.flags |= FLAG_BROADCAST;
    Template {
        message,
        src: Ipv4Addr::UNSPECIFIED,
        dst: Ipv4Addr::BROADCAST,
    }
}

/// REQUEST (selecting): broadcast from `0.0.0.0`, carries `requested_ip`
/// and `server_identifier` so every server that offered can see which one
/// we picked.
pub fn request_selecting(
    xid: u32,
    mac: [u8; 6],
    secs: u16,
    requested_ip: Ipv4Addr,
    server_identifier: Ipv4Addr,
) -> Template {
    let mut message = base_message(xid, mac, secs, MessageType::Request);
    message.flags |= FLAG_BROADCAST;
    message
        .options
        .push(Opt::ipv4(opt::REQUESTED_IP, requested_ip));
    message
        .options
        .push(Opt::ipv4(opt::SERVER_IDENTIFIER, server_identifier));
    Template {
        message,
        src: Ipv4Addr::UNSPECIFIED,
        dst: Ipv4Addr::BROADCAST,
    }
}

/// REQUEST (renewing): unicast to the server we're leased from, from our
/// current IP; `ciaddr` set, broadcast flag clear.
pub fn request_renewing(
    xid: u32,
    mac: [u8; 6],
    secs: u16,
    client_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
) -> Template {
    let mut message = base_message(xid, mac, secs, MessageType::Request);
    message.ciaddr = client_ip;
    Template {
        message,
        src: client_ip,
        dst: server_ip,
    }
}

/// REQUEST (rebinding): broadcast from our current IP, `ciaddr` set,
/// broadcast flag set -- any server willing to renew may reply.
pub fn request_rebinding(xid: u32, mac: [u8; 6], secs: u16, client_ip: Ipv4Addr) -> Template {
    let mut message = base_message(xid, mac, secs, MessageType::Request);
    message.ciaddr = client_ip;
    message.flags |= FLAG_BROADCAST;
    Template {
        message,
        src: client_ip,
        dst: Ipv4Addr::BROADCAST,
    }
}

/// The local hostname, for the `host_name` option; absent if it can't be
/// read or isn't valid UTF-8.
pub fn os_hostname() -> Option<String> {
    let mut buf = vec![0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).ok().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01];

    #[test]
    fn discover_envelope_and_flags() {
        let t = discover(0x1234, MAC, 0);
        assert_eq!(t.src, Ipv4Addr::UNSPECIFIED);
        assert_eq!(t.dst, Ipv4Addr::BROADCAST);
        assert!(t.message.broadcast());
        assert_eq!(t.message.message_type(), Some(MessageType::Discover));
        assert!(t.message.options.iter().any(|o| o.code == opt::CLIENT_IDENTIFIER));
    }

    #[test]
    fn selecting_carries_requested_ip_and_server_id() {
        let t = request_selecting(
            1,
            MAC,
            0,
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 254),
        );
        let requested = t
            .message
            .options
            .iter()
            .find(|o| o.code == opt::REQUESTED_IP)
            .unwrap();
        assert_eq!(requested.data, Ipv4Addr::new(192, 168, 1, 1).octets());
    }

    #[test]
    fn renewing_is_unicast_with_ciaddr_set() {
        let t = request_renewing(
            1,
            MAC,
            0,
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 254),
        );
        assert!(!t.message.broadcast());
        assert_eq!(t.message.ciaddr, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(t.dst, Ipv4Addr::new(192, 168, 1, 254));
    }

    #[test]
    fn rebinding_is_broadcast_with_ciaddr_set() {
        let t = request_rebinding(1, MAC, 0, Ipv4Addr::new(192, 168, 1, 1));
        assert!(t.message.broadcast());
        assert_eq!(t.message.ciaddr, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(t.dst, Ipv4Addr::BROADCAST);
    }
}
