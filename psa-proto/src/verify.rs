//! Stateless predicate over a decoded reply: `{Pass, Fail, Nack}` per §4.4.
//! Each state on the client side calls a differently-parameterized flavor of
//! the same common checks.

use std::net::Ipv4Addr;
use std::time::Duration;

use psa_wire::message::{Message, MessageType};

use crate::{is_valid_unicast, DecodedOptions};

/// The outcome of checking a reply against the verifier for the state that
/// is currently waiting on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifyResult {
    Pass,
    Fail,
    Nack,
}

const MIN_LEASE: Duration = Duration::from_secs(60);

/// The checks common to every accepted reply, regardless of state: matching
/// xid/chaddr, a usable `yiaddr`, at least one router, a valid server
/// identifier, and a lease of at least 60s.
fn common_pass(msg: &Message, opts: &DecodedOptions, xid: u32, mac: [u8; 6]) -> bool {
    msg.xid == xid
        && msg.mac() == mac
        && is_valid_unicast(msg.yiaddr)
        && !opts.routers.is_empty()
        && opts
            .server_identifier
            .map(is_valid_unicast)
            .unwrap_or(false)
        && opts
            .ip_address_lease_duration()
            .map(|d| d >= MIN_LEASE)
            .unwrap_or(false)
}

/// Verifier for the Discovering state: any OFFER that passes the common
/// checks and carries a server identifier.
pub fn verify_offer(msg: &Message, opts: &DecodedOptions, xid: u32, mac: [u8; 6]) -> VerifyResult {
    if opts.message_type != Some(MessageType::Offer) {
        return VerifyResult::Fail;
    }
    if opts.server_identifier.is_none() {
        return VerifyResult::Fail;
    }
    if common_pass(msg, opts, xid, mac) {
        VerifyResult::Pass
    } else {
        VerifyResult::Fail
    }
}

/// Verifier shared by Selecting and Renewing: the ACK's `yiaddr` and
/// `server_identifier` must match the last OFFER's. A NAK is reported as
/// such rather than as a plain failure.
pub fn verify_ack(
    msg: &Message,
    opts: &DecodedOptions,
    xid: u32,
    mac: [u8; 6],
    last_yiaddr: Ipv4Addr,
    last_server_identifier: Ipv4Addr,
) -> VerifyResult {
    if opts.message_type == Some(MessageType::Nak) {
        return VerifyResult::Nack;
    }
    if opts.message_type != Some(MessageType::Ack) {
        return VerifyResult::Fail;
    }
    if msg.yiaddr != last_yiaddr {
        return VerifyResult::Fail;
    }
    if opts.server_identifier != Some(last_server_identifier) {
        return VerifyResult::Fail;
    }
    if common_pass(msg, opts, xid, mac) {
        VerifyResult::Pass
    } else {
        VerifyResult::Fail
    }
}

/// Verifier for Rebinding: identical to [`verify_ack`] except `yiaddr` alone
/// must match -- we deliberately accept a different server's identifier,
/// since we're rebinding precisely because we're willing to accept any
/// server's renewal of the lease.
pub fn verify_rebind_ack(
    msg: &Message,
    opts: &DecodedOptions,
    xid: u32,
    mac: [u8; 6],
    last_yiaddr: Ipv4Addr,
) -> VerifyResult {
    if opts.message_type == Some(MessageType::Nak) {
        return VerifyResult::Nack;
    }
    if opts.message_type != Some(MessageType::Ack) {
        return VerifyResult::Fail;
    }
    if msg.yiaddr != last_yiaddr {
        return VerifyResult::Fail;
    }
    if common_pass(msg, opts, xid, mac) {
        VerifyResult::Pass
    } else {
        VerifyResult::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psa_wire::message::opt;
    use psa_wire::message::Opt;

    const MAC: [u8; 6] = [1, 2, 3, 4, 5, 6];

    fn offer_msg(xid: u32, yiaddr: Ipv4Addr) -> (Message, DecodedOptions) {
        let mut m = Message::for_mac(MAC);
        m.xid = xid;
        m.yiaddr = yiaddr;
        m.options = vec![
            Opt::u8(opt::MESSAGE_TYPE, MessageType::Offer as u8),
            Opt::ipv4(opt::SERVER_IDENTIFIER, Ipv4Addr::new(192, 168, 9, 99)),
            Opt::ipv4(opt::ROUTER, Ipv4Addr::new(192, 168, 0, 1)),
            Opt::u32(opt::LEASE_DURATION, 60),
        ];
        let opts = DecodedOptions::decode(&m.options);
        (m, opts)
    }

    // S1: OFFER accept.
    #[test]
    fn s1_offer_accept() {
        let (m, opts) = offer_msg(0x33, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(verify_offer(&m, &opts, 0x33, MAC), VerifyResult::Pass);
    }

    // S2: ACK rejection on server-id mismatch.
    #[test]
    fn s2_ack_rejects_server_id_mismatch() {
        let mut m = Message::for_mac(MAC);
        m.xid = 0x33;
        m.yiaddr = Ipv4Addr::new(192, 168, 1, 1);
        m.options = vec![
            Opt::u8(opt::MESSAGE_TYPE, MessageType::Ack as u8),
            Opt::ipv4(opt::SERVER_IDENTIFIER, Ipv4Addr::new(192, 168, 100, 99)),
            Opt::ipv4(opt::ROUTER, Ipv4Addr::new(192, 168, 0, 1)),
            Opt::u32(opt::LEASE_DURATION, 60),
        ];
        let opts = DecodedOptions::decode(&m.options);
        let result = verify_ack(
            &m,
            &opts,
            0x33,
            MAC,
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 9, 99),
        );
        assert_eq!(result, VerifyResult::Fail);
    }

    // S3: NAK during renew.
    #[test]
    fn s3_nak_during_renew() {
        let mut m = Message::for_mac(MAC);
        m.xid = 0x33;
        m.options = vec![
            Opt::u8(opt::MESSAGE_TYPE, MessageType::Nak as u8),
            Opt::ipv4(opt::SERVER_IDENTIFIER, Ipv4Addr::new(192, 168, 9, 99)),
        ];
        let opts = DecodedOptions::decode(&m.options);
        let result = verify_ack(
            &m,
            &opts,
            0x33,
            MAC,
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 9, 99),
        );
        assert_eq!(result, VerifyResult::Nack);
    }

    #[test]
    fn rebind_ack_ignores_server_identifier_change() {
        let mut m = Message::for_mac(MAC);
        m.xid = 0x33;
        m.yiaddr = Ipv4Addr::new(192, 168, 1, 1);
        m.options = vec![
            Opt::u8(opt::MESSAGE_TYPE, MessageType::Ack as u8),
            Opt::ipv4(opt::SERVER_IDENTIFIER, Ipv4Addr::new(10, 0, 0, 5)),
            Opt::ipv4(opt::ROUTER, Ipv4Addr::new(192, 168, 0, 1)),
            Opt::u32(opt::LEASE_DURATION, 120),
        ];
        let opts = DecodedOptions::decode(&m.options);
        let result = verify_rebind_ack(&m, &opts, 0x33, MAC, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(result, VerifyResult::Pass);
    }

    #[test]
    fn fails_on_short_lease() {
        let (m, mut opts) = offer_msg(0x33, Ipv4Addr::new(192, 168, 1, 1));
        opts.ip_address_lease_duration_secs = Some(30);
        assert_eq!(verify_offer(&m, &opts, 0x33, MAC), VerifyResult::Fail);
    }
}
