//! The semantic view over a [`psa_wire::message::Opt`] list (distilled spec
//! §3's `DecodedOptions`), plus the reverse direction used by the server's
//! reply assembler and the client's templates.

use std::net::Ipv4Addr;
use std::time::Duration;

use psa_wire::message::{opt, MessageType, Opt};

use crate::duration_from_secs_opt;

/// Every DHCP option this system gives meaning to (distilled spec §3/§6).
/// A value that fails length validation is treated as absent -- it's simply
/// never set, rather than erroring the whole decode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedOptions {
    pub message_type: Option<MessageType>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Vec<Ipv4Addr>,
    pub dns: Vec<Ipv4Addr>,
    pub ntp: Vec<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub broadcast_address: Option<Ipv4Addr>,
    pub requested_ip: Option<Ipv4Addr>,
    pub server_identifier: Option<Ipv4Addr>,
    pub ip_address_lease_duration_secs: Option<u32>,
    pub renewal_duration_secs: Option<u32>,
    pub rebind_duration_secs: Option<u32>,
    pub interface_mtu: Option<u16>,
    pub client_identifier: Option<Vec<u8>>,
    pub max_message_size: Option<u16>,
    pub message: Option<String>,
    pub parameters_list: Option<Vec<u8>>,
    pub host_name: Option<String>,
}

impl DecodedOptions {
    pub fn ip_address_lease_duration(&self) -> Option<Duration> {
        duration_from_secs_opt(self.ip_address_lease_duration_secs)
    }

    pub fn renewal_duration(&self) -> Option<Duration> {
        duration_from_secs_opt(self.renewal_duration_secs)
    }

    pub fn rebind_duration(&self) -> Option<Duration> {
        duration_from_secs_opt(self.rebind_duration_secs)
    }

    /// Decodes the options found in a DHCP message's option list. Options
    /// are read in the order stored; a later duplicate silently overwrites
    /// an earlier one. Values of the wrong length are dropped, not errored.
    pub fn decode(options: &[Opt]) -> Self {
        let mut d = Self::default();

        for o in options {
            match o.code {
                opt::MESSAGE_TYPE => {
                    if let Some(&b) = o.data.first() {
                        if o.data.len() == 1 {
                            d.message_type = MessageType::from_u8(b);
                        }
                    }
                }
                opt::SUBNET_MASK => d.subnet_mask = ipv4(&o.data),
                opt::ROUTER => d.routers = ipv4_list(&o.data),
                opt::DNS => d.dns = ipv4_list(&o.data),
                opt::NTP => d.ntp = ipv4_list(&o.data),
                opt::DOMAIN_NAME => d.domain_name = utf8(&o.data),
                opt::BROADCAST_ADDRESS => d.broadcast_address = ipv4(&o.data),
                opt::REQUESTED_IP => d.requested_ip = ipv4(&o.data),
                opt::SERVER_IDENTIFIER => d.server_identifier = ipv4(&o.data),
                opt::LEASE_DURATION => d.ip_address_lease_duration_secs = u32_be(&o.data),
                opt::RENEWAL_DURATION => d.renewal_duration_secs = u32_be(&o.data),
                opt::REBIND_DURATION => d.rebind_duration_secs = u32_be(&o.data),
                opt::INTERFACE_MTU => d.interface_mtu = u16_be(&o.data),
                opt::CLIENT_IDENTIFIER => {
                    if o.data.len() >= 4 {
                        d.client_identifier = Some(o.data.clone());
                    }
                }
                opt::MAX_MESSAGE_SIZE => d.max_message_size = u16_be(&o.data),
                opt::MESSAGE => d.message = utf8(&o.data),
                opt::PARAMETER_REQUEST_LIST => d.parameters_list = Some(o.data.clone()),
                opt::HOST_NAME => d.host_name = utf8(&o.data),
                _ => {}
            }
        }

        d
    }
}

fn ipv4(b: &[u8]) -> Option<Ipv4Addr> {
    <[u8; 4]>::try_from(b).ok().map(Ipv4Addr::from)
}

fn ipv4_list(b: &[u8]) -> Vec<Ipv4Addr> {
    if b.is_empty() || b.len() % 4 != 0 {
        return Vec::new();
    }
    b.chunks_exact(4)
        .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
        .collect()
}

fn u16_be(b: &[u8]) -> Option<u16> {
    <[u8; 2]>::try_from(b).ok().map(u16::from_be_bytes)
}

fn u32_be(b: &[u8]) -> Option<u32> {
    <[u8; 4]>::try_from(b).ok().map(u32::from_be_bytes)
}

fn utf8(b: &[u8]) -> Option<String> {
    std::str::from_utf8(b).ok().map(|s| s.to_string())
}

/// The standard parameter request list this system asks for (subnet,
/// router, lease, server-id, DNS, domain, MTU, renewal, rebind).
pub fn default_parameter_request_list() -> Vec<u8> {
    vec![
        opt::SUBNET_MASK,
        opt::ROUTER,
        opt::LEASE_DURATION,
        opt::SERVER_IDENTIFIER,
        opt::DNS,
        opt::DOMAIN_NAME,
        opt::INTERFACE_MTU,
        opt::RENEWAL_DURATION,
        opt::REBIND_DURATION,
    ]
}

/// Assembles the server's reply options: lease duration, subnet mask, and
/// whichever of router/DNS/NTP/domain/hostname are set, for an OFFER or ACK.
#[allow(clippy::too_many_arguments)]
pub fn server_reply_options(
    message_type: MessageType,
    server_identifier: Ipv4Addr,
    lease_duration: Duration,
    subnet_mask: Ipv4Addr,
    router: Option<Ipv4Addr>,
    dns: &[Ipv4Addr],
    ntp: &[Ipv4Addr],
    domain: Option<&str>,
    hostname: Option<&str>,
) -> Vec<Opt> {
    let mut opts = vec![
        Opt::u8(opt::MESSAGE_TYPE, message_type as u8),
        Opt::ipv4(opt::SERVER_IDENTIFIER, server_identifier),
        Opt::u32(opt::LEASE_DURATION, lease_duration.as_secs() as u32),
        Opt::ipv4(opt::SUBNET_MASK, subnet_mask),
    ];
    if let Some(router) = router {
        opts.push(Opt::ipv4(opt::ROUTER, router));
    }
    if !dns.is_empty() {
        opts.push(Opt::ipv4s(opt::DNS, dns));
    }
    if !ntp.is_empty() {
        opts.push(Opt::ipv4s(opt::NTP, ntp));
    }
    if let Some(domain) = domain {
        opts.push(Opt::str(opt::DOMAIN_NAME, domain));
    }
    if let Some(hostname) = hostname {
        opts.push(Opt::str(opt::HOST_NAME, hostname));
    }
    opts
}

/// Assembles a NAK's (minimal) options.
pub fn server_nak_options(server_identifier: Ipv4Addr) -> Vec<Opt> {
    vec![
        Opt::u8(opt::MESSAGE_TYPE, MessageType::Nak as u8),
        Opt::ipv4(opt::SERVER_IDENTIFIER, server_identifier),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_options_and_drops_bad_lengths() {
        let opts = vec![
            Opt::u8(opt::MESSAGE_TYPE, MessageType::Offer as u8),
            Opt::ipv4(opt::SERVER_IDENTIFIER, Ipv4Addr::new(10, 0, 0, 1)),
            Opt::new(opt::SUBNET_MASK, vec![255, 255, 255]), // bad length, dropped
            Opt::ipv4s(
                opt::ROUTER,
                &[Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)],
            ),
            Opt::u32(opt::LEASE_DURATION, 3600),
        ];
        let d = DecodedOptions::decode(&opts);
        assert_eq!(d.message_type, Some(MessageType::Offer));
        assert_eq!(d.server_identifier, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(d.subnet_mask, None);
        assert_eq!(d.routers.len(), 2);
        assert_eq!(d.ip_address_lease_duration(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn last_duplicate_wins() {
        let opts = vec![
            Opt::ipv4(opt::SERVER_IDENTIFIER, Ipv4Addr::new(1, 1, 1, 1)),
            Opt::ipv4(opt::SERVER_IDENTIFIER, Ipv4Addr::new(2, 2, 2, 2)),
        ];
        let d = DecodedOptions::decode(&opts);
        assert_eq!(d.server_identifier, Some(Ipv4Addr::new(2, 2, 2, 2)));
    }
}
