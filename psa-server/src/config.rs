//! Server-side configuration (distilled spec §6). A plain, pre-validated
//! struct a caller builds and hands to [`crate::handler::Handler`] -- the
//! config *source* (file format, CLI flags) is a collaborator's concern,
//! grounded on `lib/server/{config.go,leaseopts/leaseopts.go}`'s
//! `parseConfig`/`SetClientOverrides` validation, minus the protobuf
//! parsing those do (this crate never sees the wire config format).

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::Error;

const MIN_LEASE_DURATION: Duration = Duration::from_secs(60);

/// Per-client overrides keyed by MAC (distilled spec §6's `ClientConfig`):
/// a static IP and/or lease options that differ from the server defaults
/// for one specific client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOverride {
    pub mac: [u8; 6],
    pub ip: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub hostname: Option<String>,
    pub dns: Vec<Ipv4Addr>,
    pub ntp: Vec<Ipv4Addr>,
}

/// Validated server configuration. Built with [`ServerConfig::new`], which
/// checks the invariants `lib/server/config.go`'s `parseConfig` enforces at
/// startup (lease duration floor, dynamic range containment, no duplicate
/// client MACs).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub dynamic_range: Option<(Ipv4Addr, Ipv4Addr)>,
    pub lease_duration: Duration,
    pub domain: Option<String>,
    pub router: Option<Ipv4Addr>,
    pub dns: Vec<Ipv4Addr>,
    pub ntp: Vec<Ipv4Addr>,
    pub static_only: bool,
    pub clients: Vec<ClientOverride>,
}

impl ServerConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: Ipv4Addr,
        netmask: Ipv4Addr,
        dynamic_range: Option<(Ipv4Addr, Ipv4Addr)>,
        lease_duration: Duration,
        domain: Option<String>,
        router: Option<Ipv4Addr>,
        dns: Vec<Ipv4Addr>,
        ntp: Vec<Ipv4Addr>,
        static_only: bool,
        clients: Vec<ClientOverride>,
    ) -> Result<Self, Error> {
        if lease_duration < MIN_LEASE_DURATION {
            return Err(Error::LeaseDurationTooShort);
        }

        if let Some((begin, end)) = dynamic_range {
            let net = u32::from(network) & u32::from(netmask);
            let mask = u32::from(netmask);
            if u32::from(begin) & mask != net || u32::from(end) & mask != net {
                return Err(Error::DynamicRangeOutsideNetwork);
            }
        }

        let mut seen = std::collections::HashSet::new();
        for c in &clients {
            if !seen.insert(c.mac) {
                return Err(Error::DuplicateClientMac(c.mac));
            }
        }

        Ok(Self {
            network,
            netmask,
            dynamic_range,
            lease_duration,
            domain,
            router,
            dns,
            ntp,
            static_only,
            clients,
        })
    }

    pub fn override_for(&self, mac: [u8; 6]) -> Option<&ClientOverride> {
        self.clients.iter().find(|c| c.mac == mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(
        dynamic_range: Option<(Ipv4Addr, Ipv4Addr)>,
        lease_duration: Duration,
        clients: Vec<ClientOverride>,
    ) -> Result<ServerConfig, Error> {
        ServerConfig::new(
            Ipv4Addr::new(192, 168, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            dynamic_range,
            lease_duration,
            None,
            None,
            vec![],
            vec![],
            false,
            clients,
        )
    }

    #[test]
    fn rejects_lease_duration_under_a_minute() {
        assert!(base_config(None, Duration::from_secs(30), vec![]).is_err());
        assert!(base_config(None, Duration::from_secs(60), vec![]).is_ok());
    }

    #[test]
    fn rejects_dynamic_range_outside_network() {
        let outside = Some((Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 2, 10)));
        assert!(base_config(outside, Duration::from_secs(3600), vec![]).is_err());

        let inside = Some((Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 200)));
        assert!(base_config(inside, Duration::from_secs(3600), vec![]).is_ok());
    }

    #[test]
    fn rejects_duplicate_client_macs() {
        let mac = [1, 2, 3, 4, 5, 6];
        let clients = vec![
            ClientOverride {
                mac,
                ip: None,
                router: None,
                hostname: None,
                dns: vec![],
                ntp: vec![],
            },
            ClientOverride {
                mac,
                ip: None,
                router: None,
                hostname: None,
                dns: vec![],
                ntp: vec![],
            },
        ];
        assert!(base_config(None, Duration::from_secs(3600), clients).is_err());
    }
}
