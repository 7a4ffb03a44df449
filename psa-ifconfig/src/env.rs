//! The `PSA_DHCPC_*` environment record exported to the configured script
//! after each significant change, and to the resolv.conf updater (§6).

use std::net::Ipv4Addr;

use crate::IfaceConfig;

/// Replaces any byte outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The full set of `PSA_DHCPC_*` variables exported to the script and to
/// the resolv.conf writer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PsaDhcpcEnv {
    pub interface: String,
    pub ipv4_router: Option<Ipv4Addr>,
    pub ipv4_address: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub dns_list: Vec<Ipv4Addr>,
    pub mtu: Option<u16>,
    pub lease_sec: Option<u64>,
}

impl PsaDhcpcEnv {
    /// Builds the record for a freshly-applied configuration.
    pub fn from_config(ifname: &str, config: &IfaceConfig) -> Self {
        Self {
            interface: ifname.to_string(),
            ipv4_router: config.router,
            ipv4_address: Some(config.address),
            netmask: Some(config.netmask),
            domain_name: config.domain_name.clone(),
            dns_list: config.dns.clone(),
            mtu: config.mtu,
            lease_sec: Some(config.lease_duration.as_secs()),
        }
    }

    /// The record for an unconfigure event: only the interface name is set.
    pub fn unconfigured(ifname: &str) -> Self {
        Self {
            interface: ifname.to_string(),
            ..Default::default()
        }
    }

    /// Renders as `PSA_DHCPC_KEY=sanitized_value` pairs, suitable for a
    /// child process's environment.
    pub fn to_env_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("PSA_DHCPC_INTERFACE".into(), sanitize(&self.interface))];

        if let Some(router) = self.ipv4_router {
            pairs.push(("PSA_DHCPC_IPV4_ROUTER".into(), sanitize(&router.to_string())));
        }
        if let Some(address) = self.ipv4_address {
            pairs.push((
                "PSA_DHCPC_IPV4_ADDRESS".into(),
                sanitize(&address.to_string()),
            ));
        }
        if let Some(netmask) = self.netmask {
            pairs.push(("PSA_DHCPC_NETMASK".into(), sanitize(&netmask.to_string())));
        }
        if let Some(domain) = &self.domain_name {
            pairs.push(("PSA_DHCPC_DOMAIN_NAME".into(), sanitize(domain)));
        }
        if !self.dns_list.is_empty() {
            let joined = self
                .dns_list
                .iter()
                .map(|a| sanitize(&a.to_string()))
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("PSA_DHCPC_DNS_LIST".into(), joined));
        }
        if let Some(mtu) = self.mtu {
            pairs.push(("PSA_DHCPC_MTU".into(), mtu.to_string()));
        }
        if let Some(lease_sec) = self.lease_sec {
            pairs.push(("PSA_DHCPC_LEASE_SEC".into(), lease_sec.to_string()));
        }

        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_disallowed_bytes() {
        assert_eq!(sanitize("eth0"), "eth0");
        assert_eq!(sanitize("example.com"), "example.com");
        assert_eq!(sanitize("a b;c"), "a_b_c");
    }

    #[test]
    fn env_pairs_include_dns_list_comma_joined() {
        let env = PsaDhcpcEnv {
            interface: "eth0".into(),
            dns_list: vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            ..Default::default()
        };
        let pairs = env.to_env_pairs();
        assert!(pairs
            .iter()
            .any(|(k, v)| k == "PSA_DHCPC_DNS_LIST" && v == "8.8.8.8,8.8.4.4"));
    }
}
