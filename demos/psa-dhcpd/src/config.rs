//! The YAML shape a config file is parsed into before it's validated into
//! a [`psa_server::config::ServerConfig`]. This is the demo binary's own
//! concern, not `psa-server`'s -- the library only ever sees the already-
//! validated struct.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::Deserialize;

use psa_server::config::{ClientOverride, ServerConfig};

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub interface: String,
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    #[serde(default)]
    pub dynamic_range: Option<(Ipv4Addr, Ipv4Addr)>,
    pub lease_duration_secs: u64,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub router: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    #[serde(default)]
    pub ntp: Vec<Ipv4Addr>,
    #[serde(default)]
    pub static_only: bool,
    #[serde(default)]
    pub clients: Vec<FileClientOverride>,
}

#[derive(Debug, Deserialize)]
pub struct FileClientOverride {
    pub mac: String,
    #[serde(default)]
    pub ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub router: Option<Ipv4Addr>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    #[serde(default)]
    pub ntp: Vec<Ipv4Addr>,
}

pub fn read(path: &Path) -> Result<(String, ServerConfig), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let file: FileConfig = serde_yaml::from_str(&text)?;

    let clients = file
        .clients
        .into_iter()
        .map(|c| -> Result<ClientOverride, Box<dyn std::error::Error>> {
            Ok(ClientOverride {
                mac: parse_mac(&c.mac)?,
                ip: c.ip,
                router: c.router,
                hostname: c.hostname,
                dns: c.dns,
                ntp: c.ntp,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let config = ServerConfig::new(
        file.network,
        file.netmask,
        file.dynamic_range,
        std::time::Duration::from_secs(file.lease_duration_secs),
        file.domain,
        file.router,
        file.dns,
        file.ntp,
        file.static_only,
        clients,
    )?;

    Ok((file.interface, config))
}

fn parse_mac(s: &str) -> Result<[u8; 6], Box<dyn std::error::Error>> {
    let mut mac = [0u8; 6];
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(format!("{s:?} is not a MAC address").into());
    }
    for (i, part) in parts.iter().enumerate() {
        mac[i] = u8::from_str_radix(part, 16)?;
    }
    Ok(mac)
}
