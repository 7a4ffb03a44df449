//! A standalone DHCP server: run it with a YAML config file naming the
//! network it hands out addresses for.
//!
//! Usage: `psa-dhcpd <config.yaml>`
//!
//! Requires `CAP_NET_RAW` (or root) to open the raw sockets.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, warn};

use psa_server::Handler;

mod config;

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: psa-dhcpd <config.yaml>");
        return ExitCode::FAILURE;
    };

    match futures_lite::future::block_on(run(PathBuf::from(path))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("psa-dhcpd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let (ifname, server_config) = config::read(&path)?;

    let ifindex = psa_net_std::index_of(&ifname)?;
    let our_mac = psa_net_std::hwaddr_of(&ifname)?;
    let self_ip = server_config.router.unwrap_or(server_config.network);

    let handler = Handler::new(ifindex, our_mac, self_ip, server_config)?;

    let mut sock = psa_net_std::get_ip_recv_sock(ifindex).await?;
    let mut buf = [0u8; 1500];

    loop {
        let (n, _src_mac) = match psa_net::RawReceive::receive(&mut sock, &mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!("recv failed: {e}");
                continue;
            }
        };

        let Ok(Some((src, dst, payload))) = psa_wire::ip_udp_decode(
            &buf[..n],
            None,
            Some(std::net::SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, psa_wire::message::SERVER_PORT)),
        ) else {
            continue;
        };

        let Ok(msg) = psa_wire::message::Message::decode(payload) else {
            continue;
        };

        handler.handle_msg(*src.ip(), *dst.ip(), &msg).await;
    }
}
