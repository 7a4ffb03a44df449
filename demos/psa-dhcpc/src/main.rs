//! A standalone DHCP client: run it against one interface and it drives
//! that interface's address for as long as it has a process to live in.
//!
//! Usage: `psa-dhcpc <ifname> [callback-script]`
//!
//! Requires `CAP_NET_RAW`/`CAP_NET_ADMIN` (or root) to open the raw
//! sockets and to touch the interface's address and routes.

use std::path::PathBuf;
use std::process::ExitCode;

use log::error;

use psa_client::{Client, ClientConfig};
use psa_ifconfig::NetlinkApplier;

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));

    let mut args = std::env::args().skip(1);
    let Some(ifname) = args.next() else {
        eprintln!("usage: psa-dhcpc <ifname> [callback-script]");
        return ExitCode::FAILURE;
    };
    let script = args.next().map(PathBuf::from);

    match futures_lite::future::block_on(run(ifname, script)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("psa-dhcpc: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(ifname: String, script: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let ifindex = psa_net_std::index_of(&ifname)?;
    let mac = psa_net_std::hwaddr_of(&ifname)?;

    let applier = NetlinkApplier::new()?;
    let callback: Box<dyn Fn(Option<&psa_ifconfig::IfaceConfig>) + Send + Sync> = match script {
        Some(path) => {
            let cb = psa_client::ScriptCallback::new(path, ifname.clone());
            Box::new(move |conf| cb.invoke(conf))
        }
        None => Box::new(|_| {}),
    };

    let config = ClientConfig {
        ifindex,
        ifname,
        mac,
        configure_router: true,
        applier: Box::new(applier),
        callback,
    };

    let mut client = Client::new(config);
    client.run().await?;
    Ok(())
}
