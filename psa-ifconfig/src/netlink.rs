//! A real [`Applier`] against the kernel, built on `rtnetlink`. Because
//! `rtnetlink` needs a tokio reactor and the rest of the workspace runs on
//! `async-io`, the netlink work happens on a dedicated thread with its own
//! single-threaded tokio runtime; [`NetlinkApplier`]'s public API is plain
//! blocking calls over a channel, so callers never have to touch tokio.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::mpsc;
use std::thread;

use futures_util::TryStreamExt;
use netlink_packet_route::address::AddressAttribute;
use netlink_packet_route::link::LinkAttribute;
use netlink_packet_route::route::{RouteAttribute, RouteMessage};
use rtnetlink::{new_connection, Handle, IpVersion};

#[cfg(feature = "log")]
use log::{debug, warn};

use crate::{Applier, Error, IfaceConfig};

enum Job {
    Apply(Box<IfaceConfig>, mpsc::Sender<Result<(), Error>>),
    Unconfigure(String, mpsc::Sender<Result<(), Error>>),
}

/// A [`Applier`] that enacts `IfaceConfig` changes through the kernel's
/// netlink route API.
pub struct NetlinkApplier {
    tx: mpsc::Sender<Job>,
    _worker: thread::JoinHandle<()>,
}

impl NetlinkApplier {
    /// Spawns the background thread and its tokio runtime. The thread exits
    /// once every clone of the returned handle is dropped.
    pub fn new() -> Result<Self, Error> {
        let (tx, rx) = mpsc::channel::<Job>();

        let worker = thread::Builder::new()
            .name("psa-netlink".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(_e) => {
                        #[cfg(feature = "log")]
                        warn!("netlink worker failed to start its tokio runtime: {_e}");
                        return;
                    }
                };

                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Apply(cfg, reply) => {
                            let _ = reply.send(rt.block_on(apply_config(&cfg)));
                        }
                        Job::Unconfigure(ifname, reply) => {
                            let _ = reply.send(rt.block_on(unconfigure_iface(&ifname)));
                        }
                    }
                }
            })
            .map_err(Error::Io)?;

        Ok(Self {
            tx,
            _worker: worker,
        })
    }
}

impl Applier for NetlinkApplier {
    fn apply(&self, config: &IfaceConfig) -> Result<(), Error> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Job::Apply(Box::new(config.clone()), reply_tx))
            .map_err(|_| Error::WorkerGone)?;
        reply_rx.recv().map_err(|_| Error::WorkerGone)?
    }

    fn unconfigure(&self, ifname: &str) -> Result<(), Error> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Job::Unconfigure(ifname.to_string(), reply_tx))
            .map_err(|_| Error::WorkerGone)?;
        reply_rx.recv().map_err(|_| Error::WorkerGone)?
    }
}

async fn apply_config(cfg: &IfaceConfig) -> Result<(), Error> {
    let (connection, handle, _) = new_connection()?;
    tokio::spawn(connection);

    let prefix_len = cfg.prefix_len().unwrap_or(32);

    remove_addresses(&handle, cfg.ifindex, &cfg.ifname).await?;

    handle
        .address()
        .add(cfg.ifindex, IpAddr::V4(cfg.address), prefix_len)
        .execute()
        .await?;

    #[cfg(feature = "log")]
    debug!("{}: address set to {}/{}", cfg.ifname, cfg.address, prefix_len);

    if let Some(mtu) = cfg.mtu {
        if link_mtu(&handle, cfg.ifindex).await? != Some(mtu as u32) {
            handle
                .link()
                .set(cfg.ifindex)
                .mtu(mtu as u32)
                .execute()
                .await?;
        }
    }

    reconcile_default_route(&handle, cfg.ifindex, cfg.router).await?;

    Ok(())
}

async fn unconfigure_iface(ifname: &str) -> Result<(), Error> {
    let (connection, handle, _) = new_connection()?;
    tokio::spawn(connection);

    let ifindex = match handle
        .link()
        .get()
        .match_name(ifname.to_string())
        .execute()
        .try_next()
        .await?
    {
        Some(link) => link.header.index,
        None => return Ok(()),
    };

    remove_addresses(&handle, ifindex, ifname).await?;
    reconcile_default_route(&handle, ifindex, None).await?;

    Ok(())
}

/// Removes every IPv4 address on `ifindex` whose label is exactly `ifname`
/// (not an alias like `ifname:0`).
async fn remove_addresses(handle: &Handle, ifindex: u32, ifname: &str) -> Result<(), Error> {
    let mut addresses = handle.address().get().set_link_index_filter(ifindex).execute();

    while let Some(addr) = addresses.try_next().await? {
        let label = addr.attributes.iter().find_map(|a| match a {
            AddressAttribute::Label(label) => Some(label.clone()),
            _ => None,
        });

        if label.as_deref().unwrap_or(ifname) == ifname {
            handle.address().del(addr).execute().await?;
        }
    }

    Ok(())
}

async fn link_mtu(handle: &Handle, ifindex: u32) -> Result<Option<u32>, Error> {
    let link = handle
        .link()
        .get()
        .match_index(ifindex)
        .execute()
        .try_next()
        .await?;

    Ok(link.and_then(|link| {
        link.attributes.iter().find_map(|a| match a {
            LinkAttribute::Mtu(mtu) => Some(*mtu),
            _ => None,
        })
    }))
}

fn route_output_interface(route: &RouteMessage) -> Option<u32> {
    route.attributes.iter().find_map(|a| match a {
        RouteAttribute::Oif(idx) => Some(*idx),
        _ => None,
    })
}

fn route_gateway(route: &RouteMessage) -> Option<Ipv4Addr> {
    route.attributes.iter().find_map(|a| match a {
        RouteAttribute::Gateway(IpAddr::V4(gw)) => Some(*gw),
        _ => None,
    })
}

/// If `router` differs from the currently installed default route out of
/// `ifindex`, removes the old one (if any) and installs the new one; if
/// they already agree, leaves it alone (§4.9).
async fn reconcile_default_route(
    handle: &Handle,
    ifindex: u32,
    router: Option<Ipv4Addr>,
) -> Result<(), Error> {
    let mut routes = handle.route().get(IpVersion::V4).execute();

    let mut existing = None;
    while let Some(route) = routes.try_next().await? {
        if route.header.destination_prefix_length == 0
            && route_output_interface(&route) == Some(ifindex)
        {
            existing = Some(route);
            break;
        }
    }

    let existing_gateway = existing.as_ref().and_then(route_gateway);

    if existing_gateway == router {
        return Ok(());
    }

    if let Some(route) = existing {
        handle.route().del(route).execute().await?;
    }

    if let Some(router) = router {
        handle
            .route()
            .add()
            .v4()
            .gateway(router)
            .output_interface(ifindex)
            .execute()
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_builds_a_worker_without_panicking() {
        let applier = NetlinkApplier::new();
        assert!(applier.is_ok());
    }
}
