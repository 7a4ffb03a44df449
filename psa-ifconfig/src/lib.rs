//! The artifact the client state machine produces at the Ifconfig state
//! ([`IfaceConfig`]), the [`Applier`] contract that enacts it, a real Linux
//! implementation of that contract on top of `rtnetlink` ([`NetlinkApplier`]),
//! and the small collaborators that sit just outside the core's scope: the
//! dhcpc-script environment record, the resolv.conf writer, and the
//! interface-up watcher/OUI table contracts.

mod applier;
mod env;
mod error;
mod ifconfig;
mod link;
mod netlink;
mod oui;
mod resolvconf;

pub use applier::Applier;
pub use env::{sanitize, PsaDhcpcEnv};
pub use error::Error;
pub use ifconfig::{classful_default_netmask, netmask_to_prefix_len, IfaceConfig};
pub use link::{LinkEvent, LinkWatcher};
pub use netlink::NetlinkApplier;
pub use oui::OuiTable;
pub use resolvconf::{LinuxResolvConfWriter, ResolvConfWriter};
