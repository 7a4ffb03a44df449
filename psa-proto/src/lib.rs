//! Gives meaning to DHCP option bytes: the semantic [`DecodedOptions`] view,
//! the four client request templates, the reply verifier, and the ARP
//! prober both sides use to check an address is actually free.
//!
//! This only assembles/parses the *shape* `psa-wire` already knows about
//! (`Message`, `Opt`); it never touches a socket except in [`arp`], which
//! needs one to send/receive ARP probes.

use std::net::Ipv4Addr;
use std::time::Duration;

pub mod arp;
pub mod options;
pub mod templates;
pub mod verify;

pub use options::DecodedOptions;
pub use verify::VerifyResult;

/// Returns `true` for anything except the unspecified (`0.0.0.0`) and
/// broadcast (`255.255.255.255`) addresses -- a "valid unicast" IP check.
pub fn is_valid_unicast(ip: Ipv4Addr) -> bool {
    !ip.is_unspecified() && !ip.is_broadcast()
}

pub(crate) fn duration_from_secs_opt(v: Option<u32>) -> Option<Duration> {
    v.map(|s| Duration::from_secs(s as u64))
}
