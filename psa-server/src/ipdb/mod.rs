//! The address lifecycle table (distilled spec §4.7): tracks which IP each
//! known duid holds, hands out new dynamic addresses, and expires leases.
//! One [`std::sync::Mutex`] protects the whole table; every method takes it
//! for a short, non-yielding critical section, except [`Ipdb::find_ip`],
//! which takes and releases it several times rather than holding it across
//! the ARP probes it has to run in between (distilled spec §5's "one mutex"
//! requirement does not say the mutex is held across an await, and an ARP
//! probe can take up to 600ms -- holding a std mutex across that would
//! stall every other request the server is handling).

mod clients;
mod duid;
mod uip;

pub use clients::Entry;
pub use duid::Duid;
pub use uip::Uip;

use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use rand::seq::SliceRandom;

use psa_net::MacAddr;

use clients::Clients;

use crate::Error;

struct Inner {
    net_from: Uip,
    net_to: Uip,
    dyn_from: Uip,
    dyn_to: Uip,
    clients: Clients,
}

/// The dual-keyed client table plus the network/dynamic-range bookkeeping
/// around it, all behind one mutex.
pub struct Ipdb {
    inner: Mutex<Inner>,
}

impl Ipdb {
    /// Builds the table for `network`/`netmask`, with the dynamic range
    /// defaulting to the whole managed network.
    pub fn new(network: Ipv4Addr, netmask: Ipv4Addr) -> Result<Self, Error> {
        let (from, to) = from_to(network, netmask)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                net_from: from,
                net_to: to,
                dyn_from: from,
                dyn_to: to,
                clients: Clients::new(),
            }),
        })
    }

    /// Narrows the pool searched for dynamic leases to `[begin, end]`.
    pub fn set_dynamic_range(&self, begin: Ipv4Addr, end: Ipv4Addr) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let b = to_uip(inner.net_from, inner.net_to, begin)?;
        let e = to_uip(inner.net_from, inner.net_to, end)?;
        if b > e {
            return Err(Error::DynamicRangeInverted);
        }
        inner.dyn_from = b;
        inner.dyn_to = e;
        Ok(())
    }

    /// Disables dynamic searches; only pre-configured or still-live leases
    /// are served.
    pub fn disable_dynamic(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.dyn_from = Uip::ZERO;
        inner.dyn_to = Uip::ZERO;
    }

    pub fn lookup_by_duid(&self, duid: &Duid) -> Result<Ipv4Addr, Error> {
        let mut inner = self.inner.lock().unwrap();
        let (_, by_duid) = inner.clients.lookup(SystemTime::now(), Uip::ZERO, duid);
        by_duid.map(|e| e.uip.to_ipv4()).ok_or(Error::NoSuchClient)
    }

    /// Injects a client whose ip<>duid mapping never expires (its lease
    /// still can, and will be re-leased through [`Ipdb::update_client`]).
    pub fn add_permanent_client(&self, ip: Ipv4Addr, duid: Duid) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let n = to_uip(inner.net_from, inner.net_to, ip)?;
        inner.clients.inject_permanent(SystemTime::now(), n, duid)
    }

    /// Refreshes (or creates) a client's lease, good for `ttl` from now.
    pub fn update_client(&self, ip: Ipv4Addr, duid: Duid, ttl: Duration) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let n = to_uip(inner.net_from, inner.net_to, ip)?;
        let now = SystemTime::now();
        let until = now + ttl;

        // Optimistic path first -- most calls are a renewal of an already
        // tracked client.
        if inner.clients.set_lease(now, n, &duid, until).is_ok() {
            return Ok(());
        }
        inner.clients.inject(now, n, duid.clone(), until)?;
        inner.clients.set_lease(now, n, &duid, until)
    }

    pub fn in_managed_range(&self, ip: Ipv4Addr) -> bool {
        let inner = self.inner.lock().unwrap();
        to_uip(inner.net_from, inner.net_to, ip).is_ok()
    }

    /// Finds an IP for `duid`, biased towards `suggested` when it's free.
    /// If `duid` already holds a lease, that address is returned unchanged
    /// (a duid only ever holds one lease at a time). Otherwise searches the
    /// dynamic range in a random order, probing each untracked candidate
    /// with ARP before handing it out.
    pub async fn find_ip(
        &self,
        ifindex: u32,
        our_mac: MacAddr,
        src_ip: Ipv4Addr,
        requesting_client_mac: MacAddr,
        suggested: Option<Ipv4Addr>,
        duid: &Duid,
    ) -> Result<Ipv4Addr, Error> {
        let now = SystemTime::now();

        let (order, dyn_from, dyn_to) = {
            let mut inner = self.inner.lock().unwrap();

            let n = suggested
                .map(Uip::from_ipv4)
                .filter(|u| *u >= inner.net_from && *u <= inner.net_to)
                .unwrap_or(Uip::ZERO);

            let (by_ip, by_duid) = inner.clients.lookup(now, n, duid);
            if let Some(existing) = by_duid {
                return Ok(existing.uip.to_ipv4());
            }

            if inner.dyn_from == Uip::ZERO && inner.dyn_to == Uip::ZERO {
                return Err(Error::DynamicSearchDisabled);
            }

            let span = (inner.dyn_to - inner.dyn_from) as u64 + 1;
            let mut order: Vec<u32> = (0..span as u32).collect();
            order.shuffle(&mut rand::thread_rng());

            // Try the caller's suggested address first, if it wasn't
            // already somebody else's.
            if by_ip.is_none() {
                order.insert(0, n - inner.dyn_from);
            }

            (order, inner.dyn_from, inner.dyn_to)
        };

        for offset in order {
            let picked = dyn_from + offset;

            let occupied = {
                let mut inner = self.inner.lock().unwrap();
                inner.clients.by_ip(SystemTime::now(), picked).is_some()
            };
            if occupied || !picked.valid() {
                continue;
            }

            if psa_proto::arp::is_free(
                ifindex,
                our_mac,
                src_ip,
                picked.to_ipv4(),
                requesting_client_mac,
            )
            .await
            {
                return Ok(picked.to_ipv4());
            }
        }

        Err(Error::NoFreeIpFound)
    }
}

fn to_uip(net_from: Uip, net_to: Uip, ip: Ipv4Addr) -> Result<Uip, Error> {
    let n = Uip::from_ipv4(ip);
    if n < net_from || n > net_to {
        return Err(Error::IpNotInManagedRange);
    }
    Ok(n)
}

/// Derives `[net_from, net_to]` from a network address and netmask: the
/// first and last addresses in the range, nudged inward by one when the
/// computed bounds land exactly on the network/broadcast addresses (so the
/// default managed range never includes them).
fn from_to(network: Ipv4Addr, netmask: Ipv4Addr) -> Result<(Uip, Uip), Error> {
    let n = u32::from(network);
    let nm = u32::from(netmask);

    let start = n & nm;
    let end = start | !nm;

    if start != end {
        Ok((Uip(start + 1), Uip(end - 1)))
    } else {
        Ok((Uip(start), Uip(end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_to_excludes_network_and_broadcast() {
        let (from, to) = from_to(Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(255, 255, 255, 0)).unwrap();
        assert_eq!(from.to_ipv4(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(to.to_ipv4(), Ipv4Addr::new(192, 168, 1, 254));
    }

    #[test]
    fn from_to_single_host_network_keeps_both_bounds() {
        // A /32 has start == end; the nudge-inward branch must not fire,
        // or the range would invert.
        let (from, to) = from_to(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 255, 255, 255)).unwrap();
        assert_eq!(from.to_ipv4(), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(to.to_ipv4(), Ipv4Addr::new(10, 0, 0, 5));
    }

    // Invariant 7: managed-range membership.
    #[test]
    fn in_managed_range_respects_bounds() {
        let db = Ipdb::new(Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(255, 255, 255, 0)).unwrap();
        assert!(db.in_managed_range(Ipv4Addr::new(192, 168, 1, 100)));
        assert!(!db.in_managed_range(Ipv4Addr::new(192, 168, 2, 1)));
    }

    // Invariant 8: dynamic range must sit inside net_from..=net_to.
    #[test]
    fn set_dynamic_range_rejects_bounds_outside_network() {
        let db = Ipdb::new(Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(255, 255, 255, 0)).unwrap();
        assert!(db
            .set_dynamic_range(Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 2, 10))
            .is_err());
        assert!(db
            .set_dynamic_range(Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 5))
            .is_err());
        assert!(db
            .set_dynamic_range(Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 20))
            .is_ok());
    }

    #[test]
    fn disable_dynamic_zeroes_the_range() {
        let db = Ipdb::new(Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(255, 255, 255, 0)).unwrap();
        db.disable_dynamic();
        let inner = db.inner.lock().unwrap();
        assert_eq!(inner.dyn_from, Uip::ZERO);
        assert_eq!(inner.dyn_to, Uip::ZERO);
    }

    // Invariant 9: a duid already holding a lease keeps it through update_client.
    #[test]
    fn update_client_then_lookup_roundtrips() {
        let db = Ipdb::new(Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(255, 255, 255, 0)).unwrap();
        let duid = Duid(vec![1, 2, 3, 4]);
        db.update_client(Ipv4Addr::new(192, 168, 1, 50), duid.clone(), Duration::from_secs(3600))
            .unwrap();
        assert_eq!(db.lookup_by_duid(&duid).unwrap(), Ipv4Addr::new(192, 168, 1, 50));
    }

    #[test]
    fn add_permanent_client_then_lookup() {
        let db = Ipdb::new(Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(255, 255, 255, 0)).unwrap();
        let duid = Duid(vec![9, 9, 9, 9]);
        db.add_permanent_client(Ipv4Addr::new(192, 168, 1, 77), duid.clone()).unwrap();
        assert_eq!(db.lookup_by_duid(&duid).unwrap(), Ipv4Addr::new(192, 168, 1, 77));
    }
}
