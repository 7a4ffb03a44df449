//! The dual-keyed client table (distilled spec §4.7): every live entry is
//! reachable by either its `Uip` or its `Duid`, and both keys always resolve
//! to the same logical record. Modeled as an arena of entries plus two
//! `String -> index` indexes rather than cloning the record into two map
//! slots (distilled spec §9's design note) -- an update through one key is
//! visible through the other because there is only ever one copy.
//!
//! This type does no locking of its own; [`super::Ipdb`] wraps it in the
//! one mutex the whole table shares.

use std::collections::HashMap;
use std::time::SystemTime;

use super::duid::Duid;
use super::uip::Uip;
use crate::Error;

/// One client's binding: its IP, its identifier, and when the lease (if
/// any) expires. `permanent` entries never expire from the map even once
/// `leased_until` is in the past.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub uip: Uip,
    pub duid: Duid,
    pub leased_until: SystemTime,
    pub permanent: bool,
}

impl Entry {
    fn expired(&self, now: SystemTime) -> bool {
        !self.permanent && now > self.leased_until
    }
}

#[derive(Default)]
pub(crate) struct Clients {
    entries: Vec<Option<Entry>>,
    by_ip: HashMap<String, usize>,
    by_duid: HashMap<String, usize>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `key` in `by_ip` (if `is_ip`) or `by_duid`, lazily removing
    /// and forgetting an expired non-permanent entry found along the way.
    fn resolve(&mut self, now: SystemTime, is_ip: bool, key: &str) -> Option<usize> {
        let idx = if is_ip {
            self.by_ip.get(key).copied()
        } else {
            self.by_duid.get(key).copied()
        }?;

        match &self.entries[idx] {
            Some(e) if e.expired(now) => {
                self.remove_index(idx);
                None
            }
            Some(_) => Some(idx),
            None => None,
        }
    }

    fn remove_index(&mut self, idx: usize) {
        if let Some(entry) = self.entries[idx].take() {
            self.by_ip.remove(&entry.uip.to_string());
            self.by_duid.remove(&entry.duid.to_string());
        }
    }

    /// Consults both keys; on access to an expired non-permanent entry,
    /// removes it. Returns either or both matches (they may be the same
    /// entry).
    pub fn lookup(&mut self, now: SystemTime, uip: Uip, duid: &Duid) -> (Option<Entry>, Option<Entry>) {
        let ip_key = uip.to_string();
        let duid_key = duid.to_string();

        let idx_ip = self.resolve(now, true, &ip_key);
        let idx_duid = self.resolve(now, false, &duid_key);

        (
            idx_ip.and_then(|i| self.entries[i].clone()),
            idx_duid.and_then(|i| self.entries[i].clone()),
        )
    }

    fn inject_internal(
        &mut self,
        now: SystemTime,
        uip: Uip,
        duid: Duid,
        leased_until: SystemTime,
        permanent: bool,
    ) -> Result<(), Error> {
        let (by_ip, by_duid) = self.lookup(now, uip, &duid);
        if by_ip.is_some() {
            return Err(Error::IpAlreadyBound(uip));
        }
        if by_duid.is_some() {
            return Err(Error::DuidAlreadyBound(duid));
        }

        let idx = self.entries.len();
        self.by_ip.insert(uip.to_string(), idx);
        self.by_duid.insert(duid.to_string(), idx);
        self.entries.push(Some(Entry {
            uip,
            duid,
            leased_until,
            permanent,
        }));

        Ok(())
    }

    pub fn inject_permanent(&mut self, now: SystemTime, uip: Uip, duid: Duid) -> Result<(), Error> {
        self.inject_internal(now, uip, duid, SystemTime::UNIX_EPOCH, true)
    }

    pub fn inject(
        &mut self,
        now: SystemTime,
        uip: Uip,
        duid: Duid,
        leased_until: SystemTime,
    ) -> Result<(), Error> {
        self.inject_internal(now, uip, duid, leased_until, false)
    }

    /// Fails unless both keys resolve, and resolve to the *same* entry.
    pub fn set_lease(
        &mut self,
        now: SystemTime,
        uip: Uip,
        duid: &Duid,
        leased_until: SystemTime,
    ) -> Result<(), Error> {
        let ip_key = uip.to_string();
        let duid_key = duid.to_string();

        let idx_ip = self.resolve(now, true, &ip_key).ok_or(Error::NoSuchLease)?;
        let idx_duid = self.resolve(now, false, &duid_key).ok_or(Error::NoSuchLease)?;
        if idx_ip != idx_duid {
            return Err(Error::IpDuidMismatch);
        }

        if let Some(entry) = self.entries[idx_ip].as_mut() {
            entry.leased_until = leased_until;
        }
        Ok(())
    }

    pub fn expire(&mut self, now: SystemTime, uip: Uip, duid: &Duid) -> Result<(), Error> {
        self.set_lease(now, uip, duid, SystemTime::UNIX_EPOCH)
    }

    /// Looks an entry up by its IP alone, ignoring any duid -- the free-IP
    /// search uses this to ask "is this candidate already somebody's",
    /// without a duid to compare against.
    pub fn by_ip(&mut self, now: SystemTime, uip: Uip) -> Option<Entry> {
        let key = uip.to_string();
        self.resolve(now, true, &key).and_then(|i| self.entries[i].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn uip(n: u32) -> Uip {
        Uip(n)
    }

    fn duid(n: u8) -> Duid {
        Duid(vec![n, n, n, n])
    }

    // Invariant 4: IPDB dual-key consistency.
    #[test]
    fn lookup_by_either_key_returns_same_entry() {
        let mut c = Clients::new();
        let now = SystemTime::now();
        c.inject(now, uip(1), duid(1), now + Duration::from_secs(3600)).unwrap();

        let (by_ip, by_duid) = c.lookup(now, uip(1), &duid(1));
        assert_eq!(by_ip, by_duid);
        assert!(by_ip.is_some());
    }

    // Invariant 5: permanent immortality.
    #[test]
    fn permanent_entry_survives_far_future_lookup() {
        let mut c = Clients::new();
        let now = SystemTime::now();
        c.inject_permanent(now, uip(1), duid(1)).unwrap();

        let far_future = now + Duration::from_secs(1_000_000_000);
        let (by_ip, _) = c.lookup(far_future, uip(1), &Duid(vec![]));
        assert!(by_ip.is_some());
    }

    // Invariant 6: lazy expiration removes the entry as a side effect.
    #[test]
    fn expired_entry_is_removed_on_lookup() {
        let mut c = Clients::new();
        let now = SystemTime::now();
        c.inject(now, uip(9), duid(9), now + Duration::from_secs(100)).unwrap();

        let later = now + Duration::from_secs(101);
        let (by_ip, _) = c.lookup(later, uip(9), &Duid(vec![]));
        assert!(by_ip.is_none());

        // S5: a subsequent inject for the same keys now succeeds.
        assert!(c
            .inject(later, uip(9), duid(9), later + Duration::from_secs(100))
            .is_ok());
    }

    // S4: dual-key inject collision.
    #[test]
    fn inject_collision_on_either_key_fails() {
        let mut c = Clients::new();
        let now = SystemTime::now();
        c.inject(now, uip(1), duid(1), now + Duration::from_secs(3600)).unwrap();

        assert!(c.inject(now, uip(1), duid(2), now + Duration::from_secs(3600)).is_err());
        assert!(c.inject(now, uip(2), duid(1), now + Duration::from_secs(3600)).is_err());
        assert!(c.inject(now, uip(9), duid(99), now + Duration::from_secs(3600)).is_ok());
    }

    #[test]
    fn set_lease_requires_both_keys_to_agree_on_the_same_entry() {
        let mut c = Clients::new();
        let now = SystemTime::now();
        c.inject(now, uip(1), duid(1), now + Duration::from_secs(10)).unwrap();
        c.inject(now, uip(2), duid(2), now + Duration::from_secs(10)).unwrap();

        // uip(1) resolves to a different entry than duid(2).
        assert!(c.set_lease(now, uip(1), &duid(2), now + Duration::from_secs(20)).is_err());
        assert!(c.set_lease(now, uip(1), &duid(1), now + Duration::from_secs(20)).is_ok());
    }
}
