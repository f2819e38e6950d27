//! Flat allocator over one bounded `[from, to]` interval.

use crate::errors::Error;
use crate::helpers::{addr_key, key_addr};
use crate::types::{AddressFamily, EntryLabels, IpRange};
use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct RangeAllocator {
    range: IpRange,
    claimed: BTreeMap<u128, EntryLabels>,
}

impl RangeAllocator {
    pub fn new(range: IpRange) -> Self {
        Self { range, claimed: BTreeMap::new() }
    }

    pub fn range(&self) -> &IpRange {
        &self.range
    }

    pub fn family(&self) -> AddressFamily {
        self.range.family()
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    pub fn get(&self, addr: &IpAddr) -> Option<&EntryLabels> {
        self.claimed.get(&addr_key(addr))
    }

    pub fn is_free(&self, addr: &IpAddr) -> bool {
        self.range.contains(addr) && self.get(addr).is_none()
    }

    /// Claim `addr`. Re-claiming by the same owner refreshes the labels.
    pub fn claim(&mut self, addr: &IpAddr, labels: EntryLabels) -> Result<(), Error> {
        if !self.range.contains(addr) {
            return Err(Error::NestingViolation(format!(
                "{addr} is outside range {}",
                self.range
            )));
        }
        let key = addr_key(addr);
        if let Some(existing) = self.claimed.get(&key) {
            if !existing.is_owned_by(&labels) {
                return Err(Error::OwnershipConflict {
                    prefix: addr.to_string(),
                    claim: existing.claim_name.clone(),
                    owner: existing.owner.to_string(),
                });
            }
        }
        self.claimed.insert(key, labels);
        Ok(())
    }

    pub fn release(&mut self, addr: &IpAddr) -> Option<EntryLabels> {
        self.claimed.remove(&addr_key(addr))
    }

    /// First unclaimed address in interval order.
    pub fn find_free(&self) -> Option<IpAddr> {
        let from = addr_key(&self.range.from);
        let to = addr_key(&self.range.to);
        let step = match self.family() {
            AddressFamily::Ipv4 => 1u128 << 96,
            AddressFamily::Ipv6 => 1,
        };
        let mut candidate = from;
        for key in self.claimed.range(from..=to).map(|(k, _)| *k) {
            if key != candidate {
                break;
            }
            if candidate == to {
                return None;
            }
            candidate += step;
        }
        Some(key_addr(self.family(), candidate))
    }

    pub fn members(&self) -> Vec<(IpAddr, EntryLabels)> {
        self.claimed
            .iter()
            .map(|(k, l)| (key_addr(self.family(), *k), l.clone()))
            .collect()
    }

    /// Addresses held by the owner of `labels`.
    pub fn owned_by(&self, labels: &EntryLabels) -> Vec<IpAddr> {
        self.claimed
            .iter()
            .filter(|(_, l)| l.is_owned_by(labels))
            .map(|(k, _)| key_addr(self.family(), *k))
            .collect()
    }

    /// Rewrite every member's labels in place.
    pub fn relabel(&mut self, mut f: impl FnMut(&mut EntryLabels)) {
        for labels in self.claimed.values_mut() {
            f(labels);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockKind, ClaimShape, OwnerRef};

    fn labels(name: &str) -> EntryLabels {
        EntryLabels {
            claim_name: name.to_string(),
            claim_uid: String::new(),
            block_kind: BlockKind::Other,
            shape: ClaimShape::Address,
            family: AddressFamily::Ipv4,
            subnet: None,
            default_gateway: false,
            owner: OwnerRef { name: name.to_string(), ..Default::default() },
            user: Default::default(),
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn find_free_fills_gaps_in_order() {
        let mut r = RangeAllocator::new("10.0.0.10-10.0.0.13".parse().unwrap());
        assert_eq!(r.find_free(), Some(ip("10.0.0.10")));
        r.claim(&ip("10.0.0.10"), labels("a")).unwrap();
        r.claim(&ip("10.0.0.12"), labels("b")).unwrap();
        assert_eq!(r.find_free(), Some(ip("10.0.0.11")));
        r.claim(&ip("10.0.0.11"), labels("c")).unwrap();
        r.claim(&ip("10.0.0.13"), labels("d")).unwrap();
        assert_eq!(r.find_free(), None);
        r.release(&ip("10.0.0.12"));
        assert!(r.is_free(&ip("10.0.0.12")));
        assert_eq!(r.find_free(), Some(ip("10.0.0.12")));
    }

    #[test]
    fn claim_checks_bounds_and_owner() {
        let mut r = RangeAllocator::new("10.0.0.10-10.0.0.20".parse().unwrap());
        assert!(matches!(
            r.claim(&ip("10.0.0.9"), labels("a")),
            Err(Error::NestingViolation(_))
        ));
        r.claim(&ip("10.0.0.15"), labels("a")).unwrap();
        r.claim(&ip("10.0.0.15"), labels("a")).unwrap();
        assert!(matches!(
            r.claim(&ip("10.0.0.15"), labels("b")),
            Err(Error::OwnershipConflict { .. })
        ));
        assert_eq!(r.owned_by(&labels("a")), vec![ip("10.0.0.15")]);
    }

    #[test]
    fn ipv6_steps_by_one() {
        let mut r = RangeAllocator::new("2001:db8::1-2001:db8::3".parse().unwrap());
        r.claim(&ip("2001:db8::1"), labels("a")).unwrap();
        assert_eq!(r.find_free(), Some(ip("2001:db8::2")));
    }
}
