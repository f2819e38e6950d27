use super::{candidates, check_nesting, commit_address, delete_entries, owned_address, range_piece, Applicator, Placement};
use crate::errors::{Error, Result};
use crate::helpers::{family_bits, host_net};
use crate::instance::InstanceState;
use crate::selector::Selector;
use crate::types::*;
use log::{debug, info};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// The first free address in a selector-matched network, pool or range.
pub struct DynamicAddressApplicator {
    selector: Selector,
}

impl DynamicAddressApplicator {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }

    fn hosts_addresses(parent: &Entry) -> bool {
        match parent.labels.shape {
            ClaimShape::Range => true,
            ClaimShape::Prefix => {
                matches!(parent.labels.block_kind, BlockKind::Network | BlockKind::Pool)
            }
            ClaimShape::Address => false,
        }
    }

    fn eligible(&self, claim: &Claim, parent: &Entry) -> bool {
        Self::hosts_addresses(parent)
            && self.selector.matches(&parent.labels.to_map())
            && claim.spec.family.map_or(true, |f| f == parent.labels.family)
    }

    /// The address recorded in status, if still free and still under a
    /// qualifying block.
    fn reconfirm(&self, state: &InstanceState, claim: &Claim) -> Option<(IpAddr, Placement)> {
        let lit: AddressLiteral = claim.status.address.as_deref()?.parse().ok()?;
        let addr = lit.addr;
        let hn = host_net(addr);
        let exact = state.trie.get(&hn).map(|l| Entry::new(hn, l.clone()));
        let parent = match exact {
            Some(e) if e.labels.shape == ClaimShape::Range => e,
            Some(_) => return None,
            None => state.trie.most_specific_parent(&hn)?,
        };
        if !self.eligible(claim, &parent) {
            return None;
        }
        if parent.labels.shape == ClaimShape::Range {
            let alloc = state.ranges.get(&parent.labels.claim_name)?;
            return alloc.is_free(&addr).then_some((addr, Placement::Range { range: parent }));
        }
        Some((addr, Placement::Trie { parent }))
    }

    /// A matched block that may hand out addresses to `claim`.
    fn usable(claim: &Claim, parent: &Entry) -> bool {
        match parent.labels.shape {
            ClaimShape::Range => true,
            _ => {
                Self::hosts_addresses(parent)
                    && check_nesting(parent, &claim.entry_labels(ClaimShape::Address, parent.labels.family), "address")
                        .is_ok()
            }
        }
    }

    fn search(&self, state: &InstanceState, claim: &Claim) -> Result<(IpAddr, Placement)> {
        let mut seen_ranges = BTreeSet::new();
        let mut considered = 0usize;
        for parent in candidates(state, claim, &self.selector) {
            if !Self::hosts_addresses(&parent) {
                continue;
            }
            let shape = parent.labels.shape;
            match shape {
                ClaimShape::Range => {
                    let name = parent.labels.claim_name.clone();
                    if !seen_ranges.insert(name.clone()) {
                        continue;
                    }
                    considered += 1;
                    let Some(addr) = state.ranges.get(&name).and_then(|r| r.find_free()) else {
                        continue;
                    };
                    if let Some(range) = range_piece(state, &name, addr) {
                        debug!("[ALLOC] {addr} found in range {name}");
                        return Ok((addr, Placement::Range { range }));
                    }
                }
                _ => {
                    if !Self::usable(claim, &parent) {
                        continue;
                    }
                    considered += 1;
                    let bits = family_bits(parent.labels.family);
                    if let Some(hn) = state.trie.get_available_prefix_by_bit_len(&parent.prefix, bits) {
                        debug!("[ALLOC] {} found in {}", hn.addr(), parent.prefix);
                        return Ok((hn.addr(), Placement::Trie { parent }));
                    }
                }
            }
        }
        if considered == 0 {
            return Err(Error::NoParent(
                "no network, pool or range matches the selector".to_string(),
            ));
        }
        Err(Error::ExhaustedPool(format!("no free address in {considered} candidate blocks")))
    }
}

impl Applicator for DynamicAddressApplicator {
    fn validate(&mut self, state: &InstanceState, claim: &Claim) -> Result<()> {
        if owned_address(state, claim).is_some() {
            return Ok(());
        }
        let any = candidates(state, claim, &self.selector)
            .iter()
            .any(|p| Self::usable(claim, p));
        if !any {
            return Err(Error::NoParent(
                "no network, pool or range matches the selector".to_string(),
            ));
        }
        Ok(())
    }

    fn apply(&mut self, state: &mut InstanceState, claim: &mut Claim) -> Result<()> {
        let found = match owned_address(state, claim) {
            Some(found) => Some(found),
            None => self.reconfirm(state, claim),
        };
        let (addr, placement) = match found {
            Some(found) => found,
            None => self.search(state, claim)?,
        };
        commit_address(state, claim, addr, &placement)?;
        info!("[ALLOC] {} -> {}", claim.name, claim.status.address.as_deref().unwrap_or_default());
        Ok(())
    }

    fn delete(&mut self, state: &mut InstanceState, claim: &Claim) -> Result<()> {
        delete_entries(state, claim)
    }
}
