use super::{apply_entries, candidates, check_nesting, delete_entries, network_entries, owned_entries, Applicator, Desired};
use crate::errors::{Error, Result};
use crate::helpers::family_bits;
use crate::instance::InstanceState;
use crate::selector::Selector;
use crate::types::*;
use ipnet::IpNet;
use log::{debug, info};

/// A prefix of a given length carved out of the first selector-matched
/// block with room for it.
pub struct DynamicPrefixApplicator {
    selector: Selector,
    prefix_length: u8,
}

impl DynamicPrefixApplicator {
    pub fn new(selector: Selector, prefix_length: u8) -> Self {
        Self { selector, prefix_length }
    }

    fn labels(&self, claim: &Claim, prefix: &IpNet) -> EntryLabels {
        let mut labels = claim.entry_labels(ClaimShape::Prefix, AddressFamily::of_net(prefix));
        if claim.spec.block_kind == BlockKind::Network {
            labels.subnet = Some(*prefix);
            labels.default_gateway = false;
        }
        labels
    }

    fn fits(&self, claim: &Claim, parent: &Entry) -> bool {
        parent.labels.shape == ClaimShape::Prefix
            && self.prefix_length <= family_bits(parent.labels.family)
            && parent.prefix.prefix_len() < self.prefix_length
            && check_nesting(parent, &self.labels(claim, &parent.prefix), "candidate").is_ok()
    }

    fn current(&self, state: &InstanceState, claim: &Claim) -> Option<IpNet> {
        owned_entries(state, claim)
            .into_iter()
            .find(|e| e.labels.shape == ClaimShape::Prefix && e.prefix.prefix_len() == self.prefix_length)
            .map(|e| e.prefix)
    }

    /// The previously assigned prefix, if nobody else holds it, its parent
    /// still qualifies and whatever now sits inside it may nest there.
    fn reconfirm(&self, state: &InstanceState, claim: &Claim) -> Option<IpNet> {
        let prev: IpNet = claim.status.prefix.as_deref()?.parse().ok()?;
        let prev = prev.trunc();
        if prev.prefix_len() != self.prefix_length || state.trie.get(&prev).is_some() {
            return None;
        }
        let parent = state.trie.most_specific_parent(&prev)?;
        let qualifies = self.selector.matches(&parent.labels.to_map())
            && claim.spec.family.map_or(true, |f| f == parent.labels.family)
            && !claim.owns(&parent.labels)
            && self.fits(claim, &parent);
        if !qualifies {
            return None;
        }
        let me = Entry::new(prev, self.labels(claim, &prev));
        let adoptable = state
            .trie
            .children(&prev)
            .iter()
            .filter(|c| {
                state
                    .trie
                    .most_specific_parent(&c.prefix)
                    .is_some_and(|p| p.prefix.prefix_len() < prev.prefix_len())
            })
            .all(|c| claim.owns(&c.labels) || check_nesting(&me, &c.labels, &c.prefix.to_string()).is_ok());
        adoptable.then_some(prev)
    }

    fn search(&self, state: &InstanceState, claim: &Claim) -> Result<IpNet> {
        let pool: Vec<Entry> = candidates(state, claim, &self.selector)
            .into_iter()
            .filter(|c| self.fits(claim, c))
            .collect();
        if pool.is_empty() {
            return Err(Error::NoParent(format!(
                "no block matching the selector can hold a /{}",
                self.prefix_length
            )));
        }
        for parent in &pool {
            if let Some(p) = state
                .trie
                .get_available_prefix_by_bit_len(&parent.prefix, self.prefix_length)
            {
                debug!("[ALLOC] /{} found in {}", self.prefix_length, parent.prefix);
                return Ok(p);
            }
        }
        Err(Error::ExhaustedPool(format!(
            "no free /{} in {} candidate blocks",
            self.prefix_length,
            pool.len()
        )))
    }
}

impl Applicator for DynamicPrefixApplicator {
    fn validate(&mut self, state: &InstanceState, claim: &Claim) -> Result<()> {
        let max = family_bits(claim.spec.family.unwrap_or(AddressFamily::Ipv6));
        if self.prefix_length == 0 || self.prefix_length > max {
            return Err(Error::Syntax(format!("prefix length {} is out of range", self.prefix_length)));
        }
        if claim.spec.block_kind == BlockKind::Aggregate {
            return Err(Error::NestingViolation(
                "aggregates cannot be allocated dynamically".to_string(),
            ));
        }
        if self.current(state, claim).is_some() {
            return Ok(());
        }

        let matched: Vec<Entry> = candidates(state, claim, &self.selector)
            .into_iter()
            .filter(|c| c.labels.shape == ClaimShape::Prefix)
            .collect();
        if !matched.is_empty() && matched.iter().all(|c| self.prefix_length > family_bits(c.labels.family)) {
            return Err(Error::Syntax(format!(
                "prefix length {} is longer than the {} blocks matching the selector",
                self.prefix_length,
                matched[0].labels.family.as_str()
            )));
        }
        if !matched.iter().any(|c| self.fits(claim, c)) {
            return Err(Error::NoParent(format!(
                "no block matching the selector can hold a {} /{}",
                claim.spec.block_kind, self.prefix_length
            )));
        }
        Ok(())
    }

    fn apply(&mut self, state: &mut InstanceState, claim: &mut Claim) -> Result<()> {
        let prefix = match self.current(state, claim) {
            Some(p) => p,
            None => match self.reconfirm(state, claim) {
                Some(p) => p,
                None => self.search(state, claim)?,
            },
        };

        let desired = if claim.spec.block_kind == BlockKind::Network {
            network_entries(claim, prefix, None)
        } else {
            vec![Desired::own(prefix, self.labels(claim, &prefix))]
        };
        apply_entries(state, claim, desired)?;
        info!("[ALLOC] {} -> {}", claim.name, prefix);

        claim.status.prefix = Some(prefix.to_string());
        claim.status.address = None;
        claim.status.range = None;
        claim.status.range_name = None;
        claim.status.default_gateway = None;
        Ok(())
    }

    fn delete(&mut self, state: &mut InstanceState, claim: &Claim) -> Result<()> {
        delete_entries(state, claim)
    }
}
