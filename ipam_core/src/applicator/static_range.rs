use super::{apply_entries, check_nesting, delete_entries, inherit, Applicator, Desired};
use crate::errors::{Error, Result};
use crate::instance::InstanceState;
use crate::range::RangeAllocator;
use crate::types::*;
use ipnet::IpNet;
use log::debug;

/// An inclusive interval stored as its CIDR cover, each piece tagged with
/// the range claim, plus a flat allocator for members.
pub struct StaticRangeApplicator {
    range: IpRange,
    pieces: Vec<IpNet>,
    parent: Option<Entry>,
}

impl StaticRangeApplicator {
    pub fn new(range: IpRange) -> Self {
        Self { range, pieces: range.to_prefixes(), parent: None }
    }
}

impl Applicator for StaticRangeApplicator {
    fn validate(&mut self, state: &InstanceState, claim: &Claim) -> Result<()> {
        let family = self.range.family();
        if claim.spec.family.is_some_and(|f| f != family) {
            return Err(Error::Syntax(format!("{} is not {}", self.range, family.as_str())));
        }
        let first = *self
            .pieces
            .first()
            .ok_or_else(|| Error::Syntax(format!("range {} is empty", self.range)))?;

        let present: Vec<Entry> = self
            .pieces
            .iter()
            .filter_map(|p| state.trie.get(p).map(|l| Entry::new(*p, l.clone())))
            .collect();

        if present.len() == self.pieces.len() {
            for e in &present {
                if e.labels.shape != ClaimShape::Range || !claim.owns(&e.labels) {
                    return Err(Error::OwnershipConflict {
                        prefix: e.prefix.to_string(),
                        claim: e.labels.claim_name.clone(),
                        owner: e.labels.owner.to_string(),
                    });
                }
            }
            if let Some(alloc) = state.ranges.get(&claim.name) {
                if alloc.range() != &self.range {
                    return Err(Error::InconsistentRange(format!(
                        "allocator of {} covers {}, not {}",
                        claim.name,
                        alloc.range(),
                        self.range
                    )));
                }
            }
            self.parent = state.trie.most_specific_parent(&first);
            return Ok(());
        }
        if !present.is_empty() {
            return Err(Error::InconsistentRange(format!(
                "{} of {} blocks of {} already exist",
                present.len(),
                self.pieces.len(),
                self.range
            )));
        }

        if let Some(alloc) = state.ranges.get(&claim.name) {
            if !alloc.is_empty() {
                return Err(Error::InconsistentRange(format!(
                    "range {} still holds {} members; release them before resizing",
                    claim.name,
                    alloc.len()
                )));
            }
        }

        let mut parent: Option<Entry> = None;
        for piece in &self.pieces {
            if state.trie.has_children(piece) {
                return Err(Error::InconsistentRange(format!(
                    "{} overlaps allocations inside {piece}",
                    self.range
                )));
            }
            let msp = state.trie.most_specific_parent(piece).ok_or_else(|| {
                Error::NoParent(format!("{} is not inside any known block", self.range))
            })?;
            if msp.labels.shape == ClaimShape::Range {
                return Err(Error::InconsistentRange(format!(
                    "{} overlaps range {}",
                    self.range, msp.labels.claim_name
                )));
            }
            match &parent {
                None => parent = Some(msp),
                Some(p) if p.prefix != msp.prefix => {
                    return Err(Error::NestingViolation(format!(
                        "{} spans {} and {}",
                        self.range, p.prefix, msp.prefix
                    )))
                }
                Some(_) => {}
            }
        }
        let parent = parent.ok_or_else(|| Error::NoParent(self.range.to_string()))?;
        let wanted = claim.entry_labels(ClaimShape::Range, family);
        check_nesting(&parent, &wanted, &self.range.to_string())?;
        self.parent = Some(parent);
        Ok(())
    }

    fn apply(&mut self, state: &mut InstanceState, claim: &mut Claim) -> Result<()> {
        if self.parent.is_none() {
            self.validate(state, claim)?;
        }
        let parent = self
            .parent
            .take()
            .ok_or_else(|| Error::NoParent(self.range.to_string()))?;
        let mut labels = claim.entry_labels(ClaimShape::Range, self.range.family());
        labels.default_gateway = false;
        inherit(&parent, &mut labels);

        let desired = self
            .pieces
            .iter()
            .map(|p| Desired::own(*p, labels.clone()))
            .collect();
        debug!("[APPLY] {} range {} as {} blocks", claim.name, self.range, self.pieces.len());
        apply_entries(state, claim, desired)?;

        let keep = state.ranges.get(&claim.name).is_some_and(|r| r.range() == &self.range);
        if !keep {
            state.ranges.insert(claim.name.clone(), RangeAllocator::new(self.range));
        }

        claim.status.range = Some(self.range.to_string());
        claim.status.address = None;
        claim.status.prefix = None;
        claim.status.range_name = None;
        claim.status.default_gateway = None;
        Ok(())
    }

    fn delete(&mut self, state: &mut InstanceState, claim: &Claim) -> Result<()> {
        delete_entries(state, claim)
    }
}
