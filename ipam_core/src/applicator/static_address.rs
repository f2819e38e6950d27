use super::{check_nesting, commit_address, delete_entries, range_piece, Applicator, Placement};
use crate::errors::{Error, Result};
use crate::helpers::{family_bits, host_net};
use crate::instance::InstanceState;
use crate::types::*;

/// One exact address, in the trie under its enclosing block or inside a
/// range allocator when a range covers it.
pub struct StaticAddressApplicator {
    literal: AddressLiteral,
    placement: Option<Placement>,
}

impl StaticAddressApplicator {
    pub fn new(literal: AddressLiteral) -> Self {
        Self { literal, placement: None }
    }

    fn range_placement(&self, state: &InstanceState, claim: &Claim, range: Entry) -> Result<Placement> {
        let name = &range.labels.claim_name;
        let alloc = state
            .ranges
            .get(name)
            .ok_or_else(|| Error::InconsistentRange(format!("range {name} has no allocator")))?;
        if let Some(holder) = alloc.get(&self.literal.addr) {
            if !claim.owns(holder) {
                return Err(Error::OwnershipConflict {
                    prefix: self.literal.addr.to_string(),
                    claim: holder.claim_name.clone(),
                    owner: holder.owner.to_string(),
                });
            }
        }
        Ok(Placement::Range { range })
    }
}

impl Applicator for StaticAddressApplicator {
    fn validate(&mut self, state: &InstanceState, claim: &Claim) -> Result<()> {
        let addr = self.literal.addr;
        let family = self.literal.family();
        if claim.spec.family.is_some_and(|f| f != family) {
            return Err(Error::Syntax(format!("{addr} is not {}", family.as_str())));
        }
        let hn = host_net(addr);

        if let Some(existing) = state.trie.get(&hn) {
            let existing = Entry::new(hn, existing.clone());
            let shape = existing.labels.shape;
            let placement = match shape {
                ClaimShape::Range => self.range_placement(state, claim, existing)?,
                _ if claim.owns(&existing.labels) => {
                    let parent = state.trie.most_specific_parent(&hn).ok_or_else(|| {
                        Error::NoParent(format!("{addr} is not inside any known block"))
                    })?;
                    Placement::Trie { parent }
                }
                _ => {
                    return Err(Error::OwnershipConflict {
                        prefix: addr.to_string(),
                        claim: existing.labels.claim_name,
                        owner: existing.labels.owner.to_string(),
                    })
                }
            };
            self.placement = Some(placement);
            return Ok(());
        }

        let parent = state
            .trie
            .most_specific_parent(&hn)
            .ok_or_else(|| Error::NoParent(format!("{addr} is not inside any known block")))?;

        let shape = parent.labels.shape;
        let placement = match shape {
            ClaimShape::Range => self.range_placement(state, claim, parent)?,
            _ => {
                let wanted = claim.entry_labels(ClaimShape::Address, family);
                check_nesting(&parent, &wanted, &addr.to_string())?;
                let host_len = family_bits(family);
                match (parent.labels.block_kind, self.literal.prefix_len) {
                    (BlockKind::Network, Some(len)) if len == parent.prefix.prefix_len() => {}
                    (BlockKind::Network, _) => {
                        return Err(Error::NestingViolation(format!(
                            "{} lies in network {}; claim it as {}/{}",
                            self.literal,
                            parent.prefix,
                            addr,
                            parent.prefix.prefix_len()
                        )))
                    }
                    (_, Some(len)) if len != host_len => {
                        return Err(Error::NestingViolation(format!(
                            "{} carries a mask but {} is not a network",
                            self.literal, parent.prefix
                        )))
                    }
                    _ => {}
                }
                Placement::Trie { parent }
            }
        };
        self.placement = Some(placement);
        Ok(())
    }

    fn apply(&mut self, state: &mut InstanceState, claim: &mut Claim) -> Result<()> {
        if self.placement.is_none() {
            self.validate(state, claim)?;
        }
        let placement = match self.placement.take() {
            Some(Placement::Range { range }) => {
                // Refresh the piece; a parent relabel may have touched it.
                let piece = range_piece(state, &range.labels.claim_name, self.literal.addr).unwrap_or(range);
                Placement::Range { range: piece }
            }
            Some(p) => p,
            None => return Err(Error::NoParent(format!("{} has no placement", self.literal))),
        };
        commit_address(state, claim, self.literal.addr, &placement)
    }

    fn delete(&mut self, state: &mut InstanceState, claim: &Claim) -> Result<()> {
        delete_entries(state, claim)
    }
}
