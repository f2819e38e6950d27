use super::{apply_entries, check_nesting, delete_entries, network_entries, network_reservations, set_gateway, Applicator, Desired};
use crate::errors::{Error, Result};
use crate::helpers::{family_bits, host_net};
use crate::instance::InstanceState;
use crate::types::*;
use ipnet::IpNet;
use log::debug;
use std::net::IpAddr;

/// An exact prefix. Network-kind prefixes may name a host (`10.0.0.1/24`),
/// which becomes the claim's dedicated address inside the subnet.
pub struct StaticPrefixApplicator {
    prefix: IpNet,
}

impl StaticPrefixApplicator {
    pub fn new(prefix: IpNet) -> Self {
        Self { prefix }
    }

    fn subnet(&self) -> IpNet {
        self.prefix.trunc()
    }

    fn host(&self) -> Option<IpAddr> {
        (self.prefix.addr() != self.prefix.network()).then(|| self.prefix.addr())
    }

    fn labels(&self, claim: &Claim) -> EntryLabels {
        let subnet = self.subnet();
        let mut labels = claim.entry_labels(ClaimShape::Prefix, AddressFamily::of_net(&subnet));
        if claim.spec.block_kind == BlockKind::Network {
            labels.subnet = Some(subnet);
            labels.default_gateway = false;
        }
        labels
    }
}

impl Applicator for StaticPrefixApplicator {
    fn validate(&mut self, state: &InstanceState, claim: &Claim) -> Result<()> {
        let subnet = self.subnet();
        let family = AddressFamily::of_net(&subnet);
        let kind = claim.spec.block_kind;
        if claim.spec.family.is_some_and(|f| f != family) {
            return Err(Error::Syntax(format!("{} is not {}", self.prefix, family.as_str())));
        }
        if kind == BlockKind::Network {
            if subnet.prefix_len() >= family_bits(family) {
                return Err(Error::Syntax(format!(
                    "network {} must be shorter than a host route",
                    self.prefix
                )));
            }
            if let Some(h) = self.host() {
                if network_reservations(&subnet).contains(&host_net(h)) {
                    return Err(Error::Syntax(format!("{h} is reserved in {subnet}")));
                }
            }
        } else if self.host().is_some() {
            return Err(Error::Syntax(format!(
                "{} has host bits set; only network prefixes may name an address",
                self.prefix
            )));
        }

        let labels = self.labels(claim);
        let shared = match state.trie.get(&subnet) {
            Some(existing) if claim.owns(existing) => false,
            Some(existing)
                if kind == BlockKind::Network
                    && existing.block_kind == BlockKind::Network
                    && existing.shape == ClaimShape::Prefix =>
            {
                true
            }
            Some(existing) => {
                return Err(Error::OwnershipConflict {
                    prefix: subnet.to_string(),
                    claim: existing.claim_name.clone(),
                    owner: existing.owner.to_string(),
                })
            }
            None => false,
        };

        match state.trie.most_specific_parent(&subnet) {
            Some(parent) => check_nesting(&parent, &labels, &subnet.to_string())?,
            None if kind == BlockKind::Aggregate => {}
            None => {
                return Err(Error::NoParent(format!(
                    "{subnet} is not inside any known block; claim an aggregate first"
                )))
            }
        }

        if !shared {
            let mut dry = state.trie.clone();
            dry.set(&subnet, labels.clone());
            let me = Entry::new(subnet, labels);
            for child in dry.direct_children(&subnet) {
                if claim.owns(&child.labels) {
                    continue;
                }
                check_nesting(&me, &child.labels, &child.prefix.to_string())?;
            }
        }

        if let Some(h) = self.host() {
            let hn = host_net(h);
            match state.trie.get(&hn) {
                Some(existing) if !claim.owns(existing) => {
                    return Err(Error::OwnershipConflict {
                        prefix: h.to_string(),
                        claim: existing.claim_name.clone(),
                        owner: existing.owner.to_string(),
                    })
                }
                Some(_) => {}
                None => {
                    if let Some(p) = state.trie.most_specific_parent(&hn) {
                        if p.prefix.prefix_len() > subnet.prefix_len() {
                            return Err(Error::NestingViolation(format!(
                                "{h} falls inside {} held by {}",
                                p.prefix, p.labels.claim_name
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, state: &mut InstanceState, claim: &mut Claim) -> Result<()> {
        let subnet = self.subnet();
        let desired = if claim.spec.block_kind == BlockKind::Network {
            network_entries(claim, subnet, self.host())
        } else {
            vec![Desired::own(subnet, self.labels(claim))]
        };
        debug!("[APPLY] {} prefix {} ({} entries)", claim.name, self.prefix, desired.len());
        apply_entries(state, claim, desired)?;

        claim.status.prefix = Some(self.prefix.to_string());
        claim.status.address = None;
        claim.status.range = None;
        claim.status.range_name = None;
        if claim.spec.block_kind == BlockKind::Network {
            set_gateway(state, claim, Some(&subnet));
        } else {
            claim.status.default_gateway = None;
        }
        Ok(())
    }

    fn delete(&mut self, state: &mut InstanceState, claim: &Claim) -> Result<()> {
        delete_entries(state, claim)
    }
}
