//! Per-claim-type strategies: validate against the current index state,
//! apply the claim to it, and remove it again.
//!
//! Every strategy funnels its writes through [`apply_entries`] and
//! [`delete_entries`], which diff a claim's desired entry set against what
//! the trie already holds for the claim's owner.

mod dynamic_address;
mod dynamic_prefix;
mod static_address;
mod static_prefix;
mod static_range;

pub use dynamic_address::DynamicAddressApplicator;
pub use dynamic_prefix::DynamicPrefixApplicator;
pub use static_address::StaticAddressApplicator;
pub use static_prefix::StaticPrefixApplicator;
pub use static_range::StaticRangeApplicator;

use crate::constants::INDEX_OWNER_KIND;
use crate::errors::{Error, Result};
use crate::helpers::host_net;
use crate::instance::InstanceState;
use crate::selector::Selector;
use crate::types::*;
use ipnet::IpNet;
use log::{debug, warn};
use std::net::IpAddr;

pub trait Applicator {
    /// Check the claim against live state. Never mutates.
    fn validate(&mut self, state: &InstanceState, claim: &Claim) -> Result<()>;
    /// Write the claim into `state` and fill in `claim.status`.
    fn apply(&mut self, state: &mut InstanceState, claim: &mut Claim) -> Result<()>;
    /// Remove everything the claim holds.
    fn delete(&mut self, state: &mut InstanceState, claim: &Claim) -> Result<()>;
}

/// Strategy for the claim's kind.
pub fn for_claim(claim: &Claim) -> Box<dyn Applicator> {
    match &claim.spec.kind {
        ClaimKind::StaticAddress(lit) => Box::new(StaticAddressApplicator::new(*lit)),
        ClaimKind::StaticPrefix(p) => Box::new(StaticPrefixApplicator::new(*p)),
        ClaimKind::StaticRange(r) => Box::new(StaticRangeApplicator::new(*r)),
        ClaimKind::DynamicAddress { selector } => {
            Box::new(DynamicAddressApplicator::new(selector.clone()))
        }
        ClaimKind::DynamicPrefix { selector, prefix_length } => {
            Box::new(DynamicPrefixApplicator::new(selector.clone(), *prefix_length))
        }
    }
}

// ─────────────────────────── nesting ────────────────────────────────── //

/// Whether `child` may sit directly under `parent`.
pub(crate) fn check_nesting(parent: &Entry, child: &EntryLabels, what: &str) -> Result<()> {
    let p = &parent.labels;
    let deny = |why: &str| {
        Err(Error::NestingViolation(format!(
            "{what} ({} {}) cannot nest in {} ({} {}): {why}",
            child.block_kind, child.shape, parent.prefix, p.block_kind, p.shape
        )))
    };
    match child.shape {
        ClaimShape::Prefix => {
            if p.shape != ClaimShape::Prefix {
                return deny("prefixes nest only in prefixes");
            }
            match (child.block_kind, p.block_kind) {
                (BlockKind::Aggregate, BlockKind::Aggregate)
                    if child.owner.kind == INDEX_OWNER_KIND =>
                {
                    Ok(())
                }
                (BlockKind::Aggregate, _) => deny("aggregates are top-level unless the index seeds them"),
                (BlockKind::Network, BlockKind::Aggregate) => Ok(()),
                (BlockKind::Network, _) => deny("networks nest only in aggregates"),
                (BlockKind::Pool, BlockKind::Aggregate | BlockKind::Pool) => Ok(()),
                (BlockKind::Pool, _) => deny("pools nest only in aggregates or pools"),
                (BlockKind::Other, BlockKind::Aggregate | BlockKind::Other) => Ok(()),
                (BlockKind::Other, _) => deny("other blocks nest only in aggregates or other blocks"),
            }
        }
        ClaimShape::Range => {
            if p.shape != ClaimShape::Prefix {
                return deny("ranges nest only in prefixes");
            }
            if p.block_kind == BlockKind::Aggregate {
                return deny("ranges cannot sit directly in an aggregate");
            }
            Ok(())
        }
        ClaimShape::Address => {
            if p.shape == ClaimShape::Address {
                return deny("addresses cannot contain addresses");
            }
            if p.block_kind == BlockKind::Aggregate {
                return deny("aggregates do not hand out addresses");
            }
            Ok(())
        }
    }
}

/// Copy the block kind and subnet an address or range inherits from its
/// enclosing block.
pub(crate) fn inherit(parent: &Entry, child: &mut EntryLabels) {
    child.block_kind = parent.labels.block_kind;
    child.subnet = if parent.labels.block_kind == BlockKind::Network {
        parent.labels.subnet.or(Some(parent.prefix))
    } else {
        None
    };
}

// ─────────────────────────── entry diffing ──────────────────────────── //

/// One entry a claim wants. `shared` entries (network subnet and its
/// reservations) may already be held by another network claim.
#[derive(Debug, Clone)]
pub(crate) struct Desired {
    pub entry: Entry,
    pub shared: bool,
}

impl Desired {
    pub fn own(prefix: IpNet, labels: EntryLabels) -> Self {
        Self { entry: Entry::new(prefix.trunc(), labels), shared: false }
    }

    pub fn shared(prefix: IpNet, labels: EntryLabels) -> Self {
        Self { entry: Entry::new(prefix.trunc(), labels), shared: true }
    }
}

pub(crate) fn owned_entries(state: &InstanceState, claim: &Claim) -> Vec<Entry> {
    state.trie.find(|l| claim.owns(l))
}

/// Labels identifying whatever `claim` owns.
pub(crate) fn owner_labels(claim: &Claim) -> EntryLabels {
    claim.entry_labels(ClaimShape::Address, AddressFamily::Ipv4)
}

/// Bring the trie in line with `desired` for `claim`.
pub(crate) fn apply_entries(state: &mut InstanceState, claim: &Claim, desired: Vec<Desired>) -> Result<()> {
    let stale: Vec<Entry> = owned_entries(state, claim)
        .into_iter()
        .filter(|e| !desired.iter().any(|d| d.entry.prefix == e.prefix))
        .collect();
    give_up(state, claim, stale)?;

    let held = desired
        .iter()
        .find(|d| d.shared && d.entry.labels.shape == ClaimShape::Prefix)
        .map(|d| d.entry.clone());
    for d in desired {
        let prefix = d.entry.prefix;
        match state.trie.get(&prefix).cloned() {
            None => {
                state.trie.add(&prefix, d.entry.labels.clone())?;
                after_change(state, &d.entry);
            }
            Some(existing) if claim.owns(&existing) => {
                if existing != d.entry.labels {
                    state.trie.set(&prefix, d.entry.labels.clone());
                    after_change(state, &d.entry);
                }
            }
            Some(existing)
                if d.shared
                    && existing.block_kind == d.entry.labels.block_kind
                    && existing.shape == d.entry.labels.shape => {}
            Some(existing) => {
                return Err(Error::OwnershipConflict {
                    prefix: prefix.to_string(),
                    claim: existing.claim_name,
                    owner: existing.owner.to_string(),
                })
            }
        }
    }
    match held {
        Some(subnet) => state.hold_subnet(&subnet.labels, Some(subnet.prefix)),
        None => state.hold_subnet(&owner_labels(claim), None),
    }
    Ok(())
}

/// The subnet `entry` stands for when it is a shared piece of a network:
/// the subnet block itself or one of its reserved addresses.
fn shared_subnet(entry: &Entry) -> Option<IpNet> {
    let subnet = entry.labels.subnet?;
    if entry.labels.block_kind != BlockKind::Network {
        return None;
    }
    let shared = match entry.labels.shape {
        ClaimShape::Prefix => entry.prefix == subnet,
        ClaimShape::Address => network_reservations(&subnet).contains(&entry.prefix),
        ClaimShape::Range => false,
    };
    shared.then_some(subnet)
}

/// Drop `entries` of `claim`. Shared subnet pieces pass to another network
/// claim holding the same subnet. A subnet nobody else holds cannot go
/// while other claims still live inside it.
fn give_up(state: &mut InstanceState, claim: &Claim, entries: Vec<Entry>) -> Result<()> {
    let me = owner_labels(claim);
    for e in &entries {
        if e.labels.shape != ClaimShape::Prefix || shared_subnet(e).is_none() {
            continue;
        }
        if state.subnet_heir(&e.prefix, &me).is_some() {
            continue;
        }
        if let Some(tenant) = state.trie.children(&e.prefix).into_iter().find(|c| !claim.owns(&c.labels)) {
            return Err(Error::NestingViolation(format!(
                "network {} still holds {} of {}; release it first",
                e.prefix, tenant.prefix, tenant.labels.claim_name
            )));
        }
    }

    let mut doomed = Vec::with_capacity(entries.len());
    for e in entries {
        match shared_subnet(&e).and_then(|s| state.subnet_heir(&s, &me)) {
            Some(mut heir) => {
                debug!("[APPLY] {} hands {} to {}", claim.name, e.prefix, heir.claim_name);
                heir.shape = e.labels.shape;
                state.trie.set(&e.prefix, heir);
            }
            None => doomed.push(e),
        }
    }
    doomed.sort_by_key(|e| std::cmp::Reverse(e.prefix.prefix_len()));
    for e in doomed {
        debug!("[APPLY] {} drops {}", claim.name, e.prefix);
        remove_block(state, &e);
    }
    Ok(())
}

/// Propagate a new or relabelled block to what hangs below it.
fn after_change(state: &mut InstanceState, entry: &Entry) {
    match entry.labels.shape {
        ClaimShape::Range => relabel_range_members(state, entry),
        ClaimShape::Prefix => {
            for child in state.trie.direct_children(&entry.prefix) {
                rederive(state, &child);
            }
        }
        ClaimShape::Address => {}
    }
}

/// Recompute inherited labels of `child` (owned by a different claim than
/// its parent) from its current most specific parent.
fn rederive(state: &mut InstanceState, child: &Entry) {
    if child.labels.shape == ClaimShape::Prefix {
        return;
    }
    let Some(parent) = state.trie.most_specific_parent(&child.prefix) else {
        return;
    };
    if parent.labels.is_owned_by(&child.labels) {
        return;
    }
    let mut labels = child.labels.clone();
    inherit(&parent, &mut labels);
    if labels != child.labels {
        debug!("[APPLY] repoint {} under {}", child.prefix, parent.prefix);
        state.trie.set(&child.prefix, labels.clone());
        if labels.shape == ClaimShape::Range {
            relabel_range_members(state, &Entry::new(child.prefix, labels));
        }
    }
}

fn relabel_range_members(state: &mut InstanceState, range_entry: &Entry) {
    if let Some(alloc) = state.ranges.get_mut(&range_entry.labels.claim_name) {
        alloc.relabel(|l| inherit(range_entry, l));
    }
}

/// Delete one block and repoint what was below it.
fn remove_block(state: &mut InstanceState, entry: &Entry) {
    let below = state.trie.direct_children(&entry.prefix);
    state.trie.delete(&entry.prefix);
    for child in below {
        rederive(state, &child);
    }
}

/// Remove every trace of `claim`: its trie entries, its range members and,
/// for range claims, the range allocator itself.
pub(crate) fn delete_entries(state: &mut InstanceState, claim: &Claim) -> Result<()> {
    let owned = owned_entries(state, claim);
    give_up(state, claim, owned)?;
    state.hold_subnet(&owner_labels(claim), None);
    release_range_members(state, claim, None);

    if matches!(claim.spec.kind, ClaimKind::StaticRange(_)) {
        if let Some(alloc) = state.ranges.remove(&claim.name) {
            if !alloc.is_empty() {
                warn!(
                    "[DELETE] range {} removed with {} allocated members",
                    claim.name,
                    alloc.len()
                );
            }
        }
    }
    Ok(())
}

/// Release range members of `claim`, except `keep`.
pub(crate) fn release_range_members(state: &mut InstanceState, claim: &Claim, keep: Option<(&str, IpAddr)>) {
    for (name, addr) in state.range_members_of(&owner_labels(claim)) {
        if keep.is_some_and(|(n, a)| n == name && a == addr) {
            continue;
        }
        if let Some(alloc) = state.ranges.get_mut(&name) {
            alloc.release(&addr);
        }
    }
}

// ─────────────────────────── networks ───────────────────────────────── //

/// Host prefixes reserved inside a subnet: network and broadcast for IPv4,
/// the subnet-router anycast address for IPv6. Point-to-point subnets
/// (/31, /127) and shorter keep every address.
pub(crate) fn network_reservations(subnet: &IpNet) -> Vec<IpNet> {
    match subnet {
        IpNet::V4(v4) if v4.prefix_len() < 31 => vec![
            host_net(IpAddr::V4(v4.network())),
            host_net(IpAddr::V4(v4.broadcast())),
        ],
        IpNet::V6(v6) if v6.prefix_len() < 127 => vec![host_net(IpAddr::V6(v6.network()))],
        _ => Vec::new(),
    }
}

/// Entries of a network-kind prefix claim: the subnet, its reserved
/// addresses and the claim's dedicated host address if it names one.
pub(crate) fn network_entries(claim: &Claim, subnet: IpNet, host: Option<IpAddr>) -> Vec<Desired> {
    let subnet = subnet.trunc();
    let family = AddressFamily::of_net(&subnet);
    let mut base = claim.entry_labels(ClaimShape::Prefix, family);
    base.block_kind = BlockKind::Network;
    base.subnet = Some(subnet);
    base.default_gateway = false;

    let mut out = vec![Desired::shared(subnet, base.clone())];
    for r in network_reservations(&subnet) {
        let mut l = base.clone();
        l.shape = ClaimShape::Address;
        out.push(Desired::shared(r, l));
    }
    if let Some(addr) = host {
        let mut l = base;
        l.shape = ClaimShape::Address;
        l.default_gateway = claim.spec.default_gateway;
        out.push(Desired::own(host_net(addr), l));
    }
    out
}

/// Default gateway recorded in `subnet` by a claim other than `claim`.
pub(crate) fn find_gateway(state: &InstanceState, subnet: &IpNet, claim: &Claim) -> Option<IpAddr> {
    let in_trie = state
        .trie
        .find(|l| {
            l.default_gateway
                && l.shape == ClaimShape::Address
                && l.subnet.as_ref() == Some(subnet)
                && !claim.owns(l)
        })
        .into_iter()
        .map(|e| e.prefix.addr())
        .next();
    in_trie.or_else(|| {
        state.ranges.values().find_map(|r| {
            r.members().into_iter().find_map(|(a, l)| {
                (l.default_gateway && l.subnet.as_ref() == Some(subnet) && !claim.owns(&l)).then_some(a)
            })
        })
    })
}

pub(crate) fn format_address(addr: IpAddr, subnet: Option<&IpNet>) -> String {
    match subnet {
        Some(s) => format!("{}/{}", addr, s.prefix_len()),
        None => addr.to_string(),
    }
}

// ─────────────────────────── addresses ──────────────────────────────── //

/// Where an address claim lands.
#[derive(Debug, Clone)]
pub(crate) enum Placement {
    /// A host entry in the trie under `parent`.
    Trie { parent: Entry },
    /// A member of the range allocator named by `range.labels.claim_name`.
    Range { range: Entry },
}

/// Write an address claim and fill in its status.
pub(crate) fn commit_address(
    state: &mut InstanceState,
    claim: &mut Claim,
    addr: IpAddr,
    placement: &Placement,
) -> Result<()> {
    let mut labels = claim.entry_labels(ClaimShape::Address, AddressFamily::of(&addr));
    match placement {
        Placement::Trie { parent } => {
            inherit(parent, &mut labels);
            let subnet = labels.subnet;
            apply_entries(state, claim, vec![Desired::own(host_net(addr), labels)])?;
            release_range_members(state, claim, None);
            claim.status.address = Some(format_address(addr, subnet.as_ref()));
            claim.status.range_name = None;
            set_gateway(state, claim, subnet.as_ref());
        }
        Placement::Range { range } => {
            inherit(range, &mut labels);
            let subnet = labels.subnet;
            let name = range.labels.claim_name.clone();
            apply_entries(state, claim, Vec::new())?;
            release_range_members(state, claim, Some((name.as_str(), addr)));
            state
                .ranges
                .get_mut(&name)
                .ok_or_else(|| Error::InconsistentRange(format!("range {name} has no allocator")))?
                .claim(&addr, labels)?;
            claim.status.address = Some(format_address(addr, subnet.as_ref()));
            claim.status.range_name = Some(name);
            set_gateway(state, claim, subnet.as_ref());
        }
    }
    claim.status.prefix = None;
    claim.status.range = None;
    Ok(())
}

pub(crate) fn set_gateway(state: &InstanceState, claim: &mut Claim, subnet: Option<&IpNet>) {
    claim.status.default_gateway = match subnet {
        Some(s) if !claim.spec.default_gateway => find_gateway(state, s, claim).map(|a| a.to_string()),
        _ => None,
    };
}

/// Candidate parent blocks for a dynamic claim, in trie order.
pub(crate) fn candidates(state: &InstanceState, claim: &Claim, selector: &Selector) -> Vec<Entry> {
    state
        .trie
        .get_by_label(selector)
        .into_iter()
        .filter(|e| claim.spec.family.map_or(true, |f| f == e.labels.family))
        .filter(|e| !claim.owns(&e.labels))
        .collect()
}

/// Address entries of `claim` in the trie or in a range allocator.
pub(crate) fn owned_address(state: &InstanceState, claim: &Claim) -> Option<(IpAddr, Placement)> {
    if let Some(e) = owned_entries(state, claim)
        .into_iter()
        .find(|e| e.labels.shape == ClaimShape::Address)
    {
        let parent = state.trie.most_specific_parent(&e.prefix)?;
        return Some((e.prefix.addr(), Placement::Trie { parent }));
    }
    let (name, addr) = state.range_members_of(&owner_labels(claim)).into_iter().next()?;
    let range = range_piece(state, &name, addr)?;
    Some((addr, Placement::Range { range }))
}

/// The trie entry of range `name` that covers `addr`.
pub(crate) fn range_piece(state: &InstanceState, name: &str, addr: IpAddr) -> Option<Entry> {
    let host = host_net(addr);
    if let Some(l) = state.trie.get(&host) {
        if l.shape == ClaimShape::Range && l.claim_name == name {
            return Some(Entry::new(host, l.clone()));
        }
    }
    state
        .trie
        .most_specific_parent(&host)
        .filter(|p| p.labels.shape == ClaimShape::Range && p.labels.claim_name == name)
}
