//! Per-index allocation state and the registry that holds it.

use crate::range::RangeAllocator;
use crate::trie::AddressTrie;
use crate::types::{Entry, EntryLabels, IndexKey};
use ipnet::IpNet;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

/// One trie plus the range allocators of one index.
#[derive(Debug, Clone, Default)]
pub struct InstanceState {
    pub trie: AddressTrie,
    pub ranges: BTreeMap<String, RangeAllocator>,
    /// Network claims sharing each subnet, as the labels they want on the
    /// subnet entry. The trie records only one of them as the owner.
    subnets: BTreeMap<IpNet, Vec<EntryLabels>>,
}

impl InstanceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.trie.entries()
    }

    /// Range members held by the owner of `labels`, across all ranges.
    pub fn range_members_of(&self, labels: &EntryLabels) -> Vec<(String, IpAddr)> {
        self.ranges
            .iter()
            .flat_map(|(name, r)| r.owned_by(labels).into_iter().map(move |a| (name.clone(), a)))
            .collect()
    }

    /// Record the owner of `holder` as sharing `subnet`, dropping whatever
    /// subnet it held before. `None` only drops.
    pub fn hold_subnet(&mut self, holder: &EntryLabels, subnet: Option<IpNet>) {
        for holders in self.subnets.values_mut() {
            holders.retain(|h| !h.is_owned_by(holder));
        }
        self.subnets.retain(|_, holders| !holders.is_empty());
        if let Some(subnet) = subnet {
            self.subnets.entry(subnet).or_default().push(holder.clone());
        }
    }

    /// Another network claim sharing `subnet` that can take it over from
    /// the owner of `leaving`.
    pub fn subnet_heir(&self, subnet: &IpNet, leaving: &EntryLabels) -> Option<EntryLabels> {
        self.subnets
            .get(subnet)?
            .iter()
            .find(|h| !h.is_owned_by(leaving))
            .cloned()
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: InstanceState,
    initialized: bool,
}

/// Keyed store of [`InstanceState`]. A present-but-uninitialized instance
/// exists from `create_index` until its restore finished cleanly.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: HashMap<IndexKey, Slot>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        self.instances.contains_key(key)
    }

    /// Create the instance if missing; returns whether it was created.
    pub fn ensure(&mut self, key: &IndexKey) -> bool {
        if self.instances.contains_key(key) {
            return false;
        }
        self.instances.insert(key.clone(), Slot::default());
        true
    }

    pub fn is_initialized(&self, key: &IndexKey) -> bool {
        self.instances.get(key).is_some_and(|s| s.initialized)
    }

    pub fn set_initialized(&mut self, key: &IndexKey, initialized: bool) {
        if let Some(slot) = self.instances.get_mut(key) {
            slot.initialized = initialized;
        }
    }

    /// State of an instance regardless of its initialized flag.
    pub fn get(&self, key: &IndexKey) -> Option<&InstanceState> {
        self.instances.get(key).map(|s| &s.state)
    }

    pub fn get_mut(&mut self, key: &IndexKey) -> Option<&mut InstanceState> {
        self.instances.get_mut(key).map(|s| &mut s.state)
    }

    /// Reset an instance to an empty, uninitialized state.
    pub fn reset(&mut self, key: &IndexKey) {
        if let Some(slot) = self.instances.get_mut(key) {
            *slot = Slot::default();
        }
    }

    pub fn remove(&mut self, key: &IndexKey) -> Option<InstanceState> {
        self.instances.remove(key).map(|s| s.state)
    }
}
