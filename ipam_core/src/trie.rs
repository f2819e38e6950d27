//! Prefix trie over an index's address space.
//!
//! One path-compressed binary (Patricia) tree per address family, nodes held
//! in a `Vec` arena and linked by index. A node either stores an entry or is
//! a pure branch point with two children; branch points never outlive the
//! split that created them.

use crate::errors::Error;
use crate::helpers::*;
use crate::selector::Selector;
use crate::types::{AddressFamily, Entry, EntryLabels};
use ipnet::IpNet;
use log::trace;

#[derive(Debug, Clone)]
struct Node {
    key: u128,   // canonical, left-aligned
    plen: u8,    // valid bits in key
    entry: Option<EntryLabels>,
    children: [Option<usize>; 2],
}

/// Where a node hangs: the root link or a child slot of another node.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Root,
    Child(usize, usize),
}

#[derive(Debug, Clone, Default)]
struct Tree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
}

impl Tree {
    // ---- arena -------------------------------------------------------------
    fn alloc(&mut self, key: u128, plen: u8, entry: Option<EntryLabels>) -> usize {
        let node = Node { key, plen, entry, children: [None, None] };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx].entry = None;
        self.nodes[idx].children = [None, None];
        self.free.push(idx);
    }

    fn slot_get(&self, slot: Slot) -> Option<usize> {
        match slot {
            Slot::Root => self.root,
            Slot::Child(parent, bit) => self.nodes[parent].children[bit],
        }
    }

    fn slot_set(&mut self, slot: Slot, value: Option<usize>) {
        match slot {
            Slot::Root => self.root = value,
            Slot::Child(parent, bit) => self.nodes[parent].children[bit] = value,
        }
    }

    // ---- lookups -----------------------------------------------------------
    fn find(&self, key: u128, plen: u8) -> Option<usize> {
        let mut cur = self.root;
        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            if node.plen > plen || common_prefix_len(key, node.key, node.plen) < node.plen {
                return None;
            }
            if node.plen == plen {
                return Some(idx);
            }
            cur = node.children[get_bit(key, node.plen)];
        }
        None
    }

    fn get(&self, key: u128, plen: u8) -> Option<&EntryLabels> {
        self.find(key, plen).and_then(|idx| self.nodes[idx].entry.as_ref())
    }

    /// Stored ancestors of `(key, plen)`, shortest first, excluding an exact
    /// match.
    fn ancestors(&self, key: u128, plen: u8) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = self.root;
        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            if node.plen >= plen || common_prefix_len(key, node.key, node.plen) < node.plen {
                break;
            }
            if node.entry.is_some() {
                out.push(idx);
            }
            cur = node.children[get_bit(key, node.plen)];
        }
        out
    }

    /// Root of the subtree holding everything strictly inside `(key, plen)`.
    /// May be the exact node itself.
    fn subtree(&self, key: u128, plen: u8) -> Option<usize> {
        let mut cur = self.root;
        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            if node.plen >= plen {
                return covers(key, plen, node.key, node.plen).then_some(idx);
            }
            if common_prefix_len(key, node.key, node.plen) < node.plen {
                return None;
            }
            cur = node.children[get_bit(key, node.plen)];
        }
        None
    }

    /// Pre-order walk below `start`: shorter prefixes first, then by address.
    fn walk(&self, start: Option<usize>, mut f: impl FnMut(&Node) -> bool) {
        let mut stack: Vec<usize> = start.into_iter().collect();
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !f(node) {
                return;
            }
            for child in node.children.iter().rev().flatten() {
                stack.push(*child);
            }
        }
    }

    /// Whether any entry lies strictly inside `(key, plen)`.
    fn has_below(&self, key: u128, plen: u8) -> bool {
        let mut found = false;
        self.walk(self.subtree(key, plen), |n| {
            if n.plen > plen && n.entry.is_some() {
                found = true;
                return false;
            }
            true
        });
        found
    }

    // ---- mutation ----------------------------------------------------------
    /// Upsert. Returns the previous labels of an exact match.
    fn insert(&mut self, key: u128, plen: u8, labels: EntryLabels) -> Option<EntryLabels> {
        let mut slot = Slot::Root;
        loop {
            let Some(idx) = self.slot_get(slot) else {
                // Case 1: empty link
                let leaf = self.alloc(key, plen, Some(labels));
                self.slot_set(slot, Some(leaf));
                self.len += 1;
                return None;
            };
            let (nkey, nplen) = (self.nodes[idx].key, self.nodes[idx].plen);
            let cpl = common_prefix_len(key, nkey, plen.min(nplen));

            // Case 2a: exact match
            if cpl == plen && plen == nplen {
                let old = self.nodes[idx].entry.replace(labels);
                if old.is_none() {
                    self.len += 1;
                }
                return old;
            }
            // Case 2b: descend
            if cpl == nplen && plen > nplen {
                slot = Slot::Child(idx, get_bit(key, nplen));
                continue;
            }
            // Case 2c: insert above
            if cpl == plen && plen < nplen {
                let above = self.alloc(key, plen, Some(labels));
                self.nodes[above].children[get_bit(nkey, plen)] = Some(idx);
                self.slot_set(slot, Some(above));
                self.len += 1;
                return None;
            }
            // Case 2d: split at the first differing bit
            let branch = self.alloc(canonical(key, cpl), cpl, None);
            let leaf = self.alloc(key, plen, Some(labels));
            self.nodes[branch].children[get_bit(key, cpl)] = Some(leaf);
            self.nodes[branch].children[get_bit(nkey, cpl)] = Some(idx);
            self.slot_set(slot, Some(branch));
            self.len += 1;
            return None;
        }
    }

    fn remove(&mut self, key: u128, plen: u8) -> Option<EntryLabels> {
        let mut parent_slot: Option<Slot> = None;
        let mut slot = Slot::Root;
        loop {
            let idx = self.slot_get(slot)?;
            let node = &self.nodes[idx];
            if node.plen > plen || common_prefix_len(key, node.key, node.plen) < node.plen {
                return None;
            }
            if node.plen == plen {
                let entry = self.nodes[idx].entry.take()?;
                self.len -= 1;
                self.compact(slot);
                if let Some(ps) = parent_slot {
                    self.compact(ps);
                }
                return Some(entry);
            }
            let next = Slot::Child(idx, get_bit(key, node.plen));
            parent_slot = Some(slot);
            slot = next;
        }
    }

    /// Drop or bypass the entry-less node at `slot` when it no longer
    /// separates two subtrees.
    fn compact(&mut self, slot: Slot) {
        let Some(idx) = self.slot_get(slot) else { return };
        if self.nodes[idx].entry.is_some() {
            return;
        }
        match self.nodes[idx].children {
            [None, None] => {
                self.slot_set(slot, None);
                self.release(idx);
            }
            [Some(only), None] | [None, Some(only)] => {
                self.slot_set(slot, Some(only));
                self.release(idx);
            }
            _ => {}
        }
    }

    // ---- buddy search --------------------------------------------------------
    /// First free block of `bits` inside `(key, plen)`. `top` marks the
    /// parent block itself, whose own entry does not count as occupying it.
    fn buddy(&self, key: u128, plen: u8, bits: u8, top: bool) -> Option<u128> {
        if !top && self.get(key, plen).is_some() {
            return None;
        }
        if plen == bits {
            return (!top && !self.has_below(key, plen)).then_some(key);
        }
        if !self.has_below(key, plen) {
            return Some(key);
        }
        if cfg!(feature = "trace") {
            trace!("[BUDDY] splitting {:x}/{} looking for /{}", key, plen, bits);
        }
        self.buddy(key, plen + 1, bits, false)
            .or_else(|| self.buddy(upper_half(key, plen), plen + 1, bits, false))
    }
}

/// Per-index prefix trie covering both address families.
#[derive(Debug, Clone, Default)]
pub struct AddressTrie {
    v4: Tree,
    v6: Tree,
}

impl AddressTrie {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self, family: AddressFamily) -> &Tree {
        match family {
            AddressFamily::Ipv4 => &self.v4,
            AddressFamily::Ipv6 => &self.v6,
        }
    }

    fn tree_mut(&mut self, family: AddressFamily) -> &mut Tree {
        match family {
            AddressFamily::Ipv4 => &mut self.v4,
            AddressFamily::Ipv6 => &mut self.v6,
        }
    }

    fn entry_at(&self, family: AddressFamily, idx: usize) -> Option<Entry> {
        let node = &self.tree(family).nodes[idx];
        node.entry
            .as_ref()
            .map(|l| Entry::new(key_net(family, node.key, node.plen), l.clone()))
    }

    pub fn len(&self) -> usize {
        self.v4.len + self.v6.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, prefix: &IpNet) -> Option<&EntryLabels> {
        let (key, plen) = net_key(prefix);
        self.tree(AddressFamily::of_net(prefix)).get(key, plen)
    }

    /// Insert; fails when the exact prefix is already stored.
    pub fn add(&mut self, prefix: &IpNet, labels: EntryLabels) -> Result<(), Error> {
        if let Some(existing) = self.get(prefix) {
            return Err(Error::OwnershipConflict {
                prefix: prefix.trunc().to_string(),
                claim: existing.claim_name.clone(),
                owner: existing.owner.to_string(),
            });
        }
        self.set(prefix, labels);
        Ok(())
    }

    /// Upsert; returns the labels that were replaced.
    pub fn set(&mut self, prefix: &IpNet, labels: EntryLabels) -> Option<EntryLabels> {
        let (key, plen) = net_key(prefix);
        trace!("[TRIE] set {}", prefix.trunc());
        self.tree_mut(AddressFamily::of_net(prefix)).insert(key, plen, labels)
    }

    pub fn delete(&mut self, prefix: &IpNet) -> Option<EntryLabels> {
        let (key, plen) = net_key(prefix);
        trace!("[TRIE] delete {}", prefix.trunc());
        self.tree_mut(AddressFamily::of_net(prefix)).remove(key, plen)
    }

    /// Every stored strict ancestor of `prefix`, shortest first.
    pub fn parents(&self, prefix: &IpNet) -> Vec<Entry> {
        let family = AddressFamily::of_net(prefix);
        let (key, plen) = net_key(prefix);
        self.tree(family)
            .ancestors(key, plen)
            .into_iter()
            .filter_map(|idx| self.entry_at(family, idx))
            .collect()
    }

    /// Longest-prefix-match among the strict ancestors of `prefix`.
    pub fn most_specific_parent(&self, prefix: &IpNet) -> Option<Entry> {
        let family = AddressFamily::of_net(prefix);
        let (key, plen) = net_key(prefix);
        let last = *self.tree(family).ancestors(key, plen).last()?;
        self.entry_at(family, last)
    }

    /// Every stored strict descendant of `prefix`, in walk order.
    pub fn children(&self, prefix: &IpNet) -> Vec<Entry> {
        let family = AddressFamily::of_net(prefix);
        let (key, plen) = net_key(prefix);
        let tree = self.tree(family);
        let mut out = Vec::new();
        tree.walk(tree.subtree(key, plen), |n| {
            if n.plen > plen {
                if let Some(l) = &n.entry {
                    out.push(Entry::new(key_net(family, n.key, n.plen), l.clone()));
                }
            }
            true
        });
        out
    }

    /// Descendants whose most specific parent is `prefix` itself.
    pub fn direct_children(&self, prefix: &IpNet) -> Vec<Entry> {
        let (_, plen) = net_key(prefix);
        self.children(prefix)
            .into_iter()
            .filter(|c| {
                self.most_specific_parent(&c.prefix)
                    .is_some_and(|p| p.prefix.prefix_len() == plen)
            })
            .collect()
    }

    pub fn has_children(&self, prefix: &IpNet) -> bool {
        let (key, plen) = net_key(prefix);
        self.tree(AddressFamily::of_net(prefix)).has_below(key, plen)
    }

    /// All entries, IPv4 first, each family in walk order.
    pub fn entries(&self) -> Vec<Entry> {
        let mut out = Vec::with_capacity(self.len());
        for family in [AddressFamily::Ipv4, AddressFamily::Ipv6] {
            let tree = self.tree(family);
            tree.walk(tree.root, |n| {
                if let Some(l) = &n.entry {
                    out.push(Entry::new(key_net(family, n.key, n.plen), l.clone()));
                }
                true
            });
        }
        out
    }

    pub fn get_by_label(&self, selector: &Selector) -> Vec<Entry> {
        self.entries()
            .into_iter()
            .filter(|e| selector.matches(&e.labels.to_map()))
            .collect()
    }

    /// Entries matching a predicate on their structured labels.
    pub fn find(&self, pred: impl Fn(&EntryLabels) -> bool) -> Vec<Entry> {
        self.entries().into_iter().filter(|e| pred(&e.labels)).collect()
    }

    /// Lowest-addressed free block of `bits` inside `parent` that overlaps no
    /// stored entry below `parent`.
    pub fn get_available_prefix_by_bit_len(&self, parent: &IpNet, bits: u8) -> Option<IpNet> {
        let family = AddressFamily::of_net(parent);
        let (key, plen) = net_key(parent);
        if bits < plen || bits > family_bits(family) {
            return None;
        }
        self.tree(family)
            .buddy(key, plen, bits, true)
            .map(|k| key_net(family, k, bits))
    }

    /// Whether `prefix` could be stored without overlapping anything below
    /// its most specific parent.
    pub fn is_free(&self, prefix: &IpNet) -> bool {
        self.get(prefix).is_none() && !self.has_children(prefix)
    }
}
