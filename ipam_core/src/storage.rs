//! Persistence seam. The engine lists, creates, updates and deletes entry
//! and claim records through [`Storage`]; everything it knows at startup it
//! rebuilds from claim records.

use crate::errors::StorageError;
use crate::types::{Claim, ClaimId, Entry, EntryLabels, IndexKey};
use dashmap::DashMap;
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type StorageResult<T> = Result<T, StorageError>;

/// Carried through every storage call. The engine never inspects it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait Storage: Send + Sync + fmt::Debug + 'static {
    fn list_entries(&self, ctx: &Context, index: &IndexKey) -> StorageResult<Vec<Entry>>;
    fn create_entry(&self, ctx: &Context, index: &IndexKey, entry: &Entry) -> StorageResult<()>;
    fn update_entry(&self, ctx: &Context, index: &IndexKey, new: &Entry, old: &Entry) -> StorageResult<()>;
    fn delete_entry(&self, ctx: &Context, index: &IndexKey, entry: &Entry) -> StorageResult<()>;

    /// Claims of `index`, optionally only those whose owner has `owner_kind`.
    fn list_claims(
        &self,
        ctx: &Context,
        index: &IndexKey,
        owner_kind: Option<&str>,
    ) -> StorageResult<BTreeMap<ClaimId, Claim>>;
    fn get_claim(&self, ctx: &Context, index: &IndexKey, id: &ClaimId) -> StorageResult<Option<Claim>>;
    fn create_claim(&self, ctx: &Context, claim: &Claim) -> StorageResult<()>;
    fn update_claim(&self, ctx: &Context, new: &Claim, old: &Claim) -> StorageResult<()>;
    fn delete_claim(&self, ctx: &Context, claim: &Claim) -> StorageResult<()>;
}

// ─────────────────────────── in-memory ──────────────────────────────── //

#[derive(Debug, Default)]
struct Shelf {
    // entries are kept in their flattened label form
    entries: BTreeMap<IpNet, BTreeMap<String, String>>,
    claims: BTreeMap<ClaimId, Claim>,
}

/// Process-local [`Storage`]. Shared between engines through an `Arc` to
/// emulate a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    shelves: DashMap<IndexKey, Shelf>,
    offline: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a backend error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn entry_count(&self, index: &IndexKey) -> usize {
        self.shelves.get(index).map_or(0, |s| s.entries.len())
    }

    pub fn claim_count(&self, index: &IndexKey) -> usize {
        self.shelves.get(index).map_or(0, |s| s.claims.len())
    }

    fn gate(&self, ctx: &Context) -> StorageResult<()> {
        if ctx.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("storage is offline".to_string()));
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn list_entries(&self, ctx: &Context, index: &IndexKey) -> StorageResult<Vec<Entry>> {
        self.gate(ctx)?;
        let Some(shelf) = self.shelves.get(index) else {
            return Ok(Vec::new());
        };
        shelf
            .entries
            .iter()
            .map(|(prefix, map)| {
                EntryLabels::from_map(map)
                    .map(|labels| Entry::new(*prefix, labels))
                    .map_err(|e| StorageError::Backend(format!("entry {prefix}: {e}")))
            })
            .collect()
    }

    fn create_entry(&self, ctx: &Context, index: &IndexKey, entry: &Entry) -> StorageResult<()> {
        self.gate(ctx)?;
        let mut shelf = self.shelves.entry(index.clone()).or_default();
        if shelf.entries.contains_key(&entry.prefix) {
            return Err(StorageError::AlreadyExists(entry.prefix.to_string()));
        }
        shelf.entries.insert(entry.prefix, entry.labels.to_map());
        Ok(())
    }

    fn update_entry(&self, ctx: &Context, index: &IndexKey, new: &Entry, old: &Entry) -> StorageResult<()> {
        self.gate(ctx)?;
        let mut shelf = self
            .shelves
            .get_mut(index)
            .ok_or_else(|| StorageError::NotFound(index.to_string()))?;
        if shelf.entries.remove(&old.prefix).is_none() {
            return Err(StorageError::NotFound(old.prefix.to_string()));
        }
        shelf.entries.insert(new.prefix, new.labels.to_map());
        Ok(())
    }

    fn delete_entry(&self, ctx: &Context, index: &IndexKey, entry: &Entry) -> StorageResult<()> {
        self.gate(ctx)?;
        let mut shelf = self
            .shelves
            .get_mut(index)
            .ok_or_else(|| StorageError::NotFound(index.to_string()))?;
        shelf
            .entries
            .remove(&entry.prefix)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(entry.prefix.to_string()))
    }

    fn list_claims(
        &self,
        ctx: &Context,
        index: &IndexKey,
        owner_kind: Option<&str>,
    ) -> StorageResult<BTreeMap<ClaimId, Claim>> {
        self.gate(ctx)?;
        let Some(shelf) = self.shelves.get(index) else {
            return Ok(BTreeMap::new());
        };
        Ok(shelf
            .claims
            .iter()
            .filter(|(_, c)| owner_kind.map_or(true, |k| c.spec.owner.kind == k))
            .map(|(id, c)| (id.clone(), c.clone()))
            .collect())
    }

    fn get_claim(&self, ctx: &Context, index: &IndexKey, id: &ClaimId) -> StorageResult<Option<Claim>> {
        self.gate(ctx)?;
        Ok(self.shelves.get(index).and_then(|s| s.claims.get(id).cloned()))
    }

    fn create_claim(&self, ctx: &Context, claim: &Claim) -> StorageResult<()> {
        self.gate(ctx)?;
        let mut shelf = self.shelves.entry(claim.index.clone()).or_default();
        let id = claim.id();
        if shelf.claims.contains_key(&id) {
            return Err(StorageError::AlreadyExists(id.to_string()));
        }
        shelf.claims.insert(id, claim.clone());
        Ok(())
    }

    fn update_claim(&self, ctx: &Context, new: &Claim, old: &Claim) -> StorageResult<()> {
        self.gate(ctx)?;
        let mut shelf = self
            .shelves
            .get_mut(&old.index)
            .ok_or_else(|| StorageError::NotFound(old.index.to_string()))?;
        let id = old.id();
        if !shelf.claims.contains_key(&id) {
            return Err(StorageError::NotFound(id.to_string()));
        }
        shelf.claims.insert(id, new.clone());
        Ok(())
    }

    fn delete_claim(&self, ctx: &Context, claim: &Claim) -> StorageResult<()> {
        self.gate(ctx)?;
        let mut shelf = self
            .shelves
            .get_mut(&claim.index)
            .ok_or_else(|| StorageError::NotFound(claim.index.to_string()))?;
        shelf
            .claims
            .remove(&claim.id())
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(claim.id().to_string()))
    }
}
