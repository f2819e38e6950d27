//! The allocation engine: one registry of per-index state behind a single
//! `RwLock`, with storage-backed restore and entry sync.
//!
//! Every public mutating call takes the write lock exactly once and then
//! works through the `*_locked` variants, which `create_index` and
//! `delete_index` reuse for replay and teardown.

use crate::applicator;
use crate::config::EngineConfig;
use crate::constants::INDEX_OWNER_KIND;
use crate::errors::{Error, Result, StorageError};
use crate::instance::{InstanceRegistry, InstanceState};
use crate::storage::{Context, Storage};
use crate::types::*;
use ipnet::IpNet;
use log::{debug, error, info, warn};
use metrics::{counter, gauge, histogram};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

pub struct Engine {
    storage: Arc<dyn Storage>,
    config: EngineConfig,
    registry: RwLock<InstanceRegistry>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("storage", &self.storage)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: Arc<dyn Storage>, config: EngineConfig) -> Self {
        crate::ensure_logging();
        crate::telemetry::init();
        debug!("[ENGINE] new engine, config {:?}", config);
        Self { storage, config, registry: RwLock::new(InstanceRegistry::new()) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // A panic inside a locked section leaves at worst a half-applied claim,
    // which re-applying repairs; keep serving.
    fn read(&self) -> RwLockReadGuard<'_, InstanceRegistry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InstanceRegistry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    // ───────────────────────── index lifecycle ───────────────────────── //

    /// Create (or refresh) an index: restore it from storage if it is not
    /// initialized yet, reconcile its seeded aggregates and sync entries.
    pub fn create_index(&self, ctx: &Context, index: &Index) -> Result<()> {
        let mut reg = self.write();
        let key = &index.key;
        if reg.ensure(key) {
            info!("[INDEX] created {key}");
        }
        if !reg.is_initialized(key) {
            if let Err(e) = self.restore_locked(ctx, &mut reg, key) {
                error!("[RESTORE] {key} failed: {e}");
                reg.reset(key);
                return Err(e);
            }
        }
        self.reconcile_aggregates_locked(ctx, &mut reg, index)?;
        self.sync_locked(ctx, &reg, key)?;
        reg.set_initialized(key, true);
        info!("[INDEX] {key} ready with {} prefixes", index.prefixes.len());
        Ok(())
    }

    /// Remove an index with all its claims and entries.
    pub fn delete_index(&self, ctx: &Context, key: &IndexKey) -> Result<()> {
        let mut reg = self.write();
        if !reg.contains(key) {
            return Err(Error::IndexNotFound(key.clone()));
        }
        let claims = self.storage.list_claims(ctx, key, None)?;
        for claim in claims.values() {
            tolerate_missing(self.storage.delete_claim(ctx, claim))?;
        }
        for entry in self.storage.list_entries(ctx, key)? {
            tolerate_missing(self.storage.delete_entry(ctx, key, &entry))?;
        }
        reg.remove(key);
        gauge!("ipam_entries", "index" => key.to_string()).set(0.0);
        info!("[INDEX] deleted {key} ({} claims)", claims.len());
        Ok(())
    }

    // ───────────────────────── claims ────────────────────────────────── //

    /// Allocate or refresh `claim`. Its status is rewritten either way.
    pub fn claim(&self, ctx: &Context, claim: &mut Claim) -> Result<()> {
        let mut reg = self.write();
        if !reg.is_initialized(&claim.index) {
            return Err(Error::NotInitialized(claim.index.clone()));
        }
        self.claim_locked(ctx, &mut reg, claim)
    }

    /// Give back everything `claim` holds and drop its record.
    pub fn release(&self, ctx: &Context, claim: &Claim) -> Result<()> {
        let mut reg = self.write();
        if !reg.is_initialized(&claim.index) {
            return Err(Error::NotInitialized(claim.index.clone()));
        }
        self.release_locked(ctx, &mut reg, claim)
    }

    fn claim_locked(&self, ctx: &Context, reg: &mut InstanceRegistry, claim: &mut Claim) -> Result<()> {
        self.commit_locked(ctx, reg, claim)?;
        self.sync_locked(ctx, reg, &claim.index)
    }

    /// Apply and persist one claim, without syncing entries.
    fn commit_locked(&self, ctx: &Context, reg: &mut InstanceRegistry, claim: &mut Claim) -> Result<()> {
        let started = Instant::now();
        let state = reg
            .get_mut(&claim.index)
            .ok_or_else(|| Error::NotInitialized(claim.index.clone()))?;

        if let Err(e) = apply_claim(state, claim) {
            claim.status.condition = Condition::Failed {
                reason: e.reason().to_string(),
                message: e.to_string(),
            };
            counter!("ipam_claim_failures_total", "reason" => e.reason()).increment(1);
            warn!("[CLAIM] {}/{} rejected: {e}", claim.namespace, claim.name);
            return Err(e);
        }
        claim.status.condition = Condition::Ready;
        if self.config.persist_claims {
            self.upsert_claim(ctx, claim)?;
        }
        counter!("ipam_claims_total").increment(1);
        histogram!("ipam_claim_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            "[CLAIM] {}/{} ({}) ready: {}",
            claim.namespace,
            claim.name,
            claim.spec.kind.name(),
            describe(&claim.status)
        );
        Ok(())
    }

    fn release_locked(&self, ctx: &Context, reg: &mut InstanceRegistry, claim: &Claim) -> Result<()> {
        let state = reg
            .get_mut(&claim.index)
            .ok_or_else(|| Error::NotInitialized(claim.index.clone()))?;
        applicator::for_claim(claim).delete(state, claim)?;
        self.sync_locked(ctx, reg, &claim.index)?;
        tolerate_missing(self.storage.delete_claim(ctx, claim))?;
        counter!("ipam_releases_total").increment(1);
        info!("[RELEASE] {}/{}", claim.namespace, claim.name);
        Ok(())
    }

    fn upsert_claim(&self, ctx: &Context, claim: &Claim) -> Result<()> {
        match self.storage.get_claim(ctx, &claim.index, &claim.id())? {
            Some(old) if old == *claim => {}
            Some(old) => self.storage.update_claim(ctx, claim, &old)?,
            None => self.storage.create_claim(ctx, claim)?,
        }
        Ok(())
    }

    // ───────────────────────── restore ───────────────────────────────── //

    /// Rebuild an index from its persisted claims, in dependency order.
    fn restore_locked(&self, ctx: &Context, reg: &mut InstanceRegistry, key: &IndexKey) -> Result<()> {
        reg.reset(key);
        let mut claims: Vec<Claim> = self.storage.list_claims(ctx, key, None)?.into_values().collect();
        claims.sort_by(|a, b| replay_order(a).cmp(&replay_order(b)).then_with(|| a.name.cmp(&b.name)));
        info!("[RESTORE] {key}: replaying {} claims", claims.len());

        let state = reg.get_mut(key).ok_or_else(|| Error::IndexNotFound(key.clone()))?;
        let mut restored = 0u64;
        for mut claim in claims {
            let before = claim.clone();
            claim.index = key.clone();
            match apply_claim(state, &mut claim) {
                Ok(()) => {
                    claim.status.condition = Condition::Ready;
                    restored += 1;
                    debug!("[RESTORE] {} -> {}", claim.name, describe(&claim.status));
                }
                Err(e) => {
                    warn!("[RESTORE] {} no longer applies: {e}", claim.name);
                    claim.status.condition = Condition::Failed {
                        reason: e.reason().to_string(),
                        message: e.to_string(),
                    };
                    counter!("ipam_claim_failures_total", "reason" => e.reason()).increment(1);
                }
            }
            if claim != before {
                self.storage.update_claim(ctx, &claim, &before)?;
            }
        }
        counter!("ipam_restored_claims_total").increment(restored);
        Ok(())
    }

    /// Make the index-owned aggregate claims match the index's prefix list.
    fn reconcile_aggregates_locked(&self, ctx: &Context, reg: &mut InstanceRegistry, index: &Index) -> Result<()> {
        let key = &index.key;
        let existing = self.storage.list_claims(ctx, key, Some(INDEX_OWNER_KIND))?;
        let wanted = index.aggregate_claims();

        for mut claim in wanted.iter().cloned() {
            let mut labels = self.config.seed_labels.clone();
            labels.extend(claim.spec.labels);
            claim.spec.labels = labels;
            if let Some(old) = existing.get(&claim.id()) {
                claim.uid = old.uid.clone();
                claim.status = old.status.clone();
            }
            match self.commit_locked(ctx, reg, &mut claim) {
                Ok(()) => {}
                Err(e @ Error::Storage(_)) => return Err(e),
                Err(e) => warn!("[INDEX] {key}: seeded aggregate {} rejected: {e}", claim.name),
            }
        }

        for (id, old) in &existing {
            if wanted.iter().any(|w| w.id() == *id) {
                continue;
            }
            info!("[INDEX] {key}: dropping aggregate {}", old.name);
            self.release_locked(ctx, reg, old)?;
        }
        Ok(())
    }

    // ───────────────────────── persistence sync ──────────────────────── //

    /// Push the live entry set of `key` to storage.
    fn sync_locked(&self, ctx: &Context, reg: &InstanceRegistry, key: &IndexKey) -> Result<()> {
        let state = reg.get(key).ok_or_else(|| Error::IndexNotFound(key.clone()))?;
        let live: BTreeMap<IpNet, Entry> = state.entries().into_iter().map(|e| (e.prefix, e)).collect();
        let persisted: BTreeMap<IpNet, Entry> = self
            .storage
            .list_entries(ctx, key)?
            .into_iter()
            .map(|e| (e.prefix, e))
            .collect();

        let (mut created, mut updated, mut pruned) = (0usize, 0usize, 0usize);
        for (prefix, entry) in &live {
            match persisted.get(prefix) {
                None => {
                    self.storage.create_entry(ctx, key, entry)?;
                    created += 1;
                }
                Some(old) if old != entry => {
                    self.storage.update_entry(ctx, key, entry, old)?;
                    updated += 1;
                }
                Some(_) => {}
            }
        }
        if self.config.prune_stale_entries {
            for (prefix, old) in &persisted {
                if !live.contains_key(prefix) {
                    tolerate_missing(self.storage.delete_entry(ctx, key, old))?;
                    pruned += 1;
                }
            }
        }
        if created + updated + pruned > 0 {
            debug!("[SYNC] {key}: +{created} ~{updated} -{pruned}");
        }
        gauge!("ipam_entries", "index" => key.to_string()).set(live.len() as f64);
        Ok(())
    }

    // ───────────────────────── queries ───────────────────────────────── //

    pub fn is_initialized(&self, key: &IndexKey) -> bool {
        self.read().is_initialized(key)
    }

    /// Every entry of an index, IPv4 first.
    pub fn entries(&self, key: &IndexKey) -> Result<Vec<Entry>> {
        self.with_state(key, InstanceState::entries)
    }

    /// Members of the range claimed as `range_name`, in address order.
    pub fn range_members(&self, key: &IndexKey, range_name: &str) -> Result<Vec<(IpAddr, EntryLabels)>> {
        self.with_state(key, |s| s.ranges.get(range_name).map(|r| r.members()).unwrap_or_default())
    }

    fn with_state<T>(&self, key: &IndexKey, f: impl FnOnce(&InstanceState) -> T) -> Result<T> {
        let reg = self.read();
        if !reg.contains(key) {
            return Err(Error::IndexNotFound(key.clone()));
        }
        if !reg.is_initialized(key) {
            return Err(Error::NotInitialized(key.clone()));
        }
        reg.get(key).map(f).ok_or_else(|| Error::IndexNotFound(key.clone()))
    }
}

// ───────────────────────── helpers ─────────────────────────────────── //

fn apply_claim(state: &mut InstanceState, claim: &mut Claim) -> Result<()> {
    let mut app = applicator::for_claim(claim);
    app.validate(state, claim)?;
    app.apply(state, claim)
}

/// Replay position of a claim during restore. Blocks replay before
/// anything that can sit inside them: prefixes go shortest first, with
/// static ones ahead of dynamic ones of the same length, then ranges, then
/// addresses.
fn replay_order(claim: &Claim) -> (u8, u8, u8) {
    match &claim.spec.kind {
        ClaimKind::StaticPrefix(p) if claim.is_index_owned() => (0, p.prefix_len(), 0),
        ClaimKind::StaticPrefix(p) => (1, p.prefix_len(), 0),
        ClaimKind::DynamicPrefix { prefix_length, .. } => (1, *prefix_length, 1),
        ClaimKind::StaticRange(_) => (2, 0, 0),
        ClaimKind::StaticAddress(_) => (3, 0, 0),
        ClaimKind::DynamicAddress { .. } => (4, 0, 0),
    }
}

fn tolerate_missing(r: Result<(), StorageError>) -> Result<()> {
    match r {
        Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn describe(status: &ClaimStatus) -> String {
    status
        .address
        .as_deref()
        .or(status.prefix.as_deref())
        .or(status.range.as_deref())
        .unwrap_or("-")
        .to_string()
}
