use ipam_core::constants::{LABEL_BLOCK_KIND, LABEL_CLAIM_NAME, LABEL_SUBNET};
use ipam_core::*;
use std::sync::Arc;

fn key() -> IndexKey {
    IndexKey::new("default", "rt")
}

fn index() -> Index {
    Index::new(key()).with_prefix("10.0.0.0/8".parse().unwrap())
}

fn dynamic_prefix(name: &str, len: u8) -> Claim {
    let selector = Selector::new().with_label(LABEL_BLOCK_KIND, "aggregate");
    Claim::new(key(), "default", name, ClaimKind::DynamicPrefix { selector, prefix_length: len })
}

fn by_prefix(entries: Vec<Entry>) -> Vec<(String, String)> {
    entries
        .into_iter()
        .map(|e| (e.prefix.to_string(), e.labels.claim_name))
        .collect()
}

#[test]
fn restart_reproduces_dynamic_allocations() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Context::new();

    let first = Engine::new(storage.clone());
    first.create_index(&ctx, &index()).unwrap();
    let mut claims: Vec<Claim> = ["a", "b", "c"].iter().map(|n| dynamic_prefix(n, 24)).collect();
    for c in claims.iter_mut() {
        first.claim(&ctx, c).unwrap();
    }
    // leave a hole so replay cannot just refill from the bottom
    first.release(&ctx, &claims[0]).unwrap();

    let mut net = Claim::new(key(), "default", "net", ClaimKind::StaticPrefix("10.9.0.0/24".parse().unwrap()));
    net.spec.block_kind = BlockKind::Network;
    first.claim(&ctx, &mut net).unwrap();
    let mut host = Claim::new(key(), "default", "host", ClaimKind::DynamicAddress {
        selector: Selector::new().with_label("ipam.dev/claim-name", "net"),
    });
    first.claim(&ctx, &mut host).unwrap();
    let before = by_prefix(first.entries(&key()).unwrap());

    let second = Engine::new(storage.clone());
    assert!(!second.is_initialized(&key()));
    second.create_index(&ctx, &index()).unwrap();
    assert_eq!(by_prefix(second.entries(&key()).unwrap()), before);

    let stored = storage.get_claim(&ctx, &key(), &claims[1].id()).unwrap().unwrap();
    assert_eq!(stored.status.prefix.as_deref(), Some("10.0.1.0/24"));
    assert!(stored.status.is_ready());

    // a new claim still lands in the hole
    let mut d = dynamic_prefix("d", 24);
    second.claim(&ctx, &mut d).unwrap();
    assert_eq!(d.status.prefix.as_deref(), Some("10.0.0.0/24"));

    let mut again = host.clone();
    second.claim(&ctx, &mut again).unwrap();
    assert_eq!(again.status.address, host.status.address);
}

fn restart(storage: &Arc<MemoryStorage>) -> Engine {
    let engine = Engine::new(storage.clone());
    engine.create_index(&Context::new(), &index()).unwrap();
    engine
}

fn stored(storage: &MemoryStorage, c: &Claim) -> Claim {
    storage.get_claim(&Context::new(), &key(), &c.id()).unwrap().unwrap()
}

#[test]
fn nested_dynamic_pools_come_back_in_place() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Context::new();
    let first = restart(&storage);

    let mut outer = dynamic_prefix("z-outer", 16);
    outer.spec.block_kind = BlockKind::Pool;
    first.claim(&ctx, &mut outer).unwrap();
    let in_outer = Selector::new().with_label(LABEL_CLAIM_NAME, "z-outer");
    let mut inner = Claim::new(key(), "default", "a-inner", ClaimKind::DynamicPrefix { selector: in_outer, prefix_length: 24 });
    inner.spec.block_kind = BlockKind::Pool;
    first.claim(&ctx, &mut inner).unwrap();
    assert_eq!(inner.status.prefix.as_deref(), Some("10.0.0.0/24"));
    let before = by_prefix(first.entries(&key()).unwrap());

    let second = restart(&storage);
    assert_eq!(by_prefix(second.entries(&key()).unwrap()), before);
    assert!(stored(&storage, &inner).status.is_ready());
}

#[test]
fn dynamic_block_keeps_its_place_around_static_children() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Context::new();
    let first = restart(&storage);

    let mut outer = dynamic_prefix("outer", 16);
    outer.spec.block_kind = BlockKind::Pool;
    first.claim(&ctx, &mut outer).unwrap();
    assert_eq!(outer.status.prefix.as_deref(), Some("10.0.0.0/16"));
    let mut fixed = Claim::new(key(), "default", "fixed", ClaimKind::StaticPrefix("10.0.5.0/24".parse().unwrap()));
    fixed.spec.block_kind = BlockKind::Pool;
    first.claim(&ctx, &mut fixed).unwrap();
    let before = by_prefix(first.entries(&key()).unwrap());

    let second = restart(&storage);
    assert_eq!(by_prefix(second.entries(&key()).unwrap()), before);
    assert_eq!(stored(&storage, &outer).status.prefix.as_deref(), Some("10.0.0.0/16"));
}

#[test]
fn range_members_survive_a_restart() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Context::new();
    let first = restart(&storage);

    let mut pool = Claim::new(key(), "default", "pool", ClaimKind::StaticPrefix("10.0.0.0/24".parse().unwrap()));
    pool.spec.block_kind = BlockKind::Pool;
    first.claim(&ctx, &mut pool).unwrap();
    first
        .claim(&ctx, &mut Claim::new(key(), "default", "r1", ClaimKind::StaticRange("10.0.0.10-10.0.0.20".parse().unwrap())))
        .unwrap();
    let mut fixed = Claim::new(key(), "default", "fixed", ClaimKind::StaticAddress("10.0.0.12".parse().unwrap()));
    first.claim(&ctx, &mut fixed).unwrap();
    let in_range = Selector::new().with_label(LABEL_CLAIM_NAME, "r1");
    let mut picked = Claim::new(key(), "default", "picked", ClaimKind::DynamicAddress { selector: in_range.clone() });
    first.claim(&ctx, &mut picked).unwrap();
    assert_eq!(picked.status.address.as_deref(), Some("10.0.0.10"));
    let members = first.range_members(&key(), "r1").unwrap();

    let second = restart(&storage);
    assert_eq!(second.range_members(&key(), "r1").unwrap(), members);
    let mut next = Claim::new(key(), "default", "next", ClaimKind::DynamicAddress { selector: in_range });
    second.claim(&ctx, &mut next).unwrap();
    assert_eq!(next.status.address.as_deref(), Some("10.0.0.11"));
}

#[test]
fn dynamic_address_keeps_address_and_gateway() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Context::new();
    let first = restart(&storage);

    let mut gw = Claim::new(key(), "default", "gw", ClaimKind::StaticPrefix("10.0.0.254/24".parse().unwrap()));
    gw.spec.block_kind = BlockKind::Network;
    gw.spec.default_gateway = true;
    first.claim(&ctx, &mut gw).unwrap();
    let sel = Selector::new().with_label(LABEL_SUBNET, "10.0.0.0/24");
    let mut early = Claim::new(key(), "default", "early", ClaimKind::DynamicAddress { selector: sel.clone() });
    let mut late = Claim::new(key(), "default", "late", ClaimKind::DynamicAddress { selector: sel.clone() });
    first.claim(&ctx, &mut early).unwrap();
    first.claim(&ctx, &mut late).unwrap();
    assert_eq!(late.status.address.as_deref(), Some("10.0.0.2/24"));
    // leave .1 free so replay could only land on .2 by reclaiming it
    first.release(&ctx, &early).unwrap();

    let second = restart(&storage);
    let back = stored(&storage, &late);
    assert_eq!(back.status.address.as_deref(), Some("10.0.0.2/24"));
    assert_eq!(back.status.default_gateway.as_deref(), Some("10.0.0.254"));

    let mut fresh = Claim::new(key(), "default", "fresh", ClaimKind::DynamicAddress { selector: sel });
    second.claim(&ctx, &mut fresh).unwrap();
    assert_eq!(fresh.status.address.as_deref(), Some("10.0.0.1/24"));
    assert_eq!(fresh.status.default_gateway.as_deref(), Some("10.0.0.254"));
}

#[test]
fn storage_failure_leaves_index_uninitialized() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Context::new();
    let engine = Engine::new(storage.clone());

    storage.set_offline(true);
    let err = engine.create_index(&ctx, &index()).unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Backend(_))), "{err}");
    assert!(!engine.is_initialized(&key()));

    storage.set_offline(false);
    engine.create_index(&ctx, &index()).unwrap();
    assert!(engine.is_initialized(&key()));
}

#[test]
fn cancelled_context_surfaces_as_storage_error() {
    let engine = Engine::new(Arc::new(MemoryStorage::new()));
    let ctx = Context::new();
    ctx.cancel();
    let err = engine.create_index(&ctx, &index()).unwrap_err();
    assert_eq!(err, Error::Storage(StorageError::Cancelled));
}

#[test]
fn replayed_claim_that_no_longer_fits_is_marked_failed() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Context::new();
    let mut stray = Claim::new(key(), "default", "stray", ClaimKind::StaticPrefix("11.0.0.0/16".parse().unwrap()));
    stray.status.condition = Condition::Ready;
    storage.create_claim(&ctx, &stray).unwrap();

    let engine = Engine::new(storage.clone());
    engine.create_index(&ctx, &index()).unwrap();
    assert!(engine.is_initialized(&key()));

    let stored = storage.get_claim(&ctx, &key(), &stray.id()).unwrap().unwrap();
    assert!(matches!(
        stored.status.condition,
        Condition::Failed { ref reason, .. } if reason == "NoParent"
    ));
}

#[test]
fn stale_entries_are_pruned_unless_disabled() {
    let ctx = Context::new();
    let junk = {
        let c = Claim::new(key(), "default", "gone", ClaimKind::StaticPrefix("10.7.0.0/16".parse().unwrap()));
        Entry::new("10.7.0.0/16".parse().unwrap(), c.entry_labels(ClaimShape::Prefix, AddressFamily::Ipv4))
    };

    let storage = Arc::new(MemoryStorage::new());
    storage.create_entry(&ctx, &key(), &junk).unwrap();
    Engine::new(storage.clone()).create_index(&ctx, &index()).unwrap();
    assert_eq!(storage.entry_count(&key()), 1);

    let storage = Arc::new(MemoryStorage::new());
    storage.create_entry(&ctx, &key(), &junk).unwrap();
    let config = EngineConfig { prune_stale_entries: false, ..Default::default() };
    Engine::with_config(storage.clone(), config).create_index(&ctx, &index()).unwrap();
    assert_eq!(storage.entry_count(&key()), 2);
}
