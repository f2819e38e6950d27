use ipam_core::constants::{LABEL_BLOCK_KIND, LABEL_CLAIM_NAME, LABEL_SUBNET};
use ipam_core::*;
use std::sync::Arc;

fn key() -> IndexKey {
    IndexKey::new("default", "rt")
}

fn index(prefixes: &[&str]) -> Index {
    prefixes
        .iter()
        .fold(Index::new(key()), |ix, p| ix.with_prefix(p.parse().unwrap()))
}

fn setup(prefixes: &[&str]) -> (Arc<MemoryStorage>, Engine) {
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::new(storage.clone());
    engine.create_index(&Context::new(), &index(prefixes)).unwrap();
    (storage, engine)
}

fn prefix_claim(name: &str, prefix: &str, kind: BlockKind) -> Claim {
    let mut c = Claim::new(key(), "default", name, ClaimKind::StaticPrefix(prefix.parse().unwrap()));
    c.spec.block_kind = kind;
    c
}

fn address_claim(name: &str, address: &str) -> Claim {
    Claim::new(key(), "default", name, ClaimKind::StaticAddress(address.parse().unwrap()))
}

fn range_claim(name: &str, range: &str) -> Claim {
    Claim::new(key(), "default", name, ClaimKind::StaticRange(range.parse().unwrap()))
}

fn dynamic_prefix(name: &str, selector: Selector, len: u8) -> Claim {
    Claim::new(key(), "default", name, ClaimKind::DynamicPrefix { selector, prefix_length: len })
}

fn dynamic_address(name: &str, selector: Selector) -> Claim {
    Claim::new(key(), "default", name, ClaimKind::DynamicAddress { selector })
}

fn aggregates() -> Selector {
    Selector::new().with_label(LABEL_BLOCK_KIND, "aggregate")
}

fn claim(engine: &Engine, c: &mut Claim) -> Result<()> {
    engine.claim(&Context::new(), c)
}

#[test]
fn static_prefix_is_idempotent() {
    let (storage, engine) = setup(&["10.0.0.0/8"]);
    let mut c = prefix_claim("pool-a", "10.1.0.0/16", BlockKind::Pool);
    claim(&engine, &mut c).unwrap();
    let first = engine.entries(&key()).unwrap();
    claim(&engine, &mut c).unwrap();
    assert_eq!(engine.entries(&key()).unwrap(), first);
    assert_eq!(c.status.prefix.as_deref(), Some("10.1.0.0/16"));
    assert!(c.status.is_ready());
    assert_eq!(storage.entry_count(&key()), first.len());
    assert_eq!(storage.claim_count(&key()), 2);
}

#[test]
fn network_in_network_is_rejected() {
    let (_, engine) = setup(&["172.0.0.0/8"]);
    let mut outer = prefix_claim("outer", "172.0.0.0/16", BlockKind::Network);
    claim(&engine, &mut outer).unwrap();
    let mut inner = prefix_claim("inner", "172.0.0.0/27", BlockKind::Network);
    let err = claim(&engine, &mut inner).unwrap_err();
    assert!(matches!(err, Error::NestingViolation(_)), "{err}");
    assert!(matches!(
        inner.status.condition,
        Condition::Failed { ref reason, .. } if reason == "NestingViolation"
    ));
}

#[test]
fn prefix_needs_a_parent() {
    let (_, engine) = setup(&[]);
    let mut c = prefix_claim("orphan", "10.0.0.0/8", BlockKind::Other);
    assert!(matches!(claim(&engine, &mut c), Err(Error::NoParent(_))));

    let (_, engine) = setup(&["172.0.0.0/8"]);
    let mut c = prefix_claim("child", "172.0.0.0/16", BlockKind::Other);
    claim(&engine, &mut c).unwrap();
    assert_eq!(c.status.prefix.as_deref(), Some("172.0.0.0/16"));
}

#[test]
fn conflicting_owner_is_rejected() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    claim(&engine, &mut prefix_claim("a", "10.0.0.0/24", BlockKind::Other)).unwrap();
    let err = claim(&engine, &mut prefix_claim("b", "10.0.0.0/24", BlockKind::Other)).unwrap_err();
    assert!(matches!(err, Error::OwnershipConflict { ref claim, .. } if claim == "a"));
}

#[test]
fn host_bits_need_network_kind() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    let mut c = prefix_claim("bad", "10.0.0.1/24", BlockKind::Pool);
    assert!(matches!(claim(&engine, &mut c), Err(Error::Syntax(_))));
}

#[test]
fn dynamic_prefixes_fill_in_order() {
    let (_, engine) = setup(&["10.0.0.0/16"]);
    let got: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|n| {
            let mut c = dynamic_prefix(n, aggregates(), 24);
            claim(&engine, &mut c).unwrap();
            c.status.prefix.unwrap()
        })
        .collect();
    assert_eq!(got, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);

    // re-claiming keeps the same block
    let mut b = dynamic_prefix("b", aggregates(), 24);
    claim(&engine, &mut b).unwrap();
    assert_eq!(b.status.prefix.as_deref(), Some("10.0.1.0/24"));
}

#[test]
fn small_aggregate_exhausts() {
    let (_, engine) = setup(&["10.0.0.0/23"]);
    claim(&engine, &mut dynamic_prefix("a", aggregates(), 24)).unwrap();
    claim(&engine, &mut dynamic_prefix("b", aggregates(), 24)).unwrap();
    let err = claim(&engine, &mut dynamic_prefix("c", aggregates(), 24)).unwrap_err();
    assert!(matches!(err, Error::ExhaustedPool(_)), "{err}");

    let nothing = Selector::new().with_label(LABEL_CLAIM_NAME, "missing");
    let err = claim(&engine, &mut dynamic_prefix("d", nothing, 24)).unwrap_err();
    assert!(matches!(err, Error::NoParent(_)), "{err}");
}

#[test]
fn released_blocks_are_reused() {
    let (_, engine) = setup(&["10.0.0.0/16"]);
    let mut a = dynamic_prefix("a", aggregates(), 24);
    claim(&engine, &mut a).unwrap();
    engine.release(&Context::new(), &a).unwrap();
    let mut b = dynamic_prefix("b", aggregates(), 24);
    claim(&engine, &mut b).unwrap();
    assert_eq!(b.status.prefix.as_deref(), Some("10.0.0.0/24"));
}

#[test]
fn range_partial_overlap_is_rejected() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    claim(&engine, &mut prefix_claim("pool", "10.0.0.0/24", BlockKind::Pool)).unwrap();
    let mut r1 = range_claim("r1", "10.0.0.10-10.0.0.20");
    claim(&engine, &mut r1).unwrap();
    assert_eq!(r1.status.range.as_deref(), Some("10.0.0.10-10.0.0.20"));
    claim(&engine, &mut r1).unwrap();

    let err = claim(&engine, &mut range_claim("r2", "10.0.0.15-10.0.0.30")).unwrap_err();
    assert!(matches!(err, Error::InconsistentRange(_)), "{err}");
}

#[test]
fn range_cannot_sit_in_aggregate() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    let err = claim(&engine, &mut range_claim("r", "10.0.0.10-10.0.0.20")).unwrap_err();
    assert!(matches!(err, Error::NestingViolation(_)), "{err}");
}

#[test]
fn addresses_inside_a_range_use_its_allocator() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    claim(&engine, &mut prefix_claim("pool", "10.0.0.0/24", BlockKind::Pool)).unwrap();
    claim(&engine, &mut range_claim("r1", "10.0.0.10-10.0.0.20")).unwrap();

    let mut fixed = address_claim("fixed", "10.0.0.10");
    claim(&engine, &mut fixed).unwrap();
    assert_eq!(fixed.status.range_name.as_deref(), Some("r1"));

    let mut dynamic = dynamic_address("dyn", Selector::new().with_label(LABEL_CLAIM_NAME, "r1"));
    claim(&engine, &mut dynamic).unwrap();
    assert_eq!(dynamic.status.address.as_deref(), Some("10.0.0.11"));
    assert_eq!(dynamic.status.range_name.as_deref(), Some("r1"));

    let members: Vec<String> = engine
        .range_members(&key(), "r1")
        .unwrap()
        .iter()
        .map(|(a, _)| a.to_string())
        .collect();
    assert_eq!(members, vec!["10.0.0.10", "10.0.0.11"]);

    let err = claim(&engine, &mut address_claim("other", "10.0.0.10")).unwrap_err();
    assert!(matches!(err, Error::OwnershipConflict { .. }));

    engine.release(&Context::new(), &fixed).unwrap();
    assert_eq!(engine.range_members(&key(), "r1").unwrap().len(), 1);
}

#[test]
fn dynamic_address_in_network_gets_mask_and_gateway() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    let mut gw = prefix_claim("gw", "10.0.0.254/24", BlockKind::Network);
    gw.spec.default_gateway = true;
    claim(&engine, &mut gw).unwrap();
    assert_eq!(gw.status.prefix.as_deref(), Some("10.0.0.254/24"));

    let sel = Selector::new().with_label(LABEL_SUBNET, "10.0.0.0/24");
    let mut host = dynamic_address("host", sel);
    claim(&engine, &mut host).unwrap();
    assert_eq!(host.status.address.as_deref(), Some("10.0.0.1/24"));
    assert_eq!(host.status.default_gateway.as_deref(), Some("10.0.0.254"));
}

#[test]
fn static_address_in_network_needs_mask() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    claim(&engine, &mut prefix_claim("net", "10.0.0.0/24", BlockKind::Network)).unwrap();
    let err = claim(&engine, &mut address_claim("bare", "10.0.0.5")).unwrap_err();
    assert!(matches!(err, Error::NestingViolation(_)), "{err}");

    let mut masked = address_claim("masked", "10.0.0.5/24");
    claim(&engine, &mut masked).unwrap();
    assert_eq!(masked.status.address.as_deref(), Some("10.0.0.5/24"));

    // network and broadcast addresses are reserved
    let err = claim(&engine, &mut address_claim("bcast", "10.0.0.255/24")).unwrap_err();
    assert!(matches!(err, Error::OwnershipConflict { .. }), "{err}");
}

#[test]
fn address_cannot_sit_in_aggregate() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    let err = claim(&engine, &mut address_claim("a", "10.0.0.5")).unwrap_err();
    assert!(matches!(err, Error::NestingViolation(_)), "{err}");
    let err = claim(&engine, &mut address_claim("b", "11.0.0.5")).unwrap_err();
    assert!(matches!(err, Error::NoParent(_)), "{err}");
}

fn entry<'a>(entries: &'a [Entry], prefix: &str) -> Option<&'a Entry> {
    entries.iter().find(|e| e.prefix.to_string() == prefix)
}

#[test]
fn shared_subnet_passes_to_another_network_claim() {
    let (storage, engine) = setup(&["10.0.0.0/8"]);
    let ctx = Context::new();
    let mut a = prefix_claim("a", "10.0.0.1/24", BlockKind::Network);
    let mut b = prefix_claim("b", "10.0.0.2/24", BlockKind::Network);
    let mut tenant = address_claim("tenant", "10.0.0.5/24");
    claim(&engine, &mut a).unwrap();
    claim(&engine, &mut b).unwrap();
    claim(&engine, &mut tenant).unwrap();
    engine.release(&ctx, &a).unwrap();

    let entries = engine.entries(&key()).unwrap();
    assert_eq!(entry(&entries, "10.0.0.0/24").expect("subnet kept").labels.claim_name, "b");
    assert_eq!(entry(&entries, "10.0.0.255/32").expect("broadcast kept").labels.claim_name, "b");
    assert!(entry(&entries, "10.0.0.1/32").is_none());
    assert!(entry(&entries, "10.0.0.2/32").is_some());

    // the new owner and the tenant re-claim without moving anything
    claim(&engine, &mut b).unwrap();
    claim(&engine, &mut tenant).unwrap();
    assert_eq!(engine.entries(&key()).unwrap(), entries);

    let restarted = Engine::new(storage.clone());
    restarted.create_index(&ctx, &index(&["10.0.0.0/8"])).unwrap();
    assert_eq!(restarted.entries(&key()).unwrap(), entries);
}

#[test]
fn network_with_tenants_cannot_be_released() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    let ctx = Context::new();
    let net = prefix_claim("net", "10.0.0.0/24", BlockKind::Network);
    claim(&engine, &mut net.clone()).unwrap();
    let mut host = address_claim("host", "10.0.0.5/24");
    claim(&engine, &mut host).unwrap();
    let before = engine.entries(&key()).unwrap();

    let err = engine.release(&ctx, &net).unwrap_err();
    assert!(matches!(err, Error::NestingViolation(_)), "{err}");
    assert_eq!(engine.entries(&key()).unwrap(), before);

    claim(&engine, &mut host).unwrap();
    assert_eq!(host.status.address.as_deref(), Some("10.0.0.5/24"));
    let entries = engine.entries(&key()).unwrap();
    assert_eq!(entry(&entries, "10.0.0.0/24").unwrap().labels.claim_name, "net");

    engine.release(&ctx, &host).unwrap();
    engine.release(&ctx, &net).unwrap();
    assert_eq!(engine.entries(&key()).unwrap().len(), 1);
}

#[test]
fn network_with_a_range_cannot_be_released() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    let ctx = Context::new();
    let net = prefix_claim("net", "10.0.0.0/24", BlockKind::Network);
    claim(&engine, &mut net.clone()).unwrap();
    let mut r = range_claim("r", "10.0.0.10-10.0.0.20");
    claim(&engine, &mut r).unwrap();

    let err = engine.release(&ctx, &net).unwrap_err();
    assert!(matches!(err, Error::NestingViolation(_)), "{err}");

    claim(&engine, &mut r).unwrap();
    let entries = engine.entries(&key()).unwrap();
    let piece = entry(&entries, "10.0.0.10/31").expect("range piece");
    assert_eq!(piece.labels.block_kind, BlockKind::Network);
    assert_eq!(piece.labels.subnet.map(|s| s.to_string()).as_deref(), Some("10.0.0.0/24"));
}

#[test]
fn ipv6_claims_resolve() {
    let (_, engine) = setup(&["2001:db8::/32"]);
    claim(&engine, &mut prefix_claim("net6", "2001:db8:1::/64", BlockKind::Network)).unwrap();

    // the subnet-router anycast address is held back
    let sel = Selector::new().with_label(LABEL_SUBNET, "2001:db8:1::/64");
    let mut host = dynamic_address("host6", sel);
    claim(&engine, &mut host).unwrap();
    assert_eq!(host.status.address.as_deref(), Some("2001:db8:1::1/64"));
    let err = claim(&engine, &mut address_claim("anycast", "2001:db8:1::/64")).unwrap_err();
    assert!(matches!(err, Error::OwnershipConflict { .. }), "{err}");

    let mut fixed = address_claim("fixed6", "2001:db8:1::10/64");
    claim(&engine, &mut fixed).unwrap();
    let err = claim(&engine, &mut address_claim("bare6", "2001:db8:1::11")).unwrap_err();
    assert!(matches!(err, Error::NestingViolation(_)), "{err}");

    let mut first = dynamic_prefix("first", aggregates(), 48);
    claim(&engine, &mut first).unwrap();
    assert_eq!(first.status.prefix.as_deref(), Some("2001:db8::/48"));
    let mut second = dynamic_prefix("second", aggregates(), 48);
    claim(&engine, &mut second).unwrap();
    assert_eq!(second.status.prefix.as_deref(), Some("2001:db8:2::/48"));

    let err = claim(&engine, &mut dynamic_prefix("huge", aggregates(), 129)).unwrap_err();
    assert!(matches!(err, Error::Syntax(_)), "{err}");
}

#[test]
fn prefix_length_must_fit_the_family() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    let err = claim(&engine, &mut dynamic_prefix("wide", aggregates(), 64)).unwrap_err();
    assert!(matches!(err, Error::Syntax(_)), "{err}");

    let (_, engine) = setup(&["10.0.0.0/8", "2001:db8::/32"]);
    let mut wide = dynamic_prefix("wide", aggregates(), 64);
    claim(&engine, &mut wide).unwrap();
    assert_eq!(wide.status.prefix.as_deref(), Some("2001:db8::/64"));
}

#[test]
fn seeded_aggregates_follow_the_index() {
    let (storage, engine) = setup(&["10.0.0.0/8", "192.168.0.0/16"]);
    let ctx = Context::new();
    assert_eq!(engine.entries(&key()).unwrap().len(), 2);

    engine.create_index(&ctx, &index(&["10.0.0.0/8"])).unwrap();
    let entries = engine.entries(&key()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].prefix.to_string(), "10.0.0.0/8");
    assert_eq!(entries[0].labels.owner.kind, "Index");
    assert_eq!(storage.claim_count(&key()), 1);
    assert_eq!(storage.entry_count(&key()), 1);
}

#[test]
fn index_lifecycle_errors() {
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::new(storage.clone());
    let ctx = Context::new();

    let mut c = prefix_claim("early", "10.0.0.0/24", BlockKind::Other);
    assert!(matches!(claim(&engine, &mut c), Err(Error::NotInitialized(_))));
    assert!(!engine.is_initialized(&key()));
    assert!(matches!(engine.entries(&key()), Err(Error::IndexNotFound(_))));

    engine.create_index(&ctx, &index(&["10.0.0.0/8"])).unwrap();
    assert!(engine.is_initialized(&key()));
    engine.delete_index(&ctx, &key()).unwrap();
    assert_eq!(storage.claim_count(&key()), 0);
    assert_eq!(storage.entry_count(&key()), 0);
    assert!(matches!(engine.delete_index(&ctx, &key()), Err(Error::IndexNotFound(_))));
}

#[test]
fn claims_are_counted() {
    let (_, engine) = setup(&["10.0.0.0/8"]);
    claim(&engine, &mut prefix_claim("counted", "10.3.0.0/16", BlockKind::Pool)).unwrap();
    let snap = telemetry::snapshot();
    assert!(snap.get("ipam_claims_total").copied().unwrap_or(0.0) >= 1.0);
    assert!(snap.keys().any(|k| k.starts_with("ipam_entries")));
}
