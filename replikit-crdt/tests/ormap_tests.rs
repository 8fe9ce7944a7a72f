use pretty_assertions::assert_eq;
use replikit_crdt::{
    CrdtError, CrdtKind, Flag, HybridTimestamp, LWWRegister, ORMap, ORSet, PNCounter,
    ReplicatedData, ReplicatedValue, ValueMap, VectorClock,
};
use replikit_types::ReplicaId;
use serde_json::json;

fn replica(n: u8) -> ReplicaId {
    ReplicaId::from_uuid(uuid::Uuid::from_bytes([
        n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]))
}

fn counter_map() -> ORMap<String, PNCounter> {
    ORMap::new()
}

#[test]
fn new_map_is_empty() {
    let map = counter_map();
    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    assert!(map.get("x").is_none());
}

#[test]
fn get_or_create_registers_presence() {
    let mut map = counter_map();
    map.get_or_create("a".into(), replica(1), PNCounter::new).unwrap();
    assert!(map.contains_key("a"));
    assert!(map.key_set().contains(&"a".to_string()));
}

#[test]
fn update_mutates_nested_value() {
    let mut map = counter_map();
    map.get_or_create("a".into(), replica(1), PNCounter::new).unwrap();
    let total = map
        .update(&"a".to_string(), replica(1), |c| c.increment(replica(1), 7))
        .unwrap();
    assert_eq!(total, 7);
    assert_eq!(map.get("a").unwrap().value(), 7);
}

#[test]
fn update_missing_key_fails() {
    let mut map = counter_map();
    let err = map
        .update(&"nope".to_string(), replica(1), |c| c.increment(replica(1), 1))
        .unwrap_err();
    assert!(matches!(err, CrdtError::KeyNotFound(_)));
}

#[test]
fn remove_returns_local_value() {
    let mut map = counter_map();
    map.update_or_create("a".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 3))
        .unwrap();
    let removed = map.remove("a").unwrap();
    assert_eq!(removed.value(), 3);
    assert!(map.get("a").is_none());
    assert!(map.remove("a").is_none());
}

#[test]
fn recreate_after_remove_starts_fresh() {
    let mut map = counter_map();
    map.update_or_create("a".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 3))
        .unwrap();
    map.remove("a");
    map.update_or_create("a".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
        .unwrap();
    assert_eq!(map.get("a").unwrap().value(), 1);
}

#[test]
fn clear_removes_every_key() {
    let mut map = counter_map();
    for key in ["a", "b", "c"] {
        map.get_or_create(key.into(), replica(1), PNCounter::new).unwrap();
    }
    assert_eq!(map.clear(), 3);
    assert!(map.is_empty());
}

// ── Merge ────────────────────────────────────────────────────────

#[test]
fn merge_adopts_keys_from_either_side() {
    let mut a = counter_map();
    a.update_or_create("a".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
        .unwrap();
    let mut b = counter_map();
    b.update_or_create("b".into(), replica(2), PNCounter::new, |c| c.increment(replica(2), 2))
        .unwrap();

    let merged = a.merged(&b);
    assert_eq!(merged.get("a").unwrap().value(), 1);
    assert_eq!(merged.get("b").unwrap().value(), 2);
}

#[test]
fn concurrent_nested_updates_merge_recursively() {
    let mut base = counter_map();
    base.update_or_create("hits".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 10))
        .unwrap();
    let mut a = base.clone();
    let mut b = base.clone();

    a.update(&"hits".to_string(), replica(1), |c| c.increment(replica(1), 1)).unwrap();
    b.update(&"hits".to_string(), replica(2), |c| c.decrement(replica(2), 4)).unwrap();

    a.merge(&b);
    b.merge(&a);
    assert_eq!(a, b);
    assert_eq!(a.get("hits").unwrap().value(), 7);
}

#[test]
fn concurrently_created_keys_join() {
    let mut a = counter_map();
    a.update_or_create("k".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
        .unwrap();
    let mut b = counter_map();
    b.update_or_create("k".into(), replica(2), PNCounter::new, |c| c.increment(replica(2), 2))
        .unwrap();

    let merged = a.merged(&b);
    assert_eq!(merged.get("k").unwrap().value(), 3);
    assert_eq!(merged.key_set().dots_for(&"k".to_string()).unwrap().len(), 2);
}

#[test]
fn removal_converges_and_does_not_resurrect() {
    let mut a = counter_map();
    a.update_or_create("k".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 5))
        .unwrap();
    let stale = a.clone();
    let mut b = a.clone();

    b.remove("k");
    a.merge(&b);
    b.merge(&a);
    assert!(a.get("k").is_none());
    assert!(b.get("k").is_none());

    // A stale copy arriving late cannot bring the value back
    a.merge(&stale);
    b.merge(&stale);
    assert!(a.get("k").is_none());
    assert!(b.get("k").is_none());
}

#[test]
fn concurrent_update_survives_remove() {
    let mut base = counter_map();
    base.update_or_create("k".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 5))
        .unwrap();
    // Both sides start from a flushed, shipped state
    base.take_delta();
    let mut updater = base.clone();
    let mut remover = base.clone();

    updater.update(&"k".to_string(), replica(1), |c| c.increment(replica(1), 1)).unwrap();
    remover.remove("k");

    updater.merge(&remover);
    remover.merge(&updater);
    assert_eq!(updater, remover);
    // A counter change carries the writer's whole per-replica count
    assert_eq!(updater.get("k").unwrap().value(), 6);
    assert_eq!(updater.key_set().tombstones().len(), 1);
}

#[test]
fn update_of_unshipped_key_is_caught_by_remove() {
    let mut base = counter_map();
    base.update_or_create("k".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 5))
        .unwrap();
    // The remover saw the key through a full state before it was flushed
    let mut updater = base.clone();
    let mut remover = base.clone();

    updater.update(&"k".to_string(), replica(1), |c| c.increment(replica(1), 1)).unwrap();
    remover.remove("k");

    updater.merge(&remover);
    remover.merge(&updater);
    assert_eq!(updater, remover);
    assert!(updater.get("k").is_none());
}

#[test]
fn repeated_updates_leave_no_key_tombstones() {
    let mut map = counter_map();
    for round in 0..50 {
        map.update_or_create("k".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
            .unwrap();
        map.update_or_create("k".into(), replica(2), PNCounter::new, |c| c.increment(replica(2), 1))
            .unwrap();
        if round % 10 == 0 {
            map.take_delta();
        }
    }
    assert!(map.key_set().tombstones().is_empty());
    assert_eq!(map.get("k").unwrap().value(), 100);
    // One dot per writer for each of the six flush windows
    assert_eq!(map.key_set().dots_for(&"k".to_string()).unwrap().len(), 12);
}

#[test]
fn re_created_key_after_remove_does_not_inherit_old_value() {
    let mut base = counter_map();
    base.update_or_create("k".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 5))
        .unwrap();
    let mut a = base.clone();
    let mut b = base.clone();

    a.remove("k");
    a.update_or_create("k".into(), replica(1), PNCounter::new, |c| c.increment(replica(3), 1))
        .unwrap();
    b.merge(&a);
    assert_eq!(b.get("k").unwrap().value(), 1);
}

#[test]
fn nested_maps_merge_recursively() {
    let mut a: ORMap<String, ORMap<String, PNCounter>> = ORMap::new();
    a.update_or_create("outer".into(), replica(1), ORMap::new, |inner| {
        inner.update_or_create("x".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
            .unwrap();
    })
    .unwrap();
    let mut b = a.clone();

    a.update(&"outer".to_string(), replica(1), |inner| {
        inner.update_or_create("y".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 2))
            .unwrap();
    })
    .unwrap();
    b.update(&"outer".to_string(), replica(2), |inner| {
        inner.remove("x");
    })
    .unwrap();

    a.merge(&b);
    let inner = a.get("outer").unwrap();
    assert!(inner.get("x").is_none());
    assert_eq!(inner.get("y").unwrap().value(), 2);
}

// ── Deltas ───────────────────────────────────────────────────────

#[test]
fn delta_roundtrip_reaches_same_state() {
    let mut source = counter_map();
    source.update_or_create("a".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 2))
        .unwrap();
    source.update_or_create("b".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 3))
        .unwrap();
    source.remove("a");
    let delta = source.take_delta().unwrap();
    assert!(!source.has_delta());

    let mut target = counter_map();
    target.apply_delta(&delta).unwrap();
    assert_eq!(target, source);
    assert!(!target.has_delta());
}

#[test]
fn nested_changes_travel_in_map_delta() {
    let mut source = counter_map();
    source.get_or_create("a".into(), replica(1), PNCounter::new).unwrap();
    let first = source.take_delta().unwrap();
    source.update(&"a".to_string(), replica(1), |c| c.increment(replica(1), 9)).unwrap();
    let second = source.take_delta().unwrap();

    let mut target = counter_map();
    target.apply_delta(&second).unwrap();
    target.apply_delta(&first).unwrap();
    assert_eq!(target.get("a").unwrap().value(), 9);
}

#[test]
fn delta_with_orphan_value_is_rejected() {
    let mut source = counter_map();
    source.get_or_create("a".into(), replica(1), PNCounter::new).unwrap();
    let mut delta = source.take_delta().unwrap();
    delta.keys.adds.clear();

    let mut target = counter_map();
    target.get_or_create("keep".into(), replica(2), PNCounter::new).unwrap();
    let before = target.clone();
    assert!(matches!(target.apply_delta(&delta), Err(CrdtError::MalformedDelta(_))));
    assert_eq!(target, before);
}

#[test]
fn map_compaction_keeps_values() {
    let mut a = counter_map();
    a.update_or_create("a".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
        .unwrap();
    a.update_or_create("b".into(), replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
        .unwrap();
    a.remove("a");

    let stable = VectorClock::meet_all([a.key_set().context()]);
    assert!(a.compact(&stable) > 0);
    assert!(a.key_set().tombstones().is_empty());
    assert_eq!(a.get("b").unwrap().value(), 1);
    assert!(a.get("a").is_none());
}

// ── Dynamic values ───────────────────────────────────────────────

#[test]
fn value_map_holds_mixed_kinds() {
    let mut map = ValueMap::new();
    map.get_or_create_as("title", replica(1), || {
        LWWRegister::new(json!("Groceries"), replica(1))
    })
    .unwrap();
    map.update_or_create_as("count", replica(1), PNCounter::new, |c| c.increment(replica(1), 2))
        .unwrap();
    map.update_or_create_as("tags", replica(1), ORSet::<String>::new, |s| {
        s.add("weekly".to_string(), replica(1)).unwrap();
    })
    .unwrap();
    map.update_or_create_as("done", replica(1), Flag::new, Flag::enable).unwrap();

    assert_eq!(
        map.get_as::<LWWRegister<serde_json::Value>>("title").unwrap().unwrap().value(),
        &json!("Groceries")
    );
    assert_eq!(map.get_as::<PNCounter>("count").unwrap().unwrap().value(), 2);
    assert!(map.get_as::<Flag>("done").unwrap().unwrap().is_enabled());
    assert!(map.get_as::<Flag>("missing").unwrap().is_none());
}

#[test]
fn typed_access_with_wrong_kind_fails_fast() {
    let mut map = ValueMap::new();
    map.update_or_create_as("count", replica(1), PNCounter::new, |c| c.increment(replica(1), 2))
        .unwrap();

    let err = map.get_as::<Flag>("count").unwrap_err();
    assert!(matches!(
        err,
        CrdtError::TypeMismatch {
            expected: CrdtKind::Flag,
            found: CrdtKind::PnCounter
        }
    ));
}

#[test]
fn concurrent_kind_conflict_is_not_merged() {
    let mut a = ValueMap::new();
    a.update_or_create_as("x", replica(1), PNCounter::new, |c| c.increment(replica(1), 1))
        .unwrap();
    let mut b = ValueMap::new();
    b.update_or_create_as("x", replica(2), Flag::new, Flag::enable).unwrap();

    let ab = a.merged(&b);
    let ba = b.merged(&a);
    assert_eq!(ab, ba);
    // Highest dot wins: replica 2 sorts above replica 1
    assert_eq!(ab.get("x").unwrap().kind(), CrdtKind::Flag);
    assert_eq!(ba.get("x").unwrap().kind(), CrdtKind::Flag);
}

#[test]
fn value_map_survives_json_roundtrip() {
    let mut map = ValueMap::new();
    map.update_or_create_as("count", replica(1), PNCounter::new, |c| c.increment(replica(1), 4))
        .unwrap();
    map.update_or_create_as("nested", replica(1), ValueMap::new, |inner| {
        inner.get_or_create("deep".into(), replica(1), || ReplicatedValue::Flag(Flag::new()))
            .unwrap();
    })
    .unwrap();

    let json = serde_json::to_string(&map).unwrap();
    let parsed: ValueMap = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, map);
    assert!(parsed.get_as::<ValueMap>("nested").unwrap().unwrap().contains_key("deep"));
}

#[test]
fn register_values_resolve_by_timestamp() {
    let mut a: ORMap<String, LWWRegister<i32>> = ORMap::new();
    a.get_or_create("k".into(), replica(1), || {
        LWWRegister::with_timestamp(1, HybridTimestamp::new(100, 0), replica(1))
    })
    .unwrap();
    let mut b: ORMap<String, LWWRegister<i32>> = ORMap::new();
    b.get_or_create("k".into(), replica(2), || {
        LWWRegister::with_timestamp(2, HybridTimestamp::new(50, 0), replica(2))
    })
    .unwrap();
    assert_eq!(*a.merged(&b).get("k").unwrap().value(), 1);
    assert_eq!(*b.merged(&a).get("k").unwrap().value(), 1);
}
