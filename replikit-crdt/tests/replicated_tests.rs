//! The transport-facing handle: encoded exchange, resync and startup wiring.

use pretty_assertions::assert_eq;
use replikit_crdt::{
    CrdtError, CrdtFactory, CrdtKind, Envelope, FORMAT_VERSION, Form, ORMap, ORSet, PNCounter,
    ReplicaConfig, Replicated, ReplicatedData, ValueMap, encode_full_state,
};
use replikit_types::ReplicaId;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Routes library logs to the test output when `RUST_LOG` is set.
fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn replica(n: u8) -> ReplicaId {
    ReplicaId::from_uuid(uuid::Uuid::from_bytes([
        n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]))
}

type Inventory = ORMap<String, PNCounter>;

fn stock(handle: &mut Replicated<Inventory>, replica_id: ReplicaId, item: &str, amount: i64) {
    handle
        .execute(|inventory| {
            inventory.update_or_create(item.to_string(), replica_id, PNCounter::new, |c| {
                c.add(replica_id, amount)
            })?;
            Ok(())
        })
        .unwrap();
}

// ── Encoded exchange ─────────────────────────────────────────────

#[test]
fn encoded_deltas_converge_two_handles() {
    init_tracing();
    let mut a: Replicated<Inventory> = Replicated::default();
    let mut b: Replicated<Inventory> = Replicated::default();

    stock(&mut a, replica(1), "apples", 10);
    stock(&mut b, replica(2), "apples", 5);
    stock(&mut b, replica(2), "pears", 3);

    let from_a = a.current_encoded_delta().unwrap().unwrap();
    let from_b = b.current_encoded_delta().unwrap().unwrap();
    b.apply_encoded_delta(&from_a).unwrap();
    a.apply_encoded_delta(&from_b).unwrap();

    assert_eq!(a.state(), b.state());
    assert_eq!(a.state().get("apples").map(PNCounter::value), Some(15));
    assert_eq!(a.state().get("pears").map(PNCounter::value), Some(3));
    // Applying remote changes produces nothing to forward
    assert!(!a.has_delta());
    assert_eq!(a.current_encoded_delta().unwrap(), None);
}

#[test]
fn full_state_resync_after_missed_deltas() {
    init_tracing();
    let mut a: Replicated<Inventory> = Replicated::default();
    for i in 0..5 {
        stock(&mut a, replica(1), &format!("item_{i}"), i);
    }
    // Every delta is lost in transit
    a.current_delta();

    let mut b: Replicated<Inventory> = Replicated::default();
    let snapshot = a.current_encoded_full_state().unwrap();
    b.apply_encoded_full_state(&snapshot).unwrap();
    assert_eq!(b.state(), a.state());

    // Deltas after the resync still apply cleanly on top
    stock(&mut a, replica(1), "item_0", 7);
    let delta = a.current_encoded_delta().unwrap().unwrap();
    b.apply_encoded_delta(&delta).unwrap();
    assert_eq!(b.state().get("item_0").map(PNCounter::value), Some(7));
    assert_eq!(b.current_full_state(), a.current_full_state());
}

#[test]
fn dynamic_value_map_roundtrips_through_encoding() {
    let factory = CrdtFactory::new(replica(3)).unwrap();
    let mut a = factory.replicated(ValueMap::new());
    let mut b: Replicated<ValueMap> = Replicated::default();

    a.execute(|doc| {
        doc.update_or_create_as("views", factory.replica_id(), PNCounter::new, |c| {
            c.increment(factory.replica_id(), 2);
        })?;
        doc.update_or_create_as("tags", factory.replica_id(), ORSet::<String>::new, |s| {
            s.add("draft".to_string(), factory.replica_id()).unwrap();
        })
    })
    .unwrap();

    let delta = a.current_encoded_delta().unwrap().unwrap();
    b.apply_encoded_delta(&delta).unwrap();
    let views: Option<&PNCounter> = b.state().get_as("views").unwrap();
    assert_eq!(views.map(PNCounter::value), Some(2));
    assert_eq!(b.state(), a.state());
}

// ── Rejected input ───────────────────────────────────────────────

#[test]
fn garbage_bytes_are_a_codec_error() {
    init_tracing();
    let mut handle: Replicated<Inventory> = Replicated::default();
    stock(&mut handle, replica(1), "apples", 1);
    let before = handle.state().clone();

    let err = handle.apply_encoded_delta(b"not json").unwrap_err();
    assert!(matches!(err, CrdtError::Codec(_)));
    assert_eq!(handle.state(), &before);
}

#[test]
fn payload_of_another_kind_is_rejected() {
    let mut counter: Replicated<PNCounter> = Replicated::default();
    counter
        .execute(|c| {
            c.increment(replica(1), 4);
            Ok(())
        })
        .unwrap();
    let bytes = counter.current_encoded_full_state().unwrap();

    let mut inventory: Replicated<Inventory> = Replicated::default();
    let err = inventory.apply_encoded_full_state(&bytes).unwrap_err();
    assert!(matches!(
        err,
        CrdtError::TypeMismatch { expected: CrdtKind::OrMap, found: CrdtKind::PnCounter }
    ));
    assert!(inventory.state().is_empty());
}

#[test]
fn future_format_version_is_rejected() {
    let state = Inventory::new();
    let mut envelope: Envelope = serde_json::from_slice(&encode_full_state(&state).unwrap()).unwrap();
    envelope.version = FORMAT_VERSION + 1;
    let bytes = serde_json::to_vec(&envelope).unwrap();

    let mut handle: Replicated<Inventory> = Replicated::default();
    assert!(matches!(
        handle.apply_encoded_full_state(&bytes),
        Err(CrdtError::UnsupportedFormat(_))
    ));
}

#[test]
fn full_state_sent_as_delta_is_rejected() {
    let mut a: Replicated<Inventory> = Replicated::default();
    stock(&mut a, replica(1), "apples", 1);
    let bytes = a.current_encoded_full_state().unwrap();
    let envelope: Envelope = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(envelope.form, Form::FullState);

    let mut b: Replicated<Inventory> = Replicated::default();
    assert!(matches!(
        b.apply_encoded_delta(&bytes),
        Err(CrdtError::UnsupportedFormat(_))
    ));
}

#[test]
fn malformed_delta_leaves_state_untouched() {
    let mut source: Replicated<Inventory> = Replicated::default();
    stock(&mut source, replica(1), "apples", 1);
    let mut delta = source.current_delta().unwrap();
    // Drop the presence dots but keep the values
    delta.keys = Default::default();

    let mut target: Replicated<Inventory> = Replicated::default();
    stock(&mut target, replica(2), "pears", 2);
    let before = target.state().clone();
    assert!(target.apply_delta(&delta).is_err());
    assert_eq!(target.state(), &before);
    // The local pending delta survives a rejected remote one
    assert!(target.has_delta());
}

// ── Startup wiring ───────────────────────────────────────────────

#[test]
fn factory_from_config_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replica.toml");
    std::fs::write(
        &path,
        "replica_id = \"01936f3e-9c1a-7b4e-8d2f-4a5b6c7d8e9f\"\nlabel = \"edge-eu-1\"\n",
    )
    .unwrap();

    let config = ReplicaConfig::load_from(&path).unwrap();
    assert_eq!(config.label(), Some("edge-eu-1"));
    let factory = CrdtFactory::from_config(&config).unwrap();
    assert_eq!(factory.replica_id(), config.replica_id());

    let mut counters = factory.new_counter_map::<String>();
    counters.increment("boots".into(), 1).unwrap();
    assert_eq!(counters.replica_id(), config.replica_id());
    assert!(counters.has_delta());
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReplicaConfig::load_from(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, CrdtError::Io(_)));
}

#[test]
fn nil_replica_in_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replica.toml");
    std::fs::write(&path, "replica_id = \"00000000-0000-0000-0000-000000000000\"\n").unwrap();
    assert!(matches!(
        ReplicaConfig::load_from(&path),
        Err(CrdtError::InvalidReplicaId(_))
    ));
}
