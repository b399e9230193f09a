use pretty_assertions::assert_eq;
use restmirror_store::{CacheLookup, PendingHandle, ResponseCache, StoreError};
use restmirror_types::{Entity, Params, ParamsKey, Record, into_record};
use serde_json::{Value, json};

type Cache = ResponseCache<Value, StoreError>;

fn params(value: Value) -> Params {
    into_record(value).unwrap()
}

fn snapshot_at(cache: &mut Cache, p: Value, body: Value) -> ParamsKey {
    let p = params(p);
    let key = Cache::key_for(&p);
    cache.set_snapshot(key.clone(), p, &body);
    key
}

// ── Snapshots ────────────────────────────────────────────────────

#[test]
fn snapshot_roundtrip() {
    let mut cache = Cache::new();
    let key = snapshot_at(&mut cache, json!({"page": 1}), json!([1, 2]));

    match cache.get(&key) {
        Some(CacheLookup::Snapshot(v)) => assert_eq!(v, json!([1, 2])),
        other => panic!("Expected snapshot, got {other:?}"),
    }
}

#[test]
fn key_for_is_order_independent() {
    let mut a = Params::new();
    a.insert("b".into(), json!(1));
    a.insert("a".into(), json!(2));
    assert_eq!(Cache::key_for(&a), Cache::key_for(&params(json!({"a": 2, "b": 1}))));
}

#[test]
fn snapshots_are_detached_from_live_entities() {
    let mut cache: ResponseCache<Vec<Entity<Record>>, StoreError> = ResponseCache::new();
    let live = vec![Entity::new(params(json!({"id": 1, "text": "a"})))];
    let p = params(json!({}));
    let key = ResponseCache::<Vec<Entity<Record>>, StoreError>::key_for(&p);
    cache.set_snapshot(key.clone(), p, &live);

    live[0].write().insert("text".into(), json!("changed"));

    let Some(CacheLookup::Snapshot(first)) = cache.get(&key) else {
        panic!("Expected snapshot");
    };
    assert_eq!(first[0].get("text"), Some(json!("a")));

    // Mutating a returned copy does not leak back into the cache either.
    first[0].write().insert("text".into(), json!("mutated"));
    let Some(CacheLookup::Snapshot(second)) = cache.get(&key) else {
        panic!("Expected snapshot");
    };
    assert_eq!(second[0].get("text"), Some(json!("a")));
}

#[test]
fn snapshot_mut_only_for_materialized_entries() {
    let mut cache = Cache::new();
    let key = snapshot_at(&mut cache, json!({"page": 1}), json!([1]));
    if let Some(Value::Array(items)) = cache.snapshot_mut(&key) {
        items.push(json!(2));
    }
    assert!(matches!(cache.get(&key), Some(CacheLookup::Snapshot(v)) if v == json!([1, 2])));

    let p = params(json!({"page": 2}));
    let pending_key = Cache::key_for(&p);
    cache.set_pending(pending_key.clone(), p, PendingHandle::new());
    assert!(cache.snapshot_mut(&pending_key).is_none());
}

#[test]
fn delete_and_clear() {
    let mut cache = Cache::new();
    let a = snapshot_at(&mut cache, json!({"page": 1}), json!(1));
    snapshot_at(&mut cache, json!({"page": 2}), json!(2));

    assert!(cache.delete(&a));
    assert!(!cache.delete(&a));
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
}

// ── Prefix invalidation ──────────────────────────────────────────

#[test]
fn invalidate_by_shared_field_removes_all_matches() {
    let mut cache = Cache::new();
    snapshot_at(&mut cache, json!({"page": 1, "size": 10}), json!(1));
    snapshot_at(&mut cache, json!({"page": 2, "size": 10}), json!(2));

    assert_eq!(cache.invalidate_matching(&params(json!({"size": 10}))), 2);
    assert!(cache.is_empty());
}

#[test]
fn invalidate_by_specific_field_removes_only_match() {
    let mut cache = Cache::new();
    let first = snapshot_at(&mut cache, json!({"page": 1, "size": 10}), json!(1));
    let second = snapshot_at(&mut cache, json!({"page": 2, "size": 10}), json!(2));

    assert_eq!(cache.invalidate_matching(&params(json!({"page": 1}))), 1);
    assert!(!cache.contains(&first));
    assert!(cache.contains(&second));
}

#[test]
fn invalidate_with_empty_params_clears_everything() {
    let mut cache = Cache::new();
    snapshot_at(&mut cache, json!({"page": 1}), json!(1));
    snapshot_at(&mut cache, json!({}), json!(2));
    assert_eq!(cache.invalidate_matching(&Params::new()), 2);
}

#[test]
fn invalidate_ignores_unrelated_fields() {
    let mut cache = Cache::new();
    snapshot_at(&mut cache, json!({"page": 1}), json!(1));
    assert_eq!(cache.invalidate_matching(&params(json!({"name": "x"}))), 0);
    assert_eq!(cache.len(), 1);
}

// ── Pending entries ──────────────────────────────────────────────

#[test]
fn holds_pending_tracks_handle_identity() {
    let mut cache = Cache::new();
    let p = params(json!({"q": 1}));
    let key = Cache::key_for(&p);
    let handle = PendingHandle::new();
    cache.set_pending(key.clone(), p.clone(), handle.clone());

    assert!(cache.holds_pending(&key, &handle));
    assert!(!cache.holds_pending(&key, &PendingHandle::new()));

    cache.set_snapshot(key.clone(), p, &json!(1));
    assert!(!cache.holds_pending(&key, &handle));
}

#[tokio::test]
async fn cancel_all_pending_rejects_and_keeps_snapshots() {
    let mut cache = Cache::new();
    let snap = snapshot_at(&mut cache, json!({"page": 1}), json!(1));

    let p = params(json!({"page": 2}));
    let key = Cache::key_for(&p);
    let handle: PendingHandle<Value, StoreError> = PendingHandle::new();
    cache.set_pending(key.clone(), p, handle.clone());

    assert_eq!(cache.cancel_all_pending(StoreError::Abandoned), 1);
    assert!(!cache.contains(&key));
    assert!(cache.contains(&snap));
    assert_eq!(handle.wait().await, Err(StoreError::Abandoned));
}

#[test]
fn cancel_all_pending_skips_claimed_handles() {
    let mut cache = Cache::new();
    let p = params(json!({"page": 1}));
    let key = Cache::key_for(&p);
    let handle: PendingHandle<Value, StoreError> = PendingHandle::new();
    cache.set_pending(key.clone(), p, handle.clone());
    assert!(handle.claim());

    assert_eq!(cache.cancel_all_pending(StoreError::Abandoned), 0);
    assert!(!cache.contains(&key));
    assert!(!handle.is_settled());
    assert!(handle.resolve(json!(1)));
}

#[test]
fn take_pending_returns_handles() {
    let mut cache = Cache::new();
    for page in 0..3 {
        let p = params(json!({"page": page}));
        cache.set_pending(Cache::key_for(&p), p, PendingHandle::new());
    }
    snapshot_at(&mut cache, json!({"page": 9}), json!(9));

    assert_eq!(cache.take_pending().len(), 3);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.keys().count(), 1);
}
