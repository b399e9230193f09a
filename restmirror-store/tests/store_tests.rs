use pretty_assertions::assert_eq;
use restmirror_store::EntityStore;
use restmirror_types::{EntityId, Record, into_record};
use serde_json::{Value, json};

fn record(value: Value) -> Record {
    into_record(value).unwrap()
}

fn store_with(items: &[Value]) -> EntityStore<Record> {
    let mut store = EntityStore::new("id");
    for item in items {
        store.insert(record(item.clone()));
    }
    store
}

// ── Insertion ────────────────────────────────────────────────────

#[test]
fn insert_returns_stored_entity() {
    let mut store = EntityStore::new("id");
    let entity = store.insert(record(json!({"id": 1, "name": "a"}))).unwrap();

    assert_eq!(store.len(), 1);
    assert!(entity.ptr_eq(&store.by_id(&EntityId::from(1u64)).unwrap()));
    assert!(entity.ptr_eq(&store.at(0).unwrap()));
}

#[test]
fn duplicate_identity_keeps_first() {
    let mut store = EntityStore::new("id");
    let results = store.insert_many(vec![
        record(json!({"id": 1, "v": "first"})),
        record(json!({"id": 2, "v": "second"})),
        record(json!({"id": 1, "v": "third"})),
    ]);

    assert_eq!(store.len(), 2);
    assert!(results[0].is_some());
    assert!(results[1].is_some());
    assert!(results[2].is_none());
    let first = store.by_id(&EntityId::from(1u64)).unwrap();
    assert_eq!(first.get("v"), Some(json!("first")));
}

#[test]
fn string_and_number_identities_collide() {
    let mut store = EntityStore::new("id");
    assert!(store.insert(record(json!({"id": 1}))).is_some());
    assert!(store.insert(record(json!({"id": "1"}))).is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn entity_without_identity_is_rejected() {
    let mut store = EntityStore::new("id");
    assert!(store.insert(record(json!({"name": "anon"}))).is_none());
    assert!(store.insert(record(json!({"id": null}))).is_none());
    assert!(store.is_empty());
}

#[test]
fn custom_identity_field() {
    let mut store = EntityStore::new("uid");
    store.insert(record(json!({"uid": "a", "id": 1})));
    store.insert(record(json!({"uid": "b", "id": 1})));
    assert_eq!(store.id_field(), "uid");
    assert_eq!(store.len(), 2);
    assert!(store.contains(&EntityId::new("b")));
}

// ── Update ───────────────────────────────────────────────────────

#[test]
fn update_merges_into_existing_object() {
    let mut store = EntityStore::new("id");
    let held = store.insert(record(json!({"id": 3, "name": "a", "age": 1}))).unwrap();

    let updated = store.update_in_place(&record(json!({"id": 3, "name": "b"}))).unwrap();

    assert!(updated.ptr_eq(&held));
    assert_eq!(held.snapshot(), record(json!({"id": 3, "name": "b", "age": 1})));
    let index = store.position(&EntityId::from(3u64)).unwrap();
    assert!(store.at(index).unwrap().ptr_eq(&held));
}

#[test]
fn update_of_absent_identity_is_noop() {
    let mut store = store_with(&[json!({"id": 1})]);
    assert!(store.update_in_place(&record(json!({"id": 2, "x": 1}))).is_none());
    assert!(store.update_in_place(&record(json!({"x": 1}))).is_none());
    assert_eq!(store.len(), 1);
    assert!(!store.contains(&EntityId::from(2u64)));
    store.clear();
}

// ── Removal ──────────────────────────────────────────────────────

#[test]
fn remove_drops_both_indices() {
    let mut store = store_with(&[json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
    let removed = store.remove(&EntityId::from(2u64)).unwrap();

    assert_eq!(removed.get("id"), Some(json!(2)));
    assert_eq!(store.len(), 2);
    assert!(store.by_id(&EntityId::from(2u64)).is_none());
    let ids: Vec<Value> = store.iter().filter_map(|e| e.get("id")).collect();
    assert_eq!(ids, vec![json!(1), json!(3)]);
}

#[test]
fn remove_absent_returns_none() {
    let mut store = store_with(&[json!({"id": 1})]);
    assert!(store.remove(&EntityId::from(9u64)).is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn clear_empties_store() {
    let mut store = store_with(&[json!({"id": 1}), json!({"id": 2})]);
    store.clear();
    assert!(store.is_empty());
    assert!(store.at(0).is_none());
    assert!(store.by_id(&EntityId::from(1u64)).is_none());
}

// ── Queries ──────────────────────────────────────────────────────

#[test]
fn at_out_of_range() {
    let store = store_with(&[json!({"id": 1})]);
    assert!(store.at(1).is_none());
}

#[test]
fn where_all_filters_in_order() {
    let store = store_with(&[
        json!({"id": 1, "kind": "a", "done": true}),
        json!({"id": 2, "kind": "b", "done": true}),
        json!({"id": 3, "kind": "a", "done": false}),
        json!({"id": 4, "kind": "a", "done": true}),
    ]);

    let found = store.where_all(&record(json!({"kind": "a", "done": true})));
    let ids: Vec<Value> = found.iter().filter_map(|e| e.get("id")).collect();
    assert_eq!(ids, vec![json!(1), json!(4)]);
}

#[test]
fn single_where_returns_first_match() {
    let store = store_with(&[
        json!({"id": 1, "kind": "b"}),
        json!({"id": 2, "kind": "a"}),
        json!({"id": 3, "kind": "a"}),
    ]);
    let found = store.single_where(&record(json!({"kind": "a"}))).unwrap();
    assert_eq!(found.get("id"), Some(json!(2)));
    assert!(store.single_where(&record(json!({"kind": "z"}))).is_none());
}

#[test]
fn entities_returns_handles_in_order() {
    let store = store_with(&[json!({"id": "x"}), json!({"id": "y"})]);
    let all = store.entities();
    assert_eq!(all.len(), 2);
    assert!(all[1].ptr_eq(&store.by_id(&EntityId::new("y")).unwrap()));
}
