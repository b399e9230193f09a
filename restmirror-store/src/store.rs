//! Normalized entity storage.

use restmirror_types::{Entity, EntityId, Model, Params, Record};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Live entities of one collection, indexed by position and by identity.
///
/// Inserting an identity that is already present is ignored: the first
/// stored entity wins and is never overwritten implicitly. Updates go
/// through [`update_in_place`](Self::update_in_place), which merges into the
/// stored model so handles held by callers observe the change.
#[derive(Debug)]
pub struct EntityStore<M> {
    id_field: String,
    items: Vec<Entity<M>>,
    by_id: HashMap<EntityId, Entity<M>>,
}

impl<M: Model> EntityStore<M> {
    /// Creates an empty store keyed by `id_field`.
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            items: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Returns the name of the identity field.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether an entity with this identity is stored.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Stores `model` if its identity is new.
    ///
    /// Returns `None` for a duplicate identity or a model without one.
    pub fn insert(&mut self, model: M) -> Option<Entity<M>> {
        let Some(id) = model.identity_value(&self.id_field) else {
            warn!(id_field = %self.id_field, "Ignoring entity without identity");
            return None;
        };
        if self.by_id.contains_key(&id) {
            debug!(%id, "Ignoring duplicate entity");
            return None;
        }

        let entity = Entity::new(model);
        self.items.push(entity.clone());
        self.by_id.insert(id, entity.clone());
        Some(entity)
    }

    /// Element-wise [`insert`](Self::insert).
    pub fn insert_many(&mut self, models: impl IntoIterator<Item = M>) -> Vec<Option<Entity<M>>> {
        models.into_iter().map(|m| self.insert(m)).collect()
    }

    /// Merges `patch` into the stored entity with the same identity.
    ///
    /// Returns `None` and changes nothing if the patch has no identity or
    /// the identity is not stored.
    pub fn update_in_place(&self, patch: &Record) -> Option<Entity<M>> {
        let id = patch.get(&self.id_field).and_then(EntityId::from_value)?;
        let entity = self.by_id.get(&id)?;
        entity.write().apply_mutation(patch);
        Some(entity.clone())
    }

    /// Removes the entity with this identity from both indices.
    pub fn remove(&mut self, id: &EntityId) -> Option<Entity<M>> {
        let removed = self.by_id.remove(id)?;
        self.items.retain(|e| !e.ptr_eq(&removed));
        Some(removed)
    }

    /// Removes every entity.
    pub fn clear(&mut self) {
        self.items.clear();
        self.by_id.clear();
    }

    /// Entity at an insertion-order position.
    pub fn at(&self, index: usize) -> Option<Entity<M>> {
        self.items.get(index).cloned()
    }

    /// Entity with this identity.
    pub fn by_id(&self, id: &EntityId) -> Option<Entity<M>> {
        self.by_id.get(id).cloned()
    }

    /// Insertion-order position of the entity with this identity.
    pub fn position(&self, id: &EntityId) -> Option<usize> {
        let entity = self.by_id.get(id)?;
        self.items.iter().position(|e| e.ptr_eq(entity))
    }

    /// Every entity whose fields equal all of `fields`, in insertion order.
    pub fn where_all(&self, fields: &Params) -> Vec<Entity<M>> {
        self.items
            .iter()
            .filter(|e| e.read().matches(fields))
            .cloned()
            .collect()
    }

    /// First entity whose fields equal all of `fields`.
    pub fn single_where(&self, fields: &Params) -> Option<Entity<M>> {
        self.items.iter().find(|e| e.read().matches(fields)).cloned()
    }

    /// Handles to every entity, in insertion order.
    pub fn entities(&self) -> Vec<Entity<M>> {
        self.items.clone()
    }

    /// Iterates over the stored entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity<M>> {
        self.items.iter()
    }
}
