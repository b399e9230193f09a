//! Per-entity convenience handle.

use crate::coordinator::{Mutation, RequestCoordinator};
use crate::error::{CollectionError, CollectionResult};
use restmirror_types::{Entity, Model, Record};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// An entity bound to the collection that stores it, so writes can be
/// issued from the entity itself (`handle.save()` rather than
/// `collection.update(...)`).
///
/// The back-reference is weak: a handle never keeps its collection alive.
/// Operations that need the collection fail with
/// [`CollectionError::Detached`] once it is gone.
pub struct EntityHandle<M: Model> {
    entity: Entity<M>,
    owner: Weak<RequestCoordinator<M>>,
}

impl<M: Model> EntityHandle<M> {
    pub(crate) fn new(entity: Entity<M>, owner: &Arc<RequestCoordinator<M>>) -> Self {
        Self {
            entity,
            owner: Arc::downgrade(owner),
        }
    }

    /// The underlying shared entity.
    pub fn entity(&self) -> &Entity<M> {
        &self.entity
    }

    fn owner(&self) -> CollectionResult<Arc<RequestCoordinator<M>>> {
        self.owner.upgrade().ok_or(CollectionError::Detached)
    }

    /// Merges `patch` into the entity without contacting the server.
    pub fn update_locally(&self, patch: &Record) {
        self.entity.write().apply_mutation(patch);
    }

    /// Merges `patch` locally, then saves the whole entity.
    pub async fn update(&self, patch: &Record) -> CollectionResult<Mutation<M>> {
        self.update_locally(patch);
        self.save().await
    }

    /// Sends the current state of the entity as an update.
    pub async fn save(&self) -> CollectionResult<Mutation<M>> {
        let owner = self.owner()?;
        let record = self.entity.read().to_record();
        owner.update(record).await
    }

    /// Removes the entity from the collection without contacting the server.
    pub fn remove(&self) -> CollectionResult<Option<Entity<M>>> {
        let owner = self.owner()?;
        let record = self.entity.read().to_record();
        let id = owner.require_identity(&record)?;
        Ok(owner.remove_local(&id))
    }

    /// Deletes the entity on the server and then from the collection.
    pub async fn delete(&self) -> CollectionResult<Mutation<M>> {
        let owner = self.owner()?;
        let record = self.entity.read().to_record();
        owner.delete(&record).await
    }
}

impl<M: Model> Deref for EntityHandle<M> {
    type Target = Entity<M>;

    fn deref(&self) -> &Entity<M> {
        &self.entity
    }
}

impl<M: Model> Clone for EntityHandle<M> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            owner: Weak::clone(&self.owner),
        }
    }
}

impl<M: Model + fmt::Debug> fmt::Debug for EntityHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("entity", &self.entity)
            .field("attached", &(self.owner.strong_count() > 0))
            .finish()
    }
}
