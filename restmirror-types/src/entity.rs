//! Shared entity handles.
//!
//! A stored entity is owned jointly by the store's two indices and by every
//! caller that received it, so mutations made through one handle are seen
//! through all of them.

use crate::{EntityId, Model};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Reference-counted, in-place mutable handle to a stored model.
///
/// Cloning an `Entity` clones the handle, not the model. Use
/// [`Detach::detach`] for an independent copy.
pub struct Entity<M>(Arc<RwLock<M>>);

impl<M> Entity<M> {
    /// Wraps a model in a fresh handle.
    pub fn new(model: M) -> Self {
        Self(Arc::new(RwLock::new(model)))
    }

    /// Locks the model for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, M> {
        self.0.read()
    }

    /// Locks the model for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, M> {
        self.0.write()
    }

    /// Returns whether both handles point at the same stored model.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<M: Model> Entity<M> {
    /// Returns a copy of one field's value.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.read().field(field).cloned()
    }

    /// Returns the identity stored under `id_field`.
    pub fn identity(&self, id_field: &str) -> Option<EntityId> {
        self.read().identity_value(id_field)
    }

    /// Returns a copy of the current model.
    pub fn snapshot(&self) -> M {
        self.read().clone()
    }
}

impl<M> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<M: fmt::Debug> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity").field(&*self.0.read()).finish()
    }
}

/// Deep copy that shares no mutable state with the original.
pub trait Detach {
    fn detach(&self) -> Self;
}

impl<M: Clone> Detach for Entity<M> {
    fn detach(&self) -> Self {
        Self::new(self.0.read().clone())
    }
}

impl Detach for Value {
    fn detach(&self) -> Self {
        self.clone()
    }
}

impl<T: Detach> Detach for Vec<T> {
    fn detach(&self) -> Self {
        self.iter().map(Detach::detach).collect()
    }
}

impl<T: Detach> Detach for Option<T> {
    fn detach(&self) -> Self {
        self.as_ref().map(Detach::detach)
    }
}
