//! Shaped fetch responses.

use restmirror_types::{Detach, Entity, EntityId, Model, Params, Record};
use serde_json::Value;

/// The entities (or raw payload) a fetch resolved to.
#[derive(Debug)]
pub enum Body<M> {
    /// A list of entities.
    Many(Vec<Entity<M>>),
    /// A single entity, or `None` when the server returned nothing for the
    /// requested identity.
    One(Option<Entity<M>>),
    /// The payload as received, for shapes that do not map to entities.
    Raw(Value),
}

impl<M> Clone for Body<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Many(items) => Self::Many(items.clone()),
            Self::One(item) => Self::One(item.clone()),
            Self::Raw(value) => Self::Raw(value.clone()),
        }
    }
}

/// Result of a fetch.
///
/// Fresh responses reference the collection's live entities. Responses
/// served from the cache hold detached copies.
#[derive(Debug)]
pub struct Response<M> {
    pub body: Body<M>,
    /// Envelope fields that accompanied a `results` list (`count`, `next`, …).
    pub meta: Record,
    /// The request parameters, when the collection echoes them.
    pub payload: Option<Params>,
}

impl<M> Response<M> {
    pub(crate) fn new(body: Body<M>) -> Self {
        Self {
            body,
            meta: Record::new(),
            payload: None,
        }
    }

    /// Every entity in the body, in order.
    pub fn items(&self) -> Vec<Entity<M>> {
        match &self.body {
            Body::Many(items) => items.clone(),
            Body::One(Some(item)) => vec![item.clone()],
            Body::One(None) | Body::Raw(_) => Vec::new(),
        }
    }

    /// The first entity in the body.
    pub fn first(&self) -> Option<Entity<M>> {
        match &self.body {
            Body::Many(items) => items.first().cloned(),
            Body::One(item) => item.clone(),
            Body::Raw(_) => None,
        }
    }

    /// The raw payload, for `Body::Raw` responses.
    pub fn raw(&self) -> Option<&Value> {
        match &self.body {
            Body::Raw(value) => Some(value),
            _ => None,
        }
    }
}

impl<M: Model> Response<M> {
    /// Appends `entity` to a list body unless an entity with the same
    /// identity is already listed. Returns whether it was appended.
    pub(crate) fn append(&mut self, entity: Entity<M>, id_field: &str) -> bool {
        let Body::Many(items) = &mut self.body else {
            return false;
        };
        let id: Option<EntityId> = entity.identity(id_field);
        if id.is_some() && items.iter().any(|e| e.identity(id_field) == id) {
            return false;
        }
        items.push(entity);
        true
    }
}

impl<M> Clone for Response<M> {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
            meta: self.meta.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl<M: Clone> Detach for Response<M> {
    fn detach(&self) -> Self {
        let body = match &self.body {
            Body::Many(items) => Body::Many(items.detach()),
            Body::One(item) => Body::One(item.detach()),
            Body::Raw(value) => Body::Raw(value.clone()),
        };
        Self {
            body,
            meta: self.meta.clone(),
            payload: self.payload.clone(),
        }
    }
}
