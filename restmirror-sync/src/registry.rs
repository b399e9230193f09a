//! Process-wide registry of live collections.
//!
//! Every collection registers itself on construction so that application
//! code can act on all of them at once, e.g. dropping every cached response
//! after a logout or cancelling every request on navigation. Entries are
//! weak and are pruned once their collection is gone. [`reset`] empties the
//! registry for test isolation.

use parking_lot::Mutex;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::{debug, error};
use uuid::Uuid;

/// Unique identity of one collection instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(Uuid);

impl CollectionId {
    /// Generates a new time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operations every registered collection supports, independent of its
/// model type.
pub trait Broadcast: Send + Sync {
    fn collection_id(&self) -> CollectionId;

    /// Drops every cached response and pending marker.
    fn invalidate_all(&self);

    /// Rejects every in-flight fetch with a cancellation. Returns how many
    /// were cancelled.
    fn cancel_all_requests(&self) -> usize;

    /// Removes every entity; with `with_hooks` also drops every hook.
    fn clear(&self, with_hooks: bool);
}

static INSTANCES: Mutex<Vec<Weak<dyn Broadcast>>> = Mutex::new(Vec::new());

/// Adds a collection to the registry.
pub fn register(instance: Weak<dyn Broadcast>) {
    let mut instances = INSTANCES.lock();
    instances.retain(|w| w.strong_count() > 0);
    instances.push(instance);
}

/// Number of live registered collections.
pub fn len() -> usize {
    INSTANCES.lock().iter().filter(|w| w.strong_count() > 0).count()
}

/// Whether no live collection is registered.
pub fn is_empty() -> bool {
    len() == 0
}

/// Upgrades the live entries without holding the registry lock afterwards.
fn live() -> Vec<Arc<dyn Broadcast>> {
    INSTANCES.lock().iter().filter_map(Weak::upgrade).collect()
}

/// Runs `f` against every live collection. A panicking instance is logged
/// and the broadcast moves on to the next one.
fn broadcast<R>(operation: &'static str, f: impl Fn(&dyn Broadcast) -> R) -> Vec<R> {
    let instances = live();
    debug!(operation, collections = instances.len(), "Broadcasting");
    instances
        .iter()
        .filter_map(|instance| {
            match catch_unwind(AssertUnwindSafe(|| f(instance.as_ref()))) {
                Ok(result) => Some(result),
                Err(_) => {
                    error!(
                        operation,
                        collection = %instance.collection_id(),
                        "Broadcast failed for collection, continuing"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Invalidates the cache of every collection.
pub fn invalidate_all() {
    broadcast("invalidate_all", |c| c.invalidate_all());
}

/// Cancels the in-flight fetches of every collection. Returns the total
/// number cancelled.
pub fn cancel_all_requests() -> usize {
    broadcast("cancel_all_requests", |c| c.cancel_all_requests())
        .into_iter()
        .sum()
}

/// Clears the entities of every collection.
pub fn clear_all(with_hooks: bool) {
    broadcast("clear_all", |c| c.clear(with_hooks));
}

/// Forgets every registered collection. The collections themselves are
/// unaffected.
pub fn reset() {
    INSTANCES.lock().clear();
}
