//! Response cache keyed by canonical request parameters.

use crate::PendingHandle;
use restmirror_types::{Detach, Params, ParamsKey, matches_subset};
use std::collections::HashMap;
use tracing::debug;

enum CacheEntry<T, E> {
    Pending(PendingHandle<T, E>),
    Snapshot(T),
}

struct Slot<T, E> {
    /// Decoded form of the key, kept for prefix invalidation.
    params: Params,
    entry: CacheEntry<T, E>,
}

/// What a cache lookup found.
#[derive(Debug)]
pub enum CacheLookup<T, E> {
    /// A request with equal parameters is in flight.
    Pending(PendingHandle<T, E>),
    /// A detached copy of a settled response.
    Snapshot(T),
}

/// Responses and in-flight requests of one collection.
///
/// Snapshots are stored and handed out as detached copies, so mutating a
/// live entity never changes what the cache returns, and mutating a
/// returned snapshot never changes the cache.
pub struct ResponseCache<T, E> {
    entries: HashMap<ParamsKey, Slot<T, E>>,
}

impl<T, E> ResponseCache<T, E>
where
    T: Detach + Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Canonical key for a parameter set.
    pub fn key_for(params: &Params) -> ParamsKey {
        ParamsKey::of(params)
    }

    /// Number of entries, pending and materialized.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry exists under `key`.
    pub fn contains(&self, key: &ParamsKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Looks up `key`. Snapshots are returned as detached copies.
    pub fn get(&self, key: &ParamsKey) -> Option<CacheLookup<T, E>> {
        self.entries.get(key).map(|slot| match &slot.entry {
            CacheEntry::Pending(handle) => CacheLookup::Pending(handle.clone()),
            CacheEntry::Snapshot(value) => CacheLookup::Snapshot(value.detach()),
        })
    }

    /// Registers an in-flight request, replacing whatever was under `key`.
    pub fn set_pending(&mut self, key: ParamsKey, params: Params, handle: PendingHandle<T, E>) {
        self.entries.insert(
            key,
            Slot {
                params,
                entry: CacheEntry::Pending(handle),
            },
        );
    }

    /// Stores a detached copy of `value` under `key`.
    pub fn set_snapshot(&mut self, key: ParamsKey, params: Params, value: &T) {
        self.entries.insert(
            key,
            Slot {
                params,
                entry: CacheEntry::Snapshot(value.detach()),
            },
        );
    }

    /// Mutable access to the snapshot under `key`, if the entry is materialized.
    pub fn snapshot_mut(&mut self, key: &ParamsKey) -> Option<&mut T> {
        match &mut self.entries.get_mut(key)?.entry {
            CacheEntry::Snapshot(value) => Some(value),
            CacheEntry::Pending(_) => None,
        }
    }

    /// Whether `key` still maps to this exact pending handle.
    pub fn holds_pending(&self, key: &ParamsKey, handle: &PendingHandle<T, E>) -> bool {
        matches!(
            self.entries.get(key).map(|slot| &slot.entry),
            Some(CacheEntry::Pending(current)) if current.ptr_eq(handle)
        )
    }

    /// Removes the entry under `key`. Returns whether one existed.
    pub fn delete(&mut self, key: &ParamsKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes every entry whose parameters contain all non-null pairs of
    /// `partial`. Returns the number removed.
    pub fn invalidate_matching(&mut self, partial: &Params) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, slot| !matches_subset(&slot.params, partial));
        let removed = before - self.entries.len();
        debug!(removed, "Invalidated cache entries");
        removed
    }

    /// Removes every pending entry and returns the handles, leaving
    /// snapshots in place. The caller settles the handles, typically
    /// after releasing whatever lock guards the cache.
    pub fn take_pending(&mut self) -> Vec<PendingHandle<T, E>> {
        let keys: Vec<ParamsKey> = self
            .entries
            .iter()
            .filter(|(_, slot)| matches!(slot.entry, CacheEntry::Pending(_)))
            .map(|(key, _)| key.clone())
            .collect();

        keys.iter()
            .filter_map(|key| match self.entries.remove(key)?.entry {
                CacheEntry::Pending(handle) => Some(handle),
                CacheEntry::Snapshot(_) => None,
            })
            .collect()
    }

    /// Rejects every pending entry with `reason` and removes it. Snapshots
    /// are untouched. Handles already claimed by their producer are only
    /// removed. Returns the number of handles rejected.
    pub fn cancel_all_pending(&mut self, reason: E) -> usize {
        self.take_pending()
            .into_iter()
            .filter(|handle| handle.close() && handle.reject(reason.clone()))
            .count()
    }

    /// Canonical keys of every entry.
    pub fn keys(&self) -> impl Iterator<Item = &ParamsKey> {
        self.entries.keys()
    }
}

impl<T, E> Default for ResponseCache<T, E>
where
    T: Detach + Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
