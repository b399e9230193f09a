//! In-memory storage for restmirror collections.
//!
//! Two independent structures live here, both owned by exactly one
//! collection:
//!
//! - [`EntityStore`] — normalized entities, indexed both by insertion order
//!   and by identity. The two indices always hold the same set of entities.
//! - [`ResponseCache`] — fetch results keyed by canonical request parameters.
//!   An entry is either a [`PendingHandle`] for an in-flight request (used to
//!   de-duplicate concurrent fetches) or a detached snapshot of a settled
//!   response.
//!
//! Neither structure performs I/O. The sync layer drives them.

mod cache;
mod error;
mod pending;
mod store;

pub use cache::{CacheLookup, ResponseCache};
pub use error::{StoreError, StoreResult};
pub use pending::PendingHandle;
pub use store::EntityStore;
