//! Client-side collections mirroring REST resources.
//!
//! A [`Collection`] talks to one resource endpoint through a
//! [`RestTransport`] and keeps:
//!
//! - every entity it has seen exactly once, indexed by identity and by
//!   insertion order, so every caller observes the same instance
//! - a cache of fetch responses keyed by canonical request parameters, which
//!   also de-duplicates concurrent fetches with equal parameters
//! - ordered extension hooks around adds, updates, removals and fetches,
//!   plus an interceptor chain that may rewrite fetch payloads
//! - a loading counter covering every in-flight operation
//!
//! # Transports
//!
//! - [`HttpTransport`] — `reqwest` against a base URL
//! - [`mock::MockTransport`] — scripted, in memory, for tests
//! - anything implementing [`RestTransport`], shared or built per request
//!   through [`RestSource::Factory`]
//!
//! # Process-wide operations
//!
//! Collections register themselves in [`registry`], which can invalidate,
//! cancel or clear all of them at once.

mod collection;
mod config;
mod coordinator;
mod error;
mod handle;
mod hooks;
mod http;
mod loading;
pub mod registry;
mod response;
mod transport;

pub use collection::Collection;
pub use config::CollectionConfig;
pub use coordinator::{Mutation, RequestCoordinator};
pub use error::{CollectionError, CollectionResult, NOT_MODIFIED, TransportError, TransportResult};
pub use handle::EntityHandle;
pub use hooks::{ExtensionRegistry, Hook, HookEvent, HookId, HookOptions, Interceptor, Slot};
pub use http::{HttpConfig, HttpTransport};
pub use loading::{LoadingEvent, Operation, ProgressHooks};
pub use registry::CollectionId;
pub use response::{Body, Response};
pub use transport::{Method, RestSource, RestTransport, TransportFactory, mock};

pub use restmirror_store::CacheLookup;
pub use restmirror_types::{Entity, EntityId, Model, Params, Record, into_record};
