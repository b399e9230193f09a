//! Core type definitions for restmirror.
//!
//! This crate defines the plugin-agnostic types shared by the store and the
//! sync layer:
//! - [`Record`] / [`Params`] — JSON field maps for entities and request parameters
//! - [`EntityId`] — the normalized value of a collection's identity field
//! - [`ParamsKey`] — canonical, key-sorted serialization of a parameter set
//! - [`Model`] — capability trait implemented by anything stored in a collection
//! - [`Entity`] — shared, in-place mutable handle to a stored model
//! - [`Detach`] — deep copies decoupled from live entity references

mod entity;
mod ids;
mod model;
mod params;

pub use entity::{Detach, Entity};
pub use ids::EntityId;
pub use model::Model;
pub use params::{Params, ParamsKey, Record, into_record, matches_subset};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}
