//! Error types for the sync layer.

use restmirror_store::StoreError;
use serde_json::Value;
use thiserror::Error;

/// HTTP status a transport reports when the client's copy is still current.
pub const NOT_MODIFIED: u16 = 304;

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// A failed transport call, carrying whatever the server sent back.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("transport error (status {status:?}): {message}")]
pub struct TransportError {
    /// HTTP status, or `None` when no response was received.
    pub status: Option<u16>,
    /// Human-readable reason.
    pub message: String,
    /// Response body, when there was one and it was JSON.
    pub body: Option<Value>,
}

impl TransportError {
    /// An error response with a status code.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            body: None,
        }
    }

    /// A failure before any response arrived (connection, timeout, decoding).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Attaches the response body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether the server answered 304 Not Modified.
    pub fn is_not_modified(&self) -> bool {
        self.status == Some(NOT_MODIFIED)
    }
}

/// Errors surfaced by collection operations.
///
/// `Clone` because one settled fetch is delivered to every caller that
/// joined it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectionError {
    /// The transport rejected the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request was abandoned through `cancel_all_requests`.
    #[error("request cancelled")]
    Cancelled,

    /// A write needed the record's identity but it had none.
    #[error("record has no identity field '{field}'")]
    MissingIdentity { field: String },

    /// An entity handle outlived its collection.
    #[error("owning collection no longer exists")]
    Detached,

    /// A pending request was dropped without ever settling.
    #[error("pending request abandoned")]
    Abandoned,
}

impl CollectionError {
    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The transport status, if the error came from the transport.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status,
            _ => None,
        }
    }
}

impl From<StoreError> for CollectionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Abandoned => Self::Abandoned,
        }
    }
}
