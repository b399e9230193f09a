//! Transport layer abstraction.
//!
//! The collection never speaks HTTP itself. It talks to a [`RestTransport`]
//! bound to one resource endpoint, or to a factory that picks the endpoint
//! per request (for nested resources such as `users/{id}/posts`).

use crate::error::TransportResult;
use async_trait::async_trait;
use restmirror_types::{EntityId, Params};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// REST verbs against one resource endpoint.
#[async_trait]
pub trait RestTransport: Send + Sync {
    /// `GET` the collection, or one member when `id` is given.
    async fn get(&self, id: Option<&EntityId>, query: &Params) -> TransportResult<Value>;

    /// `POST` a new member.
    async fn post(&self, body: &Value) -> TransportResult<Value>;

    /// `PATCH` a member with a partial body.
    async fn patch(&self, id: &EntityId, body: &Value) -> TransportResult<Value>;

    /// `PUT` a member with a full body.
    async fn put(&self, id: &EntityId, body: &Value) -> TransportResult<Value>;

    /// `DELETE` a member.
    async fn delete(&self, id: &EntityId) -> TransportResult<Value>;
}

/// Builds a transport for the parameters (or record) of one request.
pub type TransportFactory = Arc<dyn Fn(&Params) -> Arc<dyn RestTransport> + Send + Sync>;

/// Where a collection gets its transport from.
#[derive(Clone)]
pub enum RestSource {
    /// One transport for every request.
    Shared(Arc<dyn RestTransport>),
    /// A transport chosen per request.
    Factory(TransportFactory),
}

impl RestSource {
    /// Wraps a single transport.
    pub fn shared(transport: impl RestTransport + 'static) -> Self {
        Self::Shared(Arc::new(transport))
    }

    /// Wraps a per-request factory.
    pub fn factory(
        f: impl Fn(&Params) -> Arc<dyn RestTransport> + Send + Sync + 'static,
    ) -> Self {
        Self::Factory(Arc::new(f))
    }

    /// The transport to use for a request with these parameters.
    pub fn resolve(&self, params: &Params) -> Arc<dyn RestTransport> {
        match self {
            Self::Shared(transport) => Arc::clone(transport),
            Self::Factory(f) => f(params),
        }
    }
}

impl<T: RestTransport + 'static> From<Arc<T>> for RestSource {
    fn from(transport: Arc<T>) -> Self {
        Self::Shared(transport)
    }
}

impl fmt::Debug for RestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared(_) => f.write_str("RestSource::Shared"),
            Self::Factory(_) => f.write_str("RestSource::Factory"),
        }
    }
}

/// HTTP verb of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

/// A scripted in-memory transport for testing.
pub mod mock {
    use super::*;
    use crate::error::TransportError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// One call received by a [`MockTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub method: Method,
        pub id: Option<EntityId>,
        pub query: Option<Params>,
        pub body: Option<Value>,
    }

    /// Records calls and answers them from a script.
    ///
    /// - `get` returns the configured list payload.
    /// - `post` echoes the body, assigning a numeric id when it has none.
    /// - `patch`/`put` echo the body with the path id filled in.
    /// - `delete` returns `null`.
    ///
    /// Queued failures take precedence over all of the above, one per call.
    #[derive(Debug)]
    pub struct MockTransport {
        id_field: String,
        get_payload: Mutex<Value>,
        failures: Mutex<VecDeque<TransportError>>,
        delay: Mutex<Duration>,
        calls: Mutex<Vec<Call>>,
        next_id: AtomicU64,
    }

    impl MockTransport {
        /// Creates a transport that answers `get` with an empty list.
        pub fn new() -> Self {
            Self::with_id_field("id")
        }

        /// Creates a transport that assigns ids under `id_field`.
        pub fn with_id_field(id_field: impl Into<String>) -> Self {
            Self {
                id_field: id_field.into(),
                get_payload: Mutex::new(Value::Array(Vec::new())),
                failures: Mutex::new(VecDeque::new()),
                delay: Mutex::new(Duration::ZERO),
                calls: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }
        }

        /// Sets the payload returned by `get`.
        pub fn respond_with(&self, payload: Value) {
            *self.get_payload.lock() = payload;
        }

        /// Makes the next call fail with `error`.
        pub fn fail_next(&self, error: TransportError) {
            self.failures.lock().push_back(error);
        }

        /// Delays every answer.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = delay;
        }

        /// Every call received so far.
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        /// Number of calls received with `method`.
        pub fn count(&self, method: Method) -> usize {
            self.calls.lock().iter().filter(|c| c.method == method).count()
        }

        async fn answer(&self, call: Call, ok: impl FnOnce() -> Value) -> TransportResult<Value> {
            self.calls.lock().push(call);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let failure = self.failures.lock().pop_front();
            match failure {
                Some(error) => Err(error),
                None => Ok(ok()),
            }
        }

        fn with_id(&self, body: &Value, id: &EntityId) -> Value {
            let mut body = body.clone();
            if let Value::Object(map) = &mut body {
                map.entry(self.id_field.clone())
                    .or_insert_with(|| Value::String(id.to_string()));
            }
            body
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RestTransport for MockTransport {
        async fn get(&self, id: Option<&EntityId>, query: &Params) -> TransportResult<Value> {
            let call = Call {
                method: Method::Get,
                id: id.cloned(),
                query: Some(query.clone()),
                body: None,
            };
            let payload = self.get_payload.lock().clone();
            self.answer(call, || payload).await
        }

        async fn post(&self, body: &Value) -> TransportResult<Value> {
            let call = Call {
                method: Method::Post,
                id: None,
                query: None,
                body: Some(body.clone()),
            };
            let mut created = body.clone();
            if let Value::Object(map) = &mut created {
                if !map.contains_key(&self.id_field) {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    map.insert(self.id_field.clone(), Value::from(id));
                }
            }
            self.answer(call, || created).await
        }

        async fn patch(&self, id: &EntityId, body: &Value) -> TransportResult<Value> {
            let call = Call {
                method: Method::Patch,
                id: Some(id.clone()),
                query: None,
                body: Some(body.clone()),
            };
            let echoed = self.with_id(body, id);
            self.answer(call, || echoed).await
        }

        async fn put(&self, id: &EntityId, body: &Value) -> TransportResult<Value> {
            let call = Call {
                method: Method::Put,
                id: Some(id.clone()),
                query: None,
                body: Some(body.clone()),
            };
            let echoed = self.with_id(body, id);
            self.answer(call, || echoed).await
        }

        async fn delete(&self, id: &EntityId) -> TransportResult<Value> {
            let call = Call {
                method: Method::Delete,
                id: Some(id.clone()),
                query: None,
                body: None,
            };
            self.answer(call, || Value::Null).await
        }
    }
}
