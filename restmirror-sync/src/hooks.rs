//! Extension slots and the fetch interceptor chain.
//!
//! Hooks are plain callbacks registered against a [`Slot`]. Within a slot
//! they run in registration order, synchronously, on the task that triggered
//! the event. A panicking hook is not caught here.
//!
//! Interceptors are different: they sit in the success path of every fetch
//! and may be arbitrary code, so each one is isolated. A failing, panicking
//! or empty interceptor is logged and skipped, and the chain continues with
//! the previous value.

use crate::error::CollectionError;
use crate::response::Response;
use parking_lot::Mutex;
use restmirror_types::{Entity, Params, Record};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Lifecycle points that accept hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Before a record enters the store. Receives [`HookEvent::Incoming`].
    AddBefore,
    /// After an entity entered the store. Receives [`HookEvent::Entity`].
    AddAfter,
    /// After a stored entity was merged with new fields.
    Update,
    /// After an entity left the store.
    Remove,
    /// Before a fetch goes to the transport. Receives [`HookEvent::Request`].
    FetchBefore,
    /// After a fetch succeeded. Receives [`HookEvent::Success`].
    FetchSuccess,
    /// After a fetch failed. Receives [`HookEvent::Failure`].
    FetchError,
    /// After every settled fetch, with either outcome.
    FetchFinal,
}

/// What a hook is called with.
pub enum HookEvent<'a, M> {
    /// A record about to be stored. Hooks may edit it.
    Incoming(&'a mut Record),
    /// A stored entity.
    Entity(&'a Entity<M>),
    /// Parameters of a fetch about to be issued.
    Request(&'a Params),
    /// A successful fetch.
    Success {
        response: &'a Response<M>,
        params: &'a Params,
    },
    /// A failed fetch.
    Failure {
        error: &'a CollectionError,
        params: &'a Params,
    },
}

impl<M> fmt::Debug for HookEvent<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming(record) => f.debug_tuple("Incoming").field(record).finish(),
            Self::Entity(_) => f.write_str("Entity"),
            Self::Request(params) => f.debug_tuple("Request").field(params).finish(),
            Self::Success { params, .. } => f.debug_struct("Success").field("params", params).finish(),
            Self::Failure { error, params } => f
                .debug_struct("Failure")
                .field("error", error)
                .field("params", params)
                .finish(),
        }
    }
}

/// A hook callback.
pub type Hook<M> = Arc<dyn Fn(&mut HookEvent<'_, M>) + Send + Sync>;

/// A fetch interceptor. Receives the current payload and the request
/// parameters and returns the replacement payload.
pub type Interceptor = Arc<dyn Fn(&Value, &Params) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Registration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookOptions {
    /// Remove the hook after its first run.
    pub once: bool,
}

impl HookOptions {
    pub fn once() -> Self {
        Self { once: true }
    }
}

/// Identifies a registration, for [`ExtensionRegistry::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

struct Registered<M> {
    id: HookId,
    hook: Hook<M>,
    once: bool,
}

/// Per-collection table of hooks and interceptors.
pub struct ExtensionRegistry<M> {
    slots: Mutex<HashMap<Slot, Vec<Registered<M>>>>,
    interceptors: Mutex<Vec<(HookId, Interceptor)>>,
    next_id: AtomicU64,
}

impl<M> ExtensionRegistry<M> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            interceptors: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> HookId {
        HookId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends `hook` to `slot`.
    pub fn register(&self, slot: Slot, hook: Hook<M>, options: HookOptions) -> HookId {
        let id = self.next_id();
        self.slots.lock().entry(slot).or_default().push(Registered {
            id,
            hook,
            once: options.once,
        });
        debug!(?slot, hook = %id, once = options.once, "Registered hook");
        id
    }

    /// Appends `interceptor` to the fetch interceptor chain.
    pub fn register_interceptor(&self, interceptor: Interceptor) -> HookId {
        let id = self.next_id();
        self.interceptors.lock().push((id, interceptor));
        id
    }

    /// Removes a hook or interceptor. Returns whether it was registered.
    pub fn unregister(&self, id: HookId) -> bool {
        let mut removed = false;
        for hooks in self.slots.lock().values_mut() {
            let before = hooks.len();
            hooks.retain(|r| r.id != id);
            removed |= hooks.len() != before;
        }
        let mut interceptors = self.interceptors.lock();
        let before = interceptors.len();
        interceptors.retain(|(i, _)| *i != id);
        removed || interceptors.len() != before
    }

    /// Removes every hook and interceptor.
    pub fn reset(&self) {
        self.slots.lock().clear();
        self.interceptors.lock().clear();
    }

    /// Number of hooks registered on `slot`.
    pub fn len(&self, slot: Slot) -> usize {
        self.slots.lock().get(&slot).map_or(0, Vec::len)
    }

    /// Number of interceptors in the chain.
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.lock().len()
    }

    /// Runs the hooks of `slot` in registration order.
    ///
    /// The table is not locked while hooks run, so a hook may register or
    /// unregister others; changes apply from the next event on. `once`
    /// hooks are removed before they are invoked.
    pub fn run(&self, slot: Slot, event: &mut HookEvent<'_, M>) {
        let hooks: Vec<Hook<M>> = {
            let mut slots = self.slots.lock();
            let Some(registered) = slots.get_mut(&slot) else {
                return;
            };
            let hooks = registered.iter().map(|r| Arc::clone(&r.hook)).collect();
            registered.retain(|r| !r.once);
            hooks
        };
        for hook in hooks {
            hook(&mut *event);
        }
    }

    /// Passes `payload` through the interceptor chain.
    pub fn run_interceptors(&self, payload: Value, params: &Params) -> Value {
        let chain = self.interceptors.lock().clone();
        chain.iter().fold(payload, |current, (id, interceptor)| {
            let outcome = catch_unwind(AssertUnwindSafe(|| interceptor(&current, params)));
            match outcome {
                Ok(Ok(Some(next))) if !next.is_null() => next,
                Ok(Ok(_)) => {
                    warn!(interceptor = %id, "Interceptor returned no value, keeping previous response");
                    current
                }
                Ok(Err(e)) => {
                    warn!(interceptor = %id, error = %e, "Interceptor failed, keeping previous response");
                    current
                }
                Err(_) => {
                    error!(interceptor = %id, "Interceptor panicked, keeping previous response");
                    current
                }
            }
        })
    }
}

impl<M> Default for ExtensionRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for ExtensionRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let counts: HashMap<Slot, usize> = slots.iter().map(|(s, h)| (*s, h.len())).collect();
        f.debug_struct("ExtensionRegistry")
            .field("slots", &counts)
            .field("interceptors", &self.interceptors.lock().len())
            .finish()
    }
}
