//! Settle-once handles for in-flight operations.

use crate::StoreError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

type Finalizer = Box<dyn FnOnce() + Send>;

const OPEN: u8 = 0;
const CLAIMED: u8 = 1;
const CLOSED: u8 = 2;

struct Inner<T, E> {
    outcome: watch::Sender<Option<Result<T, E>>>,
    finally: Mutex<Option<Finalizer>>,
    owner: AtomicU8,
}

/// Handle to an in-flight operation whose outcome is shared by every waiter.
///
/// The handle settles at most once, through [`resolve`](Self::resolve) or
/// [`reject`](Self::reject). Later settle attempts are ignored and report
/// `false`. Clones refer to the same operation; [`ptr_eq`](Self::ptr_eq)
/// compares that identity.
///
/// The producer and a canceller race through [`claim`](Self::claim) and
/// [`close`](Self::close): exactly one of them wins, so a producer that
/// claimed the handle can publish side effects before settling without a
/// cancellation slipping in between.
pub struct PendingHandle<T, E>(Arc<Inner<T, E>>);

impl<T, E> PendingHandle<T, E>
where
    T: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    /// Creates an unsettled handle.
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self(Arc::new(Inner {
            outcome,
            finally: Mutex::new(None),
            owner: AtomicU8::new(OPEN),
        }))
    }

    /// Registers a cleanup that runs exactly once, when the handle settles,
    /// whichever way it settles. Runs immediately if the handle has already
    /// settled. Replaces any cleanup registered earlier.
    pub fn on_settle(&self, f: impl FnOnce() + Send + 'static) {
        let mut finally = self.0.finally.lock();
        if self.is_settled() {
            drop(finally);
            f();
        } else {
            *finally = Some(Box::new(f));
        }
    }

    /// Settles with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles with an error. Returns `false` if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T, E>) -> bool {
        let won = self.0.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
        if won {
            let finally = self.0.finally.lock().take();
            if let Some(f) = finally {
                f();
            }
        }
        won
    }

    /// Reserves the handle for its producer. Returns `false` if it was
    /// closed or claimed before.
    pub fn claim(&self) -> bool {
        self.transition(CLAIMED)
    }

    /// Reserves the handle for a canceller. Returns `false` if the producer
    /// claimed it first, or it was already closed.
    pub fn close(&self) -> bool {
        self.transition(CLOSED)
    }

    /// Returns whether the handle was closed by a canceller.
    pub fn is_closed(&self) -> bool {
        self.0.owner.load(Ordering::Acquire) == CLOSED
    }

    fn transition(&self, to: u8) -> bool {
        self.0
            .owner
            .compare_exchange(OPEN, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns whether the handle has settled.
    pub fn is_settled(&self) -> bool {
        self.0.outcome.borrow().is_some()
    }

    /// Returns whether both handles refer to the same operation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Waits for the outcome. Every waiter receives a clone of it.
    pub async fn wait(&self) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut rx = self.0.outcome.subscribe();
        let settled = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| E::from(StoreError::Abandoned))?;
        match &*settled {
            Some(outcome) => outcome.clone(),
            None => Err(E::from(StoreError::Abandoned)),
        }
    }
}

impl<T, E> Default for PendingHandle<T, E>
where
    T: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for PendingHandle<T, E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T, E> fmt::Debug for PendingHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("settled", &self.0.outcome.borrow().is_some())
            .finish()
    }
}
