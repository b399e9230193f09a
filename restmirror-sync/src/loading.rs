//! In-flight request accounting.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Kind of operation holding the loading counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Create,
    Update,
    Delete,
}

/// Passed to [`ProgressHooks`] on every counter change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingEvent {
    /// Counter value after the change.
    pub loading: usize,
    /// Operation that started or settled.
    pub operation: Operation,
}

/// Integration point for external loading indicators.
///
/// Both methods default to doing nothing.
pub trait ProgressHooks: Send + Sync {
    /// A request started.
    fn on_increment(&self, event: &LoadingEvent) {
        let _ = event;
    }

    /// A request settled, successfully or not.
    fn on_decrement(&self, event: &LoadingEvent) {
        let _ = event;
    }
}

#[derive(Default)]
pub(crate) struct LoadingCounter {
    count: AtomicUsize,
    progress: RwLock<Option<Arc<dyn ProgressHooks>>>,
}

impl LoadingCounter {
    pub(crate) fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn set_progress(&self, hooks: Option<Arc<dyn ProgressHooks>>) {
        *self.progress.write() = hooks;
    }

    /// Increments the counter until the returned guard is dropped.
    pub(crate) fn acquire(self: &Arc<Self>, operation: Operation) -> LoadingGuard {
        let loading = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        let progress = self.progress.read().clone();
        if let Some(hooks) = progress {
            hooks.on_increment(&LoadingEvent { loading, operation });
        }
        LoadingGuard {
            counter: Arc::clone(self),
            operation,
        }
    }
}

/// RAII guard that decrements the loading counter on drop.
pub(crate) struct LoadingGuard {
    counter: Arc<LoadingCounter>,
    operation: Operation,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let loading = self.counter.count.fetch_sub(1, Ordering::AcqRel) - 1;
        let progress = self.counter.progress.read().clone();
        if let Some(hooks) = progress {
            hooks.on_decrement(&LoadingEvent {
                loading,
                operation: self.operation,
            });
        }
    }
}
