use restmirror_store::{PendingHandle, StoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Failed(&'static str),
    Store(StoreError),
}

impl From<StoreError> for TestError {
    fn from(e: StoreError) -> Self {
        TestError::Store(e)
    }
}

// ── Settling ─────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_is_seen_by_all_waiters() {
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    let a = handle.clone();
    let b = handle.clone();

    let waiters = tokio::spawn(async move { (a.wait().await, b.wait().await) });
    tokio::task::yield_now().await;
    assert!(handle.resolve(7));

    let (ra, rb) = waiters.await.unwrap();
    assert_eq!(ra, Ok(7));
    assert_eq!(rb, Ok(7));
}

#[tokio::test]
async fn wait_after_settle_returns_immediately() {
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    handle.reject(TestError::Failed("boom"));
    assert_eq!(handle.wait().await, Err(TestError::Failed("boom")));
}

#[tokio::test]
async fn first_settle_wins() {
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    assert!(!handle.is_settled());
    assert!(handle.reject(TestError::Failed("cancelled")));
    assert!(!handle.resolve(1));
    assert!(handle.is_settled());
    assert_eq!(handle.wait().await, Err(TestError::Failed("cancelled")));
}

#[tokio::test(start_paused = true)]
async fn waiter_blocks_until_settled() {
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    let waiter = handle.clone();
    let pending = tokio::time::timeout(Duration::from_secs(5), waiter.wait()).await;
    assert!(pending.is_err());
    handle.resolve(3);
    assert_eq!(waiter.wait().await, Ok(3));
}

// ── Finalizer ────────────────────────────────────────────────────

#[test]
fn on_settle_runs_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    handle.on_settle(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    handle.resolve(1);
    handle.reject(TestError::Failed("late"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn on_settle_runs_on_reject() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    handle.on_settle(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    handle.reject(TestError::Failed("x"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn on_settle_after_settling_runs_immediately() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    handle.resolve(2);
    handle.on_settle(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

// ── Ownership ────────────────────────────────────────────────────

#[test]
fn claim_and_close_are_mutually_exclusive() {
    let claimed: PendingHandle<u32, TestError> = PendingHandle::new();
    assert!(claimed.claim());
    assert!(!claimed.close());
    assert!(!claimed.claim());
    assert!(!claimed.is_closed());

    let closed: PendingHandle<u32, TestError> = PendingHandle::new();
    assert!(closed.close());
    assert!(!closed.claim());
    assert!(closed.is_closed());
}

#[test]
fn racing_claim_and_close_have_one_winner() {
    for _ in 0..200 {
        let handle: PendingHandle<u32, TestError> = PendingHandle::new();
        let (a, b) = (handle.clone(), handle.clone());
        let producer = std::thread::spawn(move || a.claim());
        let canceller = std::thread::spawn(move || b.close());
        let claimed = producer.join().unwrap();
        let closed = canceller.join().unwrap();
        assert!(claimed ^ closed);
        assert_eq!(handle.is_closed(), closed);
    }
}

#[tokio::test]
async fn claimed_handle_still_settles() {
    let handle: PendingHandle<u32, TestError> = PendingHandle::new();
    assert!(handle.claim());
    assert!(handle.resolve(3));
    assert_eq!(handle.wait().await, Ok(3));
}

// ── Identity ─────────────────────────────────────────────────────

#[test]
fn clones_share_identity() {
    let a: PendingHandle<u32, TestError> = PendingHandle::new();
    let b = a.clone();
    let c: PendingHandle<u32, TestError> = PendingHandle::default();
    assert!(a.ptr_eq(&b));
    assert!(!a.ptr_eq(&c));
    assert!(format!("{a:?}").contains("settled: false"));
}
