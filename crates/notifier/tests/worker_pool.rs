//! Worker pool behaviour against the in-memory queue store.
//!
//! ```bash
//! cargo test -p missive-notifier --test worker_pool
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use missive_common::config::{ProviderSettings, WorkerSettings};
use missive_common::error::NotifyError;
use missive_common::types::{Channel, DispatchOutcome, Envelope};
use missive_notifier::dispatch::{DispatchRegistry, Dispatcher};
use missive_notifier::queue::{DEFAULT_QUEUE_KEY, MemoryQueue, QueueStore};
use missive_notifier::service::{DefaultProviders, NotificationService};
use missive_notifier::worker::WorkerPool;

// ============================================================
// Helpers
// ============================================================

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Decline,
    Hang,
}

/// Shared observations of every dispatch attempt.
#[derive(Default)]
struct Probe {
    attempts: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    recipients: Mutex<Vec<String>>,
}

struct ProbeDispatcher {
    probe: Arc<Probe>,
    behavior: Behavior,
    delay: Duration,
    envelope: Envelope,
}

#[async_trait]
impl Dispatcher for ProbeDispatcher {
    fn provider(&self) -> &str {
        "probe"
    }

    async fn dispatch(&self) -> Result<DispatchOutcome, NotifyError> {
        let now = self.probe.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(now, Ordering::SeqCst);
        self.probe.attempts.fetch_add(1, Ordering::SeqCst);
        self.probe
            .recipients
            .lock()
            .unwrap()
            .push(self.envelope.to.clone());

        if matches!(self.behavior, Behavior::Hang) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
        self.probe.current.fetch_sub(1, Ordering::SeqCst);

        match self.behavior {
            Behavior::Succeed => Ok(DispatchOutcome::delivered()),
            Behavior::Decline => Ok(DispatchOutcome::failed()),
            _ => Err(NotifyError::Config("deterministic failure".to_string())),
        }
    }
}

fn probe_service(
    store: Arc<dyn QueueStore>,
    probe: Arc<Probe>,
    behavior: Behavior,
    delay: Duration,
) -> Arc<NotificationService> {
    let mut registry = DispatchRegistry::new(ProviderSettings::default());
    registry.register(Channel::Email, "probe", move |envelope, _| {
        Box::new(ProbeDispatcher {
            probe: probe.clone(),
            behavior,
            delay,
            envelope,
        })
    });
    Arc::new(NotificationService::new(
        store,
        registry,
        DefaultProviders::new().with(Channel::Email, "probe"),
    ))
}

fn settings(pool_size: usize, backoff: Duration) -> WorkerSettings {
    WorkerSettings {
        pool_size,
        backoff,
        drain_timeout: Duration::from_secs(1),
    }
}

fn envelopes(n: usize) -> Vec<Envelope> {
    (0..n)
        .map(|i| Envelope::email(format!("user{}@example.com", i), "s", "m"))
        .collect()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

async fn drain(queue: &MemoryQueue) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = queue.pop(DEFAULT_QUEUE_KEY).await {
        out.push(envelope);
    }
    out
}

/// Store whose every command fails as if Redis were unreachable.
struct UnreachableStore;

#[async_trait]
impl QueueStore for UnreachableStore {
    async fn push(&self, _key: &str, _envelope: &Envelope) -> Result<(), NotifyError> {
        Err(unreachable_error())
    }

    async fn pop(&self, _key: &str) -> Result<Envelope, NotifyError> {
        Err(unreachable_error())
    }

    async fn depth(&self, _key: &str) -> Result<usize, NotifyError> {
        Err(unreachable_error())
    }
}

fn unreachable_error() -> NotifyError {
    redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into()
}

/// Store that hands out one envelope and then rejects every push.
struct PopOnlyStore {
    slot: Mutex<Option<Envelope>>,
}

#[async_trait]
impl QueueStore for PopOnlyStore {
    async fn push(&self, _key: &str, _envelope: &Envelope) -> Result<(), NotifyError> {
        Err(unreachable_error())
    }

    async fn pop(&self, key: &str) -> Result<Envelope, NotifyError> {
        self.slot
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| NotifyError::EmptyQueue(key.to_string()))
    }

    async fn depth(&self, _key: &str) -> Result<usize, NotifyError> {
        Ok(self.slot.lock().unwrap().iter().count())
    }
}

// ============================================================
// Tests
// ============================================================

#[tokio::test]
async fn test_failed_envelopes_are_requeued_with_bounded_concurrency() {
    let queue = Arc::new(MemoryQueue::default());
    let originals = envelopes(5);
    for envelope in &originals {
        queue.push(DEFAULT_QUEUE_KEY, envelope).await.unwrap();
    }

    let probe = Arc::new(Probe::default());
    let service = probe_service(
        queue.clone(),
        probe.clone(),
        Behavior::Fail,
        Duration::from_millis(20),
    );
    let mut pool = WorkerPool::spawn(service, &settings(2, Duration::from_millis(10)));

    wait_until(|| probe.attempts.load(Ordering::SeqCst) >= 5).await;
    pool.shutdown(Duration::from_secs(1)).await;

    // Every envelope was attempted and is still retrievable.
    let attempted: HashSet<String> = probe.recipients.lock().unwrap().iter().cloned().collect();
    let expected: HashSet<String> = originals.iter().map(|e| e.to.clone()).collect();
    assert_eq!(attempted, expected);

    let remaining = drain(&queue).await;
    assert_eq!(remaining.len(), 5);
    let remaining: HashSet<String> = remaining.into_iter().map(|e| e.to).collect();
    assert_eq!(remaining, expected);

    assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    let stats = pool.stats();
    assert!(stats.peak_in_flight <= 2);
    assert_eq!(stats.delivered, 0);
    assert!(stats.requeued >= 5);
    assert_eq!(pool.available_tokens(), 2);
}

#[tokio::test]
async fn test_declined_dispatch_is_requeued() {
    let queue = Arc::new(MemoryQueue::default());
    let envelope = Envelope::email("declined@example.com", "s", "m");
    queue.push(DEFAULT_QUEUE_KEY, &envelope).await.unwrap();

    let probe = Arc::new(Probe::default());
    let service = probe_service(
        queue.clone(),
        probe.clone(),
        Behavior::Decline,
        Duration::from_millis(1),
    );
    let mut pool = WorkerPool::spawn(service, &settings(1, Duration::from_millis(10)));

    wait_until(|| pool.stats().requeued >= 1).await;
    pool.shutdown(Duration::from_secs(1)).await;

    assert!(probe.attempts.load(Ordering::SeqCst) >= 1);
    assert_eq!(drain(&queue).await, vec![envelope]);
    let stats = pool.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.requeue_failures, 0);
    assert!(stats.requeued >= 1);
    assert_eq!(pool.available_tokens(), 1);
}

#[tokio::test]
async fn test_successful_dispatch_consumes_envelopes() {
    let queue = Arc::new(MemoryQueue::default());
    for envelope in envelopes(3) {
        queue.push(DEFAULT_QUEUE_KEY, &envelope).await.unwrap();
    }

    let probe = Arc::new(Probe::default());
    let service = probe_service(
        queue.clone(),
        probe.clone(),
        Behavior::Succeed,
        Duration::from_millis(1),
    );
    let mut pool = WorkerPool::spawn(service, &settings(2, Duration::from_millis(10)));

    wait_until(|| probe.attempts.load(Ordering::SeqCst) >= 3).await;
    pool.shutdown(Duration::from_secs(1)).await;

    assert_eq!(queue.depth(DEFAULT_QUEUE_KEY).await.unwrap(), 0);
    assert_eq!(probe.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(pool.stats().delivered, 3);
    assert_eq!(pool.available_tokens(), 2);
}

#[tokio::test]
async fn test_wide_pool_never_exceeds_its_size() {
    let queue = Arc::new(MemoryQueue::default());
    for envelope in envelopes(40) {
        queue.push(DEFAULT_QUEUE_KEY, &envelope).await.unwrap();
    }

    let probe = Arc::new(Probe::default());
    let service = probe_service(
        queue.clone(),
        probe.clone(),
        Behavior::Succeed,
        Duration::from_millis(5),
    );
    let mut pool = WorkerPool::spawn(service, &settings(4, Duration::from_millis(10)));

    wait_until(|| probe.attempts.load(Ordering::SeqCst) >= 40).await;
    pool.shutdown(Duration::from_secs(1)).await;

    assert!(probe.peak.load(Ordering::SeqCst) <= 4);
    assert!(pool.stats().peak_in_flight <= 4);
    assert_eq!(pool.available_tokens(), 4);
}

#[tokio::test]
async fn test_empty_queue_backs_off_and_shutdown_interrupts_backoff() {
    let queue = Arc::new(MemoryQueue::default());
    let probe = Arc::new(Probe::default());
    let service = probe_service(
        queue.clone(),
        probe.clone(),
        Behavior::Succeed,
        Duration::from_millis(1),
    );
    // A backoff far longer than the test; shutdown must not wait for it.
    let mut pool = WorkerPool::spawn(service, &settings(2, Duration::from_secs(60)));

    wait_until(|| pool.stats().idle_polls == 2).await;
    // Both workers hold their token while backing off.
    assert_eq!(pool.available_tokens(), 0);

    tokio::time::timeout(
        Duration::from_secs(2),
        pool.shutdown(Duration::from_secs(5)),
    )
    .await
    .expect("shutdown should interrupt the backoff sleep");

    assert_eq!(probe.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(pool.stats().idle_polls, 2);
    assert_eq!(pool.available_tokens(), 2);
}

#[tokio::test]
async fn test_unreachable_store_enters_backoff() {
    let probe = Arc::new(Probe::default());
    let service = probe_service(
        Arc::new(UnreachableStore),
        probe.clone(),
        Behavior::Succeed,
        Duration::from_millis(1),
    );

    let err = service
        .add_to_queue(&Envelope::email("a@b.com", "s", "m"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::Store(_)));

    let mut pool = WorkerPool::spawn(service, &settings(2, Duration::from_millis(5)));
    wait_until(|| pool.stats().idle_polls >= 4).await;
    pool.shutdown(Duration::from_secs(1)).await;

    assert_eq!(probe.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(pool.available_tokens(), 2);
}

#[tokio::test]
async fn test_shutdown_requeues_interrupted_dispatch() {
    let queue = Arc::new(MemoryQueue::default());
    let envelope = Envelope::email("stuck@example.com", "s", "m");
    queue.push(DEFAULT_QUEUE_KEY, &envelope).await.unwrap();

    let probe = Arc::new(Probe::default());
    let service = probe_service(
        queue.clone(),
        probe.clone(),
        Behavior::Hang,
        Duration::ZERO,
    );
    let mut pool = WorkerPool::spawn(service, &settings(2, Duration::from_millis(10)));

    wait_until(|| probe.attempts.load(Ordering::SeqCst) == 1).await;
    assert_eq!(queue.depth(DEFAULT_QUEUE_KEY).await.unwrap(), 0);

    pool.shutdown(Duration::from_millis(50)).await;

    assert_eq!(drain(&queue).await, vec![envelope]);
    assert_eq!(pool.stats().requeued, 1);
    assert_eq!(pool.available_tokens(), 2);
}

#[tokio::test]
async fn test_failed_requeue_is_counted() {
    let store = Arc::new(PopOnlyStore {
        slot: Mutex::new(Some(Envelope::email("lost@example.com", "s", "m"))),
    });
    let probe = Arc::new(Probe::default());
    let service = probe_service(
        store.clone(),
        probe.clone(),
        Behavior::Fail,
        Duration::from_millis(1),
    );
    let mut pool = WorkerPool::spawn(service, &settings(1, Duration::from_millis(5)));

    wait_until(|| pool.stats().requeue_failures == 1).await;
    pool.shutdown(Duration::from_secs(1)).await;

    assert_eq!(probe.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(store.depth(DEFAULT_QUEUE_KEY).await.unwrap(), 0);
    assert_eq!(pool.available_tokens(), 1);
}
