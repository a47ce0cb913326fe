//! Worker pool scheduler.
//!
//! A fixed set of `pool_size` long-lived workers drains the default queue. The
//! concurrency bound comes from the worker count: each worker runs one cycle at
//! a time. Every cycle also checks out a worker token (a permit from a
//! semaphore with one permit per worker) and returns it exactly once when the
//! cycle, backoff included, is over. With one permit per worker the acquire
//! never waits; the semaphore is the observable token ledger
//! ([`WorkerPool::available_tokens`]), not the limiter.
//!
//! ```text
//! Idle ──▶ Dequeuing ──┬─▶ Backoff ─────┬──▶ Idle
//!                      └─▶ Dispatching ─┘
//! ```
//!
//! A failed dispatch (error or `success = false`) is pushed back to the tail of
//! the queue with no retry limit. Shutdown stops new dequeues, waits for
//! in-flight cycles up to a deadline, then interrupts the remaining dispatches
//! and requeues their envelopes before returning. Dequeues and requeues are
//! never interrupted, so a popped envelope is not dropped mid-flight; they are
//! bounded by the store's own timeouts (see `RedisTimeouts`).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use missive_common::config::WorkerSettings;
use missive_common::error::NotifyError;
use missive_common::types::Envelope;

use crate::service::NotificationService;

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The dispatcher reported success; the envelope is consumed.
    Delivered,
    /// Delivery failed or was interrupted; the envelope is back in the queue.
    Requeued,
    /// Delivery failed and the requeue failed too; the envelope is lost.
    RequeueFailed,
    /// Nothing was dequeued (empty queue, store error, corrupt entry).
    Idle,
}

/// Counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    cycles: AtomicU64,
    delivered: AtomicU64,
    requeued: AtomicU64,
    requeue_failures: AtomicU64,
    idle_polls: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub delivered: u64,
    pub requeued: u64,
    pub requeue_failures: u64,
    pub idle_polls: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl PoolStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            requeue_failures: self.requeue_failures.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self, outcome: CycleOutcome) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            CycleOutcome::Delivered => &self.delivered,
            CycleOutcome::Requeued => &self.requeued,
            CycleOutcome::RequeueFailed => &self.requeue_failures,
            CycleOutcome::Idle => &self.idle_polls,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bounded pool of queue-draining workers.
pub struct WorkerPool {
    size: usize,
    tokens: Arc<Semaphore>,
    stop: CancellationToken,
    abort: CancellationToken,
    workers: JoinSet<()>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Start `settings.pool_size` workers on the current runtime.
    pub fn spawn(service: Arc<NotificationService>, settings: &WorkerSettings) -> Self {
        let size = settings.pool_size.max(1);
        let tokens = Arc::new(Semaphore::new(size));
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let stats = Arc::new(PoolStats::default());

        let mut workers = JoinSet::new();
        for id in 0..size {
            let worker = Worker {
                id,
                service: service.clone(),
                tokens: tokens.clone(),
                stop: stop.clone(),
                abort: abort.clone(),
                backoff: settings.backoff,
                stats: stats.clone(),
            };
            workers.spawn(worker.run());
        }

        tracing::info!(
            pool_size = size,
            backoff_ms = settings.backoff.as_millis() as u64,
            "Worker pool started"
        );

        Self {
            size,
            tokens,
            stop,
            abort,
            workers,
            stats,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Worker tokens not currently checked out.
    pub fn available_tokens(&self) -> usize {
        self.tokens.available_permits()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Stop the pool and wait for every worker to exit.
    ///
    /// In-flight cycles get `drain` to finish on their own. After that, pending
    /// dispatches are interrupted and their envelopes requeued. Calling this
    /// again after it returned is a no-op.
    pub async fn shutdown(&mut self, drain: Duration) {
        self.stop.cancel();

        if tokio::time::timeout(drain, join_all(&mut self.workers))
            .await
            .is_err()
        {
            tracing::warn!(
                drain_ms = drain.as_millis() as u64,
                in_flight = self.stats.snapshot().in_flight,
                "Drain deadline reached, interrupting in-flight dispatches"
            );
            self.abort.cancel();
            join_all(&mut self.workers).await;
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            cycles = stats.cycles,
            delivered = stats.delivered,
            requeued = stats.requeued,
            requeue_failures = stats.requeue_failures,
            "Worker pool stopped"
        );
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }
}

struct Worker {
    id: usize,
    service: Arc<NotificationService>,
    tokens: Arc<Semaphore>,
    stop: CancellationToken,
    abort: CancellationToken,
    backoff: Duration,
    stats: Arc<PoolStats>,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "Worker started");

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                permit = self.tokens.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            self.stats.enter();
            let outcome = self.cycle().await;
            self.stats.exit(outcome);

            if outcome == CycleOutcome::Idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.backoff) => {}
                    _ = self.stop.cancelled() => {}
                }
            }

            // Token goes back exactly once per cycle, whatever the outcome.
            drop(permit);
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn cycle(&self) -> CycleOutcome {
        let envelope = match self.service.remove_from_queue().await {
            Ok(envelope) => envelope,
            Err(NotifyError::EmptyQueue(_)) => {
                tracing::trace!(worker = self.id, "Queue empty, backing off");
                return CycleOutcome::Idle;
            }
            Err(e) => {
                tracing::warn!(worker = self.id, error = %e, "Dequeue failed, backing off");
                return CycleOutcome::Idle;
            }
        };

        let result = tokio::select! {
            result = self.service.send_notification(&envelope) => Some(result),
            _ = self.abort.cancelled() => None,
        };

        match result {
            Some(Ok(outcome)) if outcome.success => CycleOutcome::Delivered,
            Some(Ok(_)) => self.requeue(envelope, "dispatcher reported failure").await,
            Some(Err(e)) => {
                let reason = e.to_string();
                self.requeue(envelope, &reason).await
            }
            None => self.requeue(envelope, "interrupted by shutdown").await,
        }
    }

    async fn requeue(&self, envelope: Envelope, reason: &str) -> CycleOutcome {
        match self.service.add_to_queue(&envelope).await {
            Ok(_) => {
                tracing::debug!(
                    worker = self.id,
                    to = %envelope.to,
                    reason,
                    "Envelope requeued"
                );
                CycleOutcome::Requeued
            }
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    channel = %envelope.channel,
                    to = %envelope.to,
                    subject = %envelope.subject,
                    reason,
                    error = %e,
                    "Requeue failed, envelope lost"
                );
                CycleOutcome::RequeueFailed
            }
        }
    }
}
