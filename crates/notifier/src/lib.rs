//! Asynchronous notification dispatch engine.
//!
//! Envelopes are either delivered immediately through a registered dispatcher
//! or pushed to a durable queue, which a bounded worker pool drains with
//! requeue-on-failure semantics.

pub mod dispatch;
pub mod queue;
pub mod service;
pub mod worker;

pub use dispatch::{DispatchRegistry, Dispatcher};
pub use queue::{DEFAULT_QUEUE_KEY, MemoryQueue, QueueStore, RedisQueue};
pub use service::{DefaultProviders, NotificationService};
pub use worker::{CycleOutcome, StatsSnapshot, WorkerPool};
