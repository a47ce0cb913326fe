//! Durable queue store.
//!
//! A queue is a named list of text-encoded envelopes: `push` appends to the
//! tail, `pop` removes from the head, so each key is strictly FIFO. There is no
//! read-without-remove; once `pop` returns, the entry is gone from the store.

mod memory;
mod redis_list;

pub use memory::MemoryQueue;
pub use redis_list::RedisQueue;

use async_trait::async_trait;

use missive_common::error::NotifyError;
use missive_common::types::Envelope;

/// Key of the queue used by the notification service and its workers.
pub const DEFAULT_QUEUE_KEY: &str = "default";

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append an envelope to the tail of `key`.
    async fn push(&self, key: &str, envelope: &Envelope) -> Result<(), NotifyError>;

    /// Remove and return the head of `key`.
    ///
    /// Fails with `EmptyQueue` when there is nothing to return and with
    /// `CorruptEntry` when the head cannot be decoded.
    async fn pop(&self, key: &str) -> Result<Envelope, NotifyError>;

    /// Number of entries currently stored under `key`.
    async fn depth(&self, key: &str) -> Result<usize, NotifyError>;
}

fn encode_entry(envelope: &Envelope) -> Result<String, NotifyError> {
    envelope.encode().map_err(NotifyError::Encode)
}

fn decode_entry(key: &str, raw: &str) -> Result<Envelope, NotifyError> {
    Envelope::decode(raw).map_err(|source| NotifyError::CorruptEntry {
        key: key.to_string(),
        source,
    })
}
