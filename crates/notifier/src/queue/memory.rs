//! In-process queue store.
//!
//! Holds the same text encoding as the Redis store and applies the same
//! corrupt-entry policy, but nothing survives a restart.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use missive_common::config::CorruptEntryPolicy;
use missive_common::error::NotifyError;
use missive_common::types::Envelope;

use super::{QueueStore, decode_entry, encode_entry};

#[derive(Debug, Default)]
pub struct MemoryQueue {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    corrupt_policy: CorruptEntryPolicy,
}

impl MemoryQueue {
    pub fn new(corrupt_policy: CorruptEntryPolicy) -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            corrupt_policy,
        }
    }

    /// Append an already-encoded value, bypassing envelope encoding.
    pub async fn push_raw(&self, key: &str, raw: impl Into<String>) {
        self.lists
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .push_back(raw.into());
    }

    /// Snapshot of the raw values under `key`, head first.
    pub async fn raw_entries(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .await
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn push(&self, key: &str, envelope: &Envelope) -> Result<(), NotifyError> {
        let value = encode_entry(envelope)?;
        self.push_raw(key, value).await;
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Envelope, NotifyError> {
        let mut lists = self.lists.lock().await;
        let empty = || NotifyError::EmptyQueue(key.to_string());
        let list = lists.get_mut(key).ok_or_else(empty)?;
        let raw = list.pop_front().ok_or_else(empty)?;

        decode_entry(key, &raw).inspect_err(|e| {
            match self.corrupt_policy {
                CorruptEntryPolicy::Preserve => {
                    tracing::warn!(key, error = %e, "Corrupt queue entry pushed back for inspection");
                    list.push_back(raw);
                }
                CorruptEntryPolicy::Discard => {
                    tracing::warn!(key, error = %e, "Corrupt queue entry discarded");
                }
            }
        })
    }

    async fn depth(&self, key: &str) -> Result<usize, NotifyError> {
        Ok(self.lists.lock().await.get(key).map_or(0, VecDeque::len))
    }
}
