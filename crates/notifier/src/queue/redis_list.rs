//! Redis list-backed queue store.
//!
//! `RPUSH` appends to the tail and `LPOP` removes from the head. Each command is
//! atomic on the server, so a single `ConnectionManager` is shared by every
//! worker without extra locking.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use missive_common::config::CorruptEntryPolicy;
use missive_common::error::NotifyError;
use missive_common::types::Envelope;

use super::{QueueStore, decode_entry, encode_entry};

#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    corrupt_policy: CorruptEntryPolicy,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, corrupt_policy: CorruptEntryPolicy) -> Self {
        Self {
            conn,
            corrupt_policy,
        }
    }

    async fn handle_corrupt(&self, key: &str, raw: String, error: &NotifyError) {
        match self.corrupt_policy {
            CorruptEntryPolicy::Preserve => {
                let mut conn = self.conn.clone();
                match conn.rpush::<_, _, usize>(key, &raw).await {
                    Ok(_) => tracing::warn!(
                        key,
                        error = %error,
                        "Corrupt queue entry pushed back for inspection"
                    ),
                    Err(e) => tracing::error!(
                        key,
                        raw = %raw,
                        error = %e,
                        "Failed to push back corrupt queue entry; value lost"
                    ),
                }
            }
            CorruptEntryPolicy::Discard => {
                tracing::warn!(key, raw = %raw, error = %error, "Corrupt queue entry discarded");
            }
        }
    }
}

#[async_trait]
impl QueueStore for RedisQueue {
    async fn push(&self, key: &str, envelope: &Envelope) -> Result<(), NotifyError> {
        let value = encode_entry(envelope)?;
        let mut conn = self.conn.clone();

        // RPUSH replies with the list length after the append.
        let len: usize = conn.rpush(key, value).await?;
        if len == 0 {
            return Err(NotifyError::InvalidKey(key.to_string()));
        }

        tracing::debug!(key, len, "Envelope pushed");
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Envelope, NotifyError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.lpop(key, None).await?;
        let raw = raw.ok_or_else(|| NotifyError::EmptyQueue(key.to_string()))?;

        match decode_entry(key, &raw) {
            Ok(envelope) => Ok(envelope),
            Err(e) => {
                self.handle_corrupt(key, raw, &e).await;
                Err(e)
            }
        }
    }

    async fn depth(&self, key: &str) -> Result<usize, NotifyError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(key).await?)
    }
}
