use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, IntoConnectionInfo};

use crate::config::RedisTimeouts;

/// Create a Redis connection manager for async operations.
///
/// `password` and `db` override whatever the URL carries. Every command sent
/// through the manager fails with a store error once `timeouts.response`
/// elapses, and connecting gives up after `timeouts.connect`.
pub async fn create_redis_pool(
    redis_url: &str,
    password: Option<&str>,
    db: Option<i64>,
    timeouts: &RedisTimeouts,
) -> anyhow::Result<ConnectionManager> {
    let mut info = redis_url.into_connection_info()?;
    if let Some(password) = password {
        info.redis.password = Some(password.to_string());
    }
    if let Some(db) = db {
        info.redis.db = db;
    }

    let client = Client::open(info)?;
    let manager_config = ConnectionManagerConfig::new()
        .set_connection_timeout(timeouts.connect)
        .set_response_timeout(timeouts.response);

    // The manager retries the first connection on its own; bound the whole attempt.
    let manager = tokio::time::timeout(
        timeouts.connect,
        ConnectionManager::new_with_config(client, manager_config),
    )
    .await
    .map_err(|_| {
        anyhow::anyhow!(
            "Timed out connecting to Redis after {}ms",
            timeouts.connect.as_millis()
        )
    })??;

    tracing::info!(db = db.unwrap_or_default(), "Connected to Redis");
    Ok(manager)
}
