//! Redis fast tier.
//!
//! Values are stored as-is with `SETEX`; expiry is left to Redis.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::FastCache;
use crate::error::StoreError;

/// Redis-backed implementation of [`FastCache`].
///
/// Holds one multiplexed [`ConnectionManager`], which reconnects on its
/// own after connection loss. Clones share the connection.
#[derive(Clone)]
pub struct RedisFastCache {
    conn: ConnectionManager,
}

impl RedisFastCache {
    /// Connect to the server at `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(map_redis_error)?;

        debug!(url = %redacted(url), "Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl FastCache for RedisFastCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value.as_ref(), seconds)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }
}

fn map_redis_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        StoreError::Connection(format!("redis: {}", err))
    } else {
        StoreError::Backend(format!("redis: {}", err))
    }
}

/// Strip credentials from a connection URL for logging.
fn redacted(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<invalid url>".to_string(),
    }
}
