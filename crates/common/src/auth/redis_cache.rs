//! Redis implementation of [`KeyValueCache`]
//!
//! One multiplexed connection is opened on first use and shared by every
//! caller afterwards. Values are written with `SET key value EX ttl`.

use std::time::Duration;

use async_trait::async_trait;
use nimbus_domain::SdkError;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tracing::debug;

use super::traits::KeyValueCache;

/// [`KeyValueCache`] over a Redis server
pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisCache {
    /// Prepare a cache for `url` (`redis://` or `rediss://`). No connection
    /// is made until the first command.
    ///
    /// # Errors
    /// Returns [`SdkError::Config`] if the URL is not a valid Redis URL.
    pub fn open(url: &str) -> Result<Self, SdkError> {
        let client = redis::Client::open(url)
            .map_err(|e| SdkError::Config(format!("invalid redis URL: {e}")))?;
        Ok(Self { client, connection: OnceCell::new() })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, SdkError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                debug!("opening redis connection");
                self.client.get_multiplexed_async_connection().await.map_err(redis_error)
            })
            .await?;
        Ok(connection.clone())
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SdkError> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(redis_error)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), SdkError> {
        let mut conn = self.connection().await?;
        conn.set_ex(key, value, ttl.as_secs().max(1)).await.map_err(redis_error)
    }

    async fn delete(&self, key: &str) -> Result<(), SdkError> {
        let mut conn = self.connection().await?;
        conn.del(key).await.map_err(redis_error)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("connected", &self.connection.initialized())
            .finish_non_exhaustive()
    }
}

fn redis_error(err: redis::RedisError) -> SdkError {
    SdkError::Storage(format!("redis: {err}"))
}
