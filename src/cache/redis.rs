//! Redis cache backend

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, IntoConnectionInfo};

use super::{CacheBackend, CacheError};

/// Shared Redis connection. The manager multiplexes and reconnects on its own,
/// so concurrent requests use clones of one handle without extra locking.
pub struct RedisCache {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisCache {
    /// Connect and verify the server answers `PING`
    pub async fn connect(
        url: &str,
        password: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, CacheError> {
        let mut info = url.into_connection_info().map_err(CacheError::backend)?;
        if let Some(password) = password {
            info.redis.password = Some(password.to_string());
        }

        let client = redis::Client::open(info).map_err(CacheError::backend)?;
        let mut connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(timeout))?
            .map_err(CacheError::backend)?;

        let _: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut connection))
            .await
            .map_err(|_| CacheError::Timeout(timeout))?
            .map_err(CacheError::backend)?;

        Ok(Self {
            connection,
            timeout,
        })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.clone();
        tokio::time::timeout(self.timeout, connection.get::<_, Option<String>>(key))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
            .map_err(CacheError::backend)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        // SET EX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        tokio::time::timeout(
            self.timeout,
            connection.set_ex::<_, _, ()>(key, value, seconds),
        )
        .await
        .map_err(|_| CacheError::Timeout(self.timeout))?
        .map_err(CacheError::backend)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Port 1 on localhost is never a redis server
        let result = RedisCache::connect("redis://127.0.0.1:1", None, Duration::from_millis(200)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_fails() {
        let result = RedisCache::connect("not a url", None, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(CacheError::Backend(_))));
    }
}
