//! Read-through cache with graceful degradation.
//!
//! [`CacheStore`] never surfaces a backend failure: errors become misses on
//! `get` and `false` on `set`. A store built without a backend behaves exactly
//! like a permanently cold cache, so nothing downstream depends on the cache
//! being reachable.

pub mod local;
pub mod redis;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::config::{CacheBackendKind, CacheConfig};
use crate::telemetry::metrics;

pub use local::LocalCache;
pub use redis::RedisCache;

/// Failure inside a cache backend. Never leaves this module.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Storage behind a [`CacheStore`]: string keys, serialized string values, per-entry TTL
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a value; `Ok(None)` on a miss or an expired entry
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// JSON-valued cache over an optional backend. Cheap to clone.
#[derive(Clone, Default)]
pub struct CacheStore {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl CacheStore {
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A store that always misses
    #[must_use]
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Connect the configured backend. Any failure yields a disabled store.
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.enabled {
            tracing::info!(reason = "disabled by configuration", "cache_disabled");
            return Self::disabled();
        }

        let timeout = config.operation_timeout();
        let backend: Result<Arc<dyn CacheBackend>, CacheError> = match config.backend {
            CacheBackendKind::Redis => {
                let Some(url) = config.redis_url.as_deref() else {
                    tracing::info!(reason = "redis_url not configured", "cache_disabled");
                    return Self::disabled();
                };
                RedisCache::connect(url, config.redis_password.as_deref(), timeout)
                    .await
                    .map(|cache| Arc::new(cache) as Arc<dyn CacheBackend>)
            }
            CacheBackendKind::Local => LocalCache::open(&config.local_path)
                .await
                .map(|cache| Arc::new(cache) as Arc<dyn CacheBackend>),
        };

        match backend {
            Ok(backend) => {
                tracing::info!(backend = backend.name(), "cache_connected");
                Self::new(backend)
            }
            Err(err) => {
                tracing::warn!(error = %err, "cache_connection_failed");
                Self::disabled()
            }
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Look up and decode a value. Backend errors and undecodable payloads are misses.
    #[tracing::instrument(name = "cache_get", level = "debug", skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let family = key_family(key);

        let raw = match backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key, "cache_miss");
                metrics::record_cache_lookup(family, "miss");
                return None;
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "cache_get_error");
                metrics::record_cache_lookup(family, "error");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key, "cache_hit");
                metrics::record_cache_lookup(family, "hit");
                Some(value)
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "cache_decode_error");
                metrics::record_cache_lookup(family, "error");
                None
            }
        }
    }

    /// Encode and store a value. Returns whether the write reached the backend.
    #[tracing::instrument(name = "cache_set", level = "debug", skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache_encode_error");
                return false;
            }
        };

        match backend.set(key, raw, ttl).await {
            Ok(()) => {
                tracing::debug!(key, ttl_secs = ttl.as_secs(), "cache_set");
                true
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "cache_set_error");
                false
            }
        }
    }
}

/// Prefix of a cache key (`coords`, `weather`), used as a metric label
fn key_family(key: &str) -> &str {
    key.split_once(':').map_or(key, |(family, _)| family)
}
