//! Embedded on-disk cache backend (fjall), for single-instance deployments

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use fjall::Keyspace;
use serde::{Deserialize, Serialize};
use tokio::task;

use super::{CacheBackend, CacheError};

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: u64, // Unix timestamp (seconds)
}

/// Cache entries persisted in a local fjall keyspace
pub struct LocalCache {
    _db: fjall::Database,
    store: Keyspace,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>, CacheError> {
    Ok(store.get(key).map_err(CacheError::backend)?.map(|v| v.to_vec()))
}

fn unix_now() -> Result<u64, CacheError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(CacheError::backend)?
        .as_secs())
}

impl LocalCache {
    /// Open (or create) the keyspace under `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        task::spawn_blocking(move || {
            let db = fjall::Database::builder(&path)
                .open()
                .map_err(CacheError::backend)?;
            let items = db
                .keyspace("cache", fjall::KeyspaceCreateOptions::default)
                .map_err(CacheError::backend)?;
            Ok(LocalCache {
                _db: db,
                store: items,
            })
        })
        .await
        .map_err(CacheError::backend)?
    }

    /// Manually removes a key from the cache.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let key = key.as_bytes().to_vec();
        let store = self.store.clone();
        task::spawn_blocking(move || store.remove(key))
            .await
            .map_err(CacheError::backend)?
            .map_err(CacheError::backend)
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    /// Retrieves a value if it exists and has not expired; expired entries are removed.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();

        let maybe_bytes = task::spawn_blocking(move || get_from_store(store, key_bytes))
            .await
            .map_err(CacheError::backend)??;

        let Some(bytes) = maybe_bytes else {
            return Ok(None);
        };

        let entry: StoredEntry = postcard::from_bytes(&bytes).map_err(CacheError::backend)?;
        if unix_now()? < entry.expires_at {
            Ok(Some(entry.value))
        } else {
            tracing::debug!(key, "Key found but expired");
            self.remove(key).await?;
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        let expires_at = unix_now()?.saturating_add(ttl.as_secs());
        let bytes = postcard::to_stdvec(&StoredEntry { value, expires_at })
            .map_err(CacheError::backend)?;

        task::spawn_blocking(move || store.insert(key, bytes))
            .await
            .map_err(CacheError::backend)?
            .map_err(CacheError::backend)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).await.unwrap();

        cache
            .set("coords:london", "{\"latitude\":1.0}".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.get("coords:london").await.unwrap().as_deref(),
            Some("{\"latitude\":1.0}")
        );
        assert!(cache.get("coords:paris").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_entry_is_expired() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).await.unwrap();

        cache
            .set("weather:1.00:2.00", "{}".to_string(), Duration::ZERO)
            .await
            .unwrap();
        assert!(cache.get("weather:1.00:2.00").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).await.unwrap();

        cache.set("k", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.remove("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
