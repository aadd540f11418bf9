//! Key/value cache with optional expiry.
//!
//! [`CacheService`] is the handle stored on the server and reachable from
//! handlers through `ctx.cache()`. It wraps a pluggable [`CacheBackend`]:
//! [`RuntimeCache`] keeps entries in process, `RedisCache` (feature
//! `redis`) talks to a Redis server.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DotwebError, Result};

pub use memory::{DEFAULT_GC_INTERVAL, RuntimeCache};
#[cfg(feature = "redis")]
pub use redis::RedisCache;

/// Cache backend trait for pluggable caching strategies.
///
/// A `ttl` of `None` or zero keeps the entry until it is deleted.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Raw value, or `None` when the key is missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically add one to the integer stored under `key`, treating a
    /// missing key as zero, and return the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Atomically subtract one, see [`incr`](Self::incr).
    async fn decr(&self, key: &str) -> Result<i64>;

    /// Remove `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drop every entry.
    async fn clear_all(&self) -> Result<()>;
}

/// The cache handle used by the application.
///
/// ```rust,ignore
/// let cache = ctx.cache().expect("cache configured");
/// if let Some(user) = cache.get_json::<User>("user:1").await? {
///     return ctx.write_json(&user).map(|_| ());
/// }
/// cache.set_json("user:1", &user, Some(Duration::from_secs(300))).await?;
/// ```
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
}

impl CacheService {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        CacheService {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn CacheBackend>) -> Self {
        CacheService { backend }
    }

    /// In-process cache without a background collector.
    pub fn in_memory() -> Self {
        CacheService::new(RuntimeCache::new())
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(key).await
    }

    /// Value as a string, `""` when missing.
    pub async fn get_string(&self, key: &str) -> Result<String> {
        Ok(self.backend.get(key).await?.unwrap_or_default())
    }

    /// Value parsed as `i32`; a missing key reads as `0`.
    pub async fn get_int(&self, key: &str) -> Result<i32> {
        self.get_parsed(key).await
    }

    /// Value parsed as `i64`; a missing key reads as `0`.
    pub async fn get_int64(&self, key: &str) -> Result<i64> {
        self.get_parsed(key).await
    }

    async fn get_parsed<T: std::str::FromStr + Default>(&self, key: &str) -> Result<T> {
        match self.backend.get(key).await? {
            Some(raw) => raw.trim().parse().map_err(|_| {
                DotwebError::CacheStoreFailure(format!("value of key '{key}' is not an integer"))
            }),
            None => Ok(T::default()),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw).map_err(|e| {
                    DotwebError::CacheStoreFailure(format!("cache deserialize error: {e}"))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.backend.set(key, value, ttl).await
    }

    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| DotwebError::CacheStoreFailure(format!("cache serialize error: {e}")))?;
        self.backend.set(key, &raw, ttl).await
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.backend.incr(key).await
    }

    pub async fn decr(&self, key: &str) -> Result<i64> {
        self.backend.decr(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(key).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.backend.clear_all().await
    }
}
