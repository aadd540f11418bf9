use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::CacheBackend;
use crate::error::{DotwebError, Result};

/// Redis-backed cache.
///
/// ```rust,ignore
/// let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
/// server.set_cache(CacheService::new(cache));
/// ```
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

fn cache_error(op: &str, err: redis::RedisError) -> DotwebError {
    DotwebError::CacheStoreFailure(format!("redis {op} error: {err}"))
}

impl RedisCache {
    pub async fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| cache_error("connection", e))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| cache_error("connection", e))?;
        Ok(RedisCache { conn })
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(|e| cache_error("EXISTS", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| cache_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl.filter(|d| !d.is_zero()) {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl.as_secs().max(1))
                    .await
                    .map_err(|e| cache_error("SETEX", e))?;
            }
            None => {
                let _: () = conn
                    .set(key, value)
                    .await
                    .map_err(|e| cache_error("SET", e))?;
            }
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(|e| cache_error("INCR", e))
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.decr(key, 1).await.map_err(|e| cache_error("DECR", e))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| cache_error("DEL", e))?;
        Ok(removed > 0)
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error("FLUSHDB", e))?;
        Ok(())
    }
}
