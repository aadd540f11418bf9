use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::CacheBackend;
use crate::error::{DotwebError, Result};
use crate::shutdown::ShutdownSignal;

/// Interval of the background sweep started by the server.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory cache using a HashMap. Expired entries are dropped lazily on
/// read and by the periodic sweep.
#[derive(Clone, Default)]
pub struct RuntimeCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        CacheEntry {
            value,
            expires_at: ttl.filter(|d| !d.is_zero()).map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

impl RuntimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub async fn gc(&self) -> usize {
        sweep(&self.store).await
    }

    /// Sweep every `interval` until shutdown or until the cache is dropped.
    pub fn spawn_gc(&self, interval: Duration, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        let store: Weak<RwLock<HashMap<String, CacheEntry>>> = Arc::downgrade(&self.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else {
                            break;
                        };
                        let removed = sweep(&store).await;
                        if removed > 0 {
                            tracing::debug!(removed, "cache gc");
                        }
                    }
                }
            }
        })
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64> {
        let mut store = self.store.write().await;
        let now = Instant::now();
        let entry = store
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new("0".to_string(), None));
        if entry.is_expired(now) {
            *entry = CacheEntry::new("0".to_string(), None);
        }
        let current: i64 = entry.value.trim().parse().map_err(|_| {
            DotwebError::CacheStoreFailure(format!("value of key '{key}' is not an integer"))
        })?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| DotwebError::CacheStoreFailure(format!("value of key '{key}' overflowed")))?;
        entry.value = next.to_string();
        Ok(next)
    }
}

async fn sweep(store: &RwLock<HashMap<String, CacheEntry>>) -> usize {
    let now = Instant::now();
    let mut store = store.write().await;
    let before = store.len();
    store.retain(|_, entry| !entry.is_expired(now));
    before - store.len()
}

#[async_trait::async_trait]
impl CacheBackend for RuntimeCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .store
            .read()
            .await
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let store = self.store.read().await;
        match store.get(key) {
            Some(entry) => {
                if entry.is_expired(Instant::now()) {
                    drop(store);
                    self.store.write().await.remove(key);
                    return Ok(None);
                }
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.store
            .write()
            .await
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.add(key, -1).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.store.write().await.remove(key).is_some())
    }

    async fn clear_all(&self) -> Result<()> {
        self.store.write().await.clear();
        Ok(())
    }
}
