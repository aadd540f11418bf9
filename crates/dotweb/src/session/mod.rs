//! Server-side sessions.
//!
//! A session is identified by a random id carried in a cookie. Its values
//! live in a [`SessionStore`]; every mutation through [`SessionState`] is
//! written back to the store that produced it.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{DotwebError, Result};
use crate::shutdown::ShutdownSignal;

pub use memory::RuntimeStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

pub const DEFAULT_SESSION_COOKIE_NAME: &str = "dotweb_sessionId";
pub const SESSION_MODE_RUNTIME: &str = "runtime";
pub const SESSION_MODE_REDIS: &str = "redis";
pub const SESSION_ID_LENGTH: usize = 20;

const SESSION_ID_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session `id`, creating an empty one when it does not exist.
    async fn session_read(&self, id: &str) -> Result<Arc<SessionState>>;
    async fn session_exist(&self, id: &str) -> Result<bool>;
    /// Persist the values of `state`.
    async fn session_update(&self, state: &SessionState) -> Result<()>;
    async fn session_remove(&self, id: &str) -> Result<()>;
    async fn session_count(&self) -> Result<usize>;
    /// Drop expired sessions, returning how many were removed.
    async fn session_gc(&self) -> Result<usize>;
}

pub struct SessionState {
    id: String,
    values: RwLock<HashMap<String, Value>>,
    last_access: Mutex<Instant>,
    store: Weak<dyn SessionStore>,
}

impl SessionState {
    pub fn new(id: impl Into<String>, store: Weak<dyn SessionStore>) -> Self {
        Self::with_values(id, HashMap::new(), store)
    }

    pub fn with_values(
        id: impl Into<String>,
        values: HashMap<String, Value>,
        store: Weak<dyn SessionStore>,
    ) -> Self {
        SessionState {
            id: id.into(),
            values: RwLock::new(values),
            last_access: Mutex::new(Instant::now()),
            store,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.id
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.read().get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// String values are returned as-is, other values in their JSON form.
    pub fn get_string(&self, key: &str) -> String {
        match self.values.read().get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.values.write().insert(key.to_string(), value);
        self.flush().await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        self.flush().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.values.write().clear();
        self.flush().await
    }

    pub fn count(&self) -> usize {
        self.values.read().len()
    }

    /// Snapshot of all values.
    pub fn values(&self) -> HashMap<String, Value> {
        self.values.read().clone()
    }

    pub(crate) fn replace_values(&self, values: HashMap<String, Value>) {
        *self.values.write() = values;
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }

    pub(crate) fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub(crate) fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.last_access().elapsed() > max_lifetime
    }

    async fn flush(&self) -> Result<()> {
        match self.store.upgrade() {
            Some(store) => store.session_update(self).await,
            None => Err(DotwebError::SessionStoreFailure(
                "session store is no longer available".into(),
            )),
        }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("id", &self.id)
            .field("values", &*self.values.read())
            .finish()
    }
}

/// Owns the store and the cookie settings for the server.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
    gc_interval: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, cookie_name: impl Into<String>, gc_interval: Duration) -> Self {
        let cookie_name = cookie_name.into();
        SessionManager {
            store,
            cookie_name: if cookie_name.is_empty() {
                DEFAULT_SESSION_COOKIE_NAME.to_string()
            } else {
                cookie_name
            },
            gc_interval: gc_interval.max(Duration::from_secs(1)),
        }
    }

    /// Build the store selected by `config.session_mode`.
    pub async fn from_config(config: &SessionConfig) -> Result<Self> {
        let max_lifetime = config.max_lifetime();
        let store: Arc<dyn SessionStore> = match config.session_mode.as_str() {
            SESSION_MODE_RUNTIME => RuntimeStore::new(max_lifetime),
            #[cfg(feature = "redis")]
            SESSION_MODE_REDIS => {
                RedisStore::connect(&config.server_ip, &config.store_key_prefix, max_lifetime).await?
            }
            #[cfg(not(feature = "redis"))]
            SESSION_MODE_REDIS => {
                return Err(DotwebError::SessionStoreFailure(
                    "redis session mode requires the `redis` feature".into(),
                ));
            }
            other => {
                return Err(DotwebError::SessionStoreFailure(format!(
                    "unknown session mode '{other}'"
                )));
            }
        };
        tracing::info!(mode = %config.session_mode, timeout_secs = max_lifetime.as_secs(), "session store ready");
        Ok(Self::new(store, config.cookie_name.clone(), config.gc_interval()))
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn gc_interval(&self) -> Duration {
        self.gc_interval
    }

    /// A fresh 20 character id over `[0-9a-z]`.
    pub fn new_session_id() -> String {
        let mut rng = rand::thread_rng();
        (0..SESSION_ID_LENGTH)
            .map(|_| SESSION_ID_CHARS[rng.gen_range(0..SESSION_ID_CHARS.len())] as char)
            .collect()
    }

    pub async fn get_session_state(&self, id: &str) -> Result<Arc<SessionState>> {
        self.store.session_read(id).await
    }

    pub async fn remove_session_state(&self, id: &str) -> Result<()> {
        self.store.session_remove(id).await
    }

    /// Run the store's garbage collection every `gc_interval` until
    /// shutdown.
    pub fn spawn_gc(&self, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        let store = self.store.clone();
        let every = self.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => match store.session_gc().await {
                        Ok(0) => {}
                        Ok(removed) => tracing::debug!(removed, "session gc"),
                        Err(err) => tracing::warn!(error = %err, "session gc failed"),
                    },
                }
            }
        })
    }
}
