use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::Value;

use super::{SessionState, SessionStore};
use crate::error::{DotwebError, Result};

/// Session store backed by Redis.
///
/// Each session is one JSON blob under `<prefix><id>` whose expiry is set to
/// the session lifetime and refreshed on every read. Redis expires keys on
/// its own, so garbage collection is a no-op.
pub struct RedisStore {
    this: Weak<RedisStore>,
    conn: ConnectionManager,
    prefix: String,
    max_lifetime: Duration,
}

fn store_error(op: &str, err: redis::RedisError) -> DotwebError {
    DotwebError::SessionStoreFailure(format!("redis {op} error: {err}"))
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str, prefix: &str, max_lifetime: Duration) -> Result<Arc<Self>> {
        let client = redis::Client::open(url).map_err(|e| store_error("connection", e))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| store_error("connection", e))?;
        Ok(Arc::new_cyclic(|this| RedisStore {
            this: this.clone(),
            conn,
            prefix: prefix.to_string(),
            max_lifetime,
        }))
    }

    fn key(&self, id: &str) -> String {
        format!("{}{id}", self.prefix)
    }

    fn ttl_secs(&self) -> u64 {
        self.max_lifetime.as_secs().max(1)
    }

    fn store_ref(&self) -> Weak<dyn SessionStore> {
        self.this.clone()
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn session_read(&self, id: &str) -> Result<Arc<SessionState>> {
        let key = self.key(id);
        let mut conn = self.conn.clone();
        let blob: Option<String> = conn.get(&key).await.map_err(|e| store_error("GET", e))?;
        let values: HashMap<String, Value> = match blob {
            Some(blob) => {
                let _: bool = conn
                    .expire(&key, self.ttl_secs() as i64)
                    .await
                    .map_err(|e| store_error("EXPIRE", e))?;
                serde_json::from_str(&blob)?
            }
            None => HashMap::new(),
        };
        Ok(Arc::new(SessionState::with_values(id, values, self.store_ref())))
    }

    async fn session_exist(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(self.key(id))
            .await
            .map_err(|e| store_error("EXISTS", e))
    }

    async fn session_update(&self, state: &SessionState) -> Result<()> {
        let blob = serde_json::to_string(&state.values())?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.key(state.session_id()), blob, self.ttl_secs())
            .await
            .map_err(|e| store_error("SETEX", e))?;
        Ok(())
    }

    async fn session_remove(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(self.key(id))
            .await
            .map_err(|e| store_error("DEL", e))?;
        Ok(())
    }

    async fn session_count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{}*", self.prefix))
            .await
            .map_err(|e| store_error("KEYS", e))?;
        Ok(keys.len())
    }

    async fn session_gc(&self) -> Result<usize> {
        Ok(0)
    }
}
