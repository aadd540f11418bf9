use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::RwLock;

use super::{SessionState, SessionStore};
use crate::error::Result;

/// In-process session store.
///
/// Sessions are kept in least-recently-used order; every read moves a
/// session to the front, so garbage collection only has to look at the
/// tail and can stop at the first session that is still alive.
pub struct RuntimeStore {
    this: Weak<RuntimeStore>,
    sessions: RwLock<LruCache<String, Arc<SessionState>>>,
    max_lifetime: Duration,
}

impl RuntimeStore {
    pub fn new(max_lifetime: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| RuntimeStore {
            this: this.clone(),
            sessions: RwLock::new(LruCache::unbounded()),
            max_lifetime,
        })
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Session ids from most to least recently used.
    pub fn ids_by_recency(&self) -> Vec<String> {
        self.sessions.read().iter().map(|(id, _)| id.clone()).collect()
    }

    fn store_ref(&self) -> Weak<dyn SessionStore> {
        self.this.clone()
    }
}

#[async_trait]
impl SessionStore for RuntimeStore {
    async fn session_read(&self, id: &str) -> Result<Arc<SessionState>> {
        let mut sessions = self.sessions.write();
        if let Some(state) = sessions.get(id) {
            state.touch();
            return Ok(state.clone());
        }
        let state = Arc::new(SessionState::new(id, self.store_ref()));
        sessions.put(id.to_string(), state.clone());
        Ok(state)
    }

    async fn session_exist(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.read().contains(id))
    }

    async fn session_update(&self, state: &SessionState) -> Result<()> {
        let mut sessions = self.sessions.write();
        match sessions.get(state.session_id()) {
            Some(existing) => {
                if !std::ptr::eq(existing.as_ref(), state) {
                    existing.replace_values(state.values());
                }
                existing.touch();
            }
            None => {
                let stored = SessionState::with_values(state.session_id(), state.values(), self.store_ref());
                sessions.put(state.session_id().to_string(), Arc::new(stored));
            }
        }
        Ok(())
    }

    async fn session_remove(&self, id: &str) -> Result<()> {
        self.sessions.write().pop(id);
        Ok(())
    }

    async fn session_count(&self) -> Result<usize> {
        Ok(self.sessions.read().len())
    }

    async fn session_gc(&self) -> Result<usize> {
        let mut sessions = self.sessions.write();
        let mut removed = 0;
        while sessions
            .peek_lru()
            .is_some_and(|(_, state)| state.is_expired(self.max_lifetime))
        {
            sessions.pop_lru();
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_creates_and_reuses() {
        let store = RuntimeStore::new(Duration::from_secs(60));
        let first = store.session_read("abc").await.unwrap();
        first.set("user", "ada").await.unwrap();

        let again = store.session_read("abc").await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.get_string("user"), "ada");
        assert_eq!(store.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reads_promote_to_front() {
        let store = RuntimeStore::new(Duration::from_secs(60));
        for id in ["a", "b", "c"] {
            store.session_read(id).await.unwrap();
        }
        store.session_read("a").await.unwrap();
        assert_eq!(store.ids_by_recency(), vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn remove_forgets_session() {
        let store = RuntimeStore::new(Duration::from_secs(60));
        store.session_read("gone").await.unwrap();
        store.session_remove("gone").await.unwrap();
        assert!(!store.session_exist("gone").await.unwrap());
    }
}
