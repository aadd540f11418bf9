//! Concurrent string-keyed storage for values of any type.
//!
//! Used for request-scoped items on [`HttpContext`](crate::HttpContext),
//! for application-wide items on the server, and for the `configSet`
//! section of the configuration.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

type Item = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ItemMap {
    inner: RwLock<HashMap<String, Item>>,
}

impl ItemMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.inner.write().insert(key.into(), Arc::new(value));
    }

    /// Returns a clone of the value stored under `key` when it has type `T`.
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.inner
            .read()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Returns the shared value stored under `key` when it has type `T`.
    pub fn get_arc<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let item = self.inner.read().get(key).cloned()?;
        item.downcast::<T>().ok()
    }

    /// Returns the value as a string. `String`, `&'static str` and the
    /// primitive numbers are rendered; anything else yields an empty string.
    pub fn get_string(&self, key: &str) -> String {
        let guard = self.inner.read();
        let Some(item) = guard.get(key) else {
            return String::new();
        };
        if let Some(s) = item.downcast_ref::<String>() {
            return s.clone();
        }
        if let Some(s) = item.downcast_ref::<&'static str>() {
            return (*s).to_string();
        }
        if let Some(n) = item.downcast_ref::<i64>() {
            return n.to_string();
        }
        if let Some(n) = item.downcast_ref::<i32>() {
            return n.to_string();
        }
        if let Some(n) = item.downcast_ref::<u64>() {
            return n.to_string();
        }
        if let Some(b) = item.downcast_ref::<bool>() {
            return b.to_string();
        }
        String::new()
    }

    /// Returns the value as an integer, parsing strings when needed.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        let guard = self.inner.read();
        let item = guard.get(key)?;
        if let Some(n) = item.downcast_ref::<i64>() {
            return Some(*n);
        }
        if let Some(n) = item.downcast_ref::<i32>() {
            return Some(i64::from(*n));
        }
        if let Some(n) = item.downcast_ref::<u32>() {
            return Some(i64::from(*n));
        }
        drop(guard);
        self.get_string(key).parse().ok()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Remove `key`, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl std::fmt::Debug for ItemMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemMap")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip() {
        let items = ItemMap::new();
        items.set("user", String::from("ada"));
        items.set("count", 3_i64);

        assert_eq!(items.get::<String>("user").as_deref(), Some("ada"));
        assert_eq!(items.get::<i64>("count"), Some(3));
        assert_eq!(items.get::<u8>("count"), None);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn string_and_int_views() {
        let items = ItemMap::new();
        items.set("port", "8080");
        items.set("flag", true);
        items.set("n", 42_i32);

        assert_eq!(items.get_string("port"), "8080");
        assert_eq!(items.get_int("port"), Some(8080));
        assert_eq!(items.get_string("flag"), "true");
        assert_eq!(items.get_int("n"), Some(42));
        assert_eq!(items.get_string("missing"), "");
    }

    #[test]
    fn remove_and_clear() {
        let items = ItemMap::new();
        items.set("a", 1_u64);
        items.set("b", 2_u64);
        assert!(items.remove("a"));
        assert!(!items.remove("a"));
        assert!(items.exists("b"));
        items.clear();
        assert!(items.is_empty());
    }
}
