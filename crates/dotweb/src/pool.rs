// src/pool.rs
//! Free lists for the per-request objects.
//!
//! Every request borrows a [`Request`], a [`Response`], a [`Params`] list
//! and an [`HttpContext`] from the server's pools and hands them back once
//! the response has been produced. Objects are wiped on release so nothing
//! observable leaks from one request into the next.

use parking_lot::Mutex;
use serde::Serialize;

use crate::context::HttpContext;
use crate::request::Request;
use crate::response::Response;
use crate::router::Params;

/// Default upper bound of idle objects kept per pool.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Something that can be wiped back to its pristine state.
pub trait Recycle {
    fn recycle(&mut self);
}

impl Recycle for Params {
    fn recycle(&mut self) {
        self.clear();
    }
}

pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Default + Recycle> Pool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// O(1) allocation: pops an idle object or builds a fresh one.
    #[inline]
    pub fn acquire(&self) -> T {
        self.idle.lock().pop().unwrap_or_default()
    }

    /// Wipes `item` and returns it to the free list. Objects beyond the idle
    /// cap are dropped.
    #[inline]
    pub fn release(&self, mut item: T) {
        item.recycle();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(item);
        }
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Drop every idle object, returning how many were freed.
    pub fn clear(&self) -> usize {
        let mut idle = self.idle.lock();
        let freed = idle.len();
        idle.clear();
        idle.shrink_to_fit();
        freed
    }
}

/// Idle counts reported by `/dotweb/debug/pprof/pools`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub requests: usize,
    pub responses: usize,
    pub contexts: usize,
    pub params: usize,
}

pub struct Pools {
    pub requests: Pool<Request>,
    pub responses: Pool<Response>,
    pub contexts: Pool<HttpContext>,
    pub params: Pool<Params>,
}

impl Pools {
    pub fn new(max_idle: usize) -> Self {
        Self {
            requests: Pool::new(max_idle),
            responses: Pool::new(max_idle),
            contexts: Pool::new(max_idle),
            params: Pool::new(max_idle),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            requests: self.requests.idle(),
            responses: self.responses.idle(),
            contexts: self.contexts.idle(),
            params: self.params.idle(),
        }
    }

    /// Release every idle object held by the pools.
    pub fn clear(&self) -> usize {
        self.requests.clear() + self.responses.clear() + self.contexts.clear() + self.params.clear()
    }
}

impl Default for Pools {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_params_come_back_empty() {
        let pool: Pool<Params> = Pool::new(4);
        let mut params = pool.acquire();
        params.push("id", "42");
        pool.release(params);
        assert_eq!(pool.idle(), 1);

        let params = pool.acquire();
        assert!(params.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn idle_cap_is_respected() {
        let pool: Pool<Params> = Pool::new(2);
        for _ in 0..5 {
            pool.release(Params::new());
        }
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.clear(), 2);
        assert_eq!(pool.idle(), 0);
    }
}
