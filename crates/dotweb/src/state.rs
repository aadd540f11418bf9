//! Request and error counters reported by the admin routes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;

use crate::router::files::escape_html;

/// Per-minute buckets kept for `/dotweb/state/interval` (one day).
pub const MAX_INTERVAL_BUCKETS: usize = 24 * 60;
/// Distinct URLs tracked for error counts.
pub const MAX_ERROR_URLS: usize = 4096;

const INTERVAL_KEY_FORMAT: &str = "%Y%m%d%H%M";

pub struct ServerState {
    started_at: DateTime<Local>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    interval_requests: Mutex<BTreeMap<String, u64>>,
    error_urls: Mutex<HashMap<String, u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub server_version: &'static str,
    pub started_at: String,
    pub total_requests: u64,
    pub total_errors: u64,
    pub interval_requests: BTreeMap<String, u64>,
    pub error_urls: HashMap<String, u64>,
}

impl ServerState {
    pub fn new() -> Self {
        ServerState {
            started_at: Local::now(),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            interval_requests: Mutex::new(BTreeMap::new()),
            error_urls: Mutex::new(HashMap::new()),
        }
    }

    /// Minute bucket key (`YYYYMMDDHHMM`) for `at`.
    pub fn interval_key(at: DateTime<Local>) -> String {
        at.format(INTERVAL_KEY_FORMAT).to_string()
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Count `n` requests, returning the new total.
    pub fn add_request_count(&self, n: u64) -> u64 {
        let key = Self::interval_key(Local::now());
        {
            let mut buckets = self.interval_requests.lock();
            *buckets.entry(key).or_insert(0) += n;
            while buckets.len() > MAX_INTERVAL_BUCKETS {
                buckets.pop_first();
            }
        }
        self.total_requests.fetch_add(n, Ordering::Relaxed) + n
    }

    /// Count `n` errors for `url`, returning the new total.
    pub fn add_error_count(&self, url: &str, n: u64) -> u64 {
        {
            let mut urls = self.error_urls.lock();
            if let Some(count) = urls.get_mut(url) {
                *count += n;
            } else if urls.len() < MAX_ERROR_URLS {
                urls.insert(url.to_string(), n);
            }
        }
        self.total_errors.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    /// Requests counted in the minute bucket `key`.
    pub fn query_interval_count(&self, key: &str) -> u64 {
        self.interval_requests.lock().get(key).copied().unwrap_or(0)
    }

    pub fn error_count(&self, url: &str) -> u64 {
        self.error_urls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            server_version: crate::VERSION,
            started_at: self.started_at.to_rfc3339(),
            total_requests: self.total_requests(),
            total_errors: self.total_errors(),
            interval_requests: self.interval_requests.lock().clone(),
            error_urls: self.error_urls.lock().clone(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Small HTML status page.
    pub fn show_html(&self) -> String {
        let snapshot = self.snapshot();
        let mut errors: Vec<_> = snapshot.error_urls.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let mut rows = String::new();
        for (url, count) in errors.iter().take(20) {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{count}</td></tr>",
                escape_html(url)
            ));
        }
        format!(
            "<html><head><title>dotweb state</title></head><body>\
             <h1>dotweb state</h1>\
             <table>\
             <tr><td>Version</td><td>{}</td></tr>\
             <tr><td>Started</td><td>{}</td></tr>\
             <tr><td>Total requests</td><td>{}</td></tr>\
             <tr><td>Total errors</td><td>{}</td></tr>\
             </table>\
             <h2>Errors by url</h2><table>{rows}</table>\
             </body></html>",
            snapshot.server_version,
            snapshot.started_at,
            snapshot.total_requests,
            snapshot.total_errors,
        )
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
