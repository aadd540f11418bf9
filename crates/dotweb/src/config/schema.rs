//! Configuration schema definitions.
//!
//! Field names are camelCase in every format. Every section has defaults,
//! so a file only needs to name the settings it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration of a dotweb server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub app: AppConfig,
    pub offline: OfflineConfig,
    pub server: ServerConfig,
    pub session: SessionConfig,
    /// Application middlewares, by registered name.
    pub middlewares: Vec<MiddlewareConfig>,
    /// Routes bound to registered handler names.
    pub routers: Vec<RouterConfig>,
    pub groups: Vec<GroupConfig>,
    /// Free-form key/value settings exposed through the server's config set.
    pub config_set: Vec<ConfigSetItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Directory for log files. Empty logs to stdout.
    pub log_path: String,
    pub enabled_log: bool,
    /// `development` or `production`.
    pub run_mode: String,
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            log_path: String::new(),
            enabled_log: false,
            run_mode: RUN_MODE_DEVELOPMENT.to_string(),
            log_level: "info".to_string(),
        }
    }
}

pub const RUN_MODE_DEVELOPMENT: &str = "development";
pub const RUN_MODE_PRODUCTION: &str = "production";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OfflineConfig {
    /// When set, every request is answered with the offline reply.
    pub offline: bool,
    pub offline_text: String,
    /// Redirect target; takes precedence over `offline_text`.
    pub offline_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub port: u16,
    pub enabled_gzip: bool,
    pub enabled_auto_head: bool,
    pub enabled_auto_options: bool,
    pub enabled_list_dir: bool,
    /// Register the `/dotweb/...` admin routes.
    pub enabled_inner_router: bool,
    /// Largest accepted request body in bytes, `0` for no limit.
    pub max_body_size: usize,
    /// File served for directory requests on static routes.
    pub index_page: String,
    /// Idle objects kept per request pool.
    pub pool_max_idle: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            enabled_gzip: false,
            enabled_auto_head: false,
            enabled_auto_options: false,
            enabled_list_dir: false,
            enabled_inner_router: true,
            max_body_size: 32 << 20,
            index_page: "index.html".to_string(),
            pool_max_idle: crate::pool::DEFAULT_MAX_IDLE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub enabled_session: bool,
    /// `runtime` or `redis`.
    pub session_mode: String,
    /// Session lifetime in minutes.
    pub timeout: u64,
    /// Redis connection URL for the `redis` mode.
    pub server_ip: String,
    pub store_key_prefix: String,
    pub cookie_name: String,
    /// Seconds between garbage collection runs.
    pub gc_interval: u64,
}

impl SessionConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.timeout.saturating_mul(60))
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            enabled_session: false,
            session_mode: crate::session::SESSION_MODE_RUNTIME.to_string(),
            timeout: 20,
            server_ip: String::new(),
            store_key_prefix: "dotweb:session:".to_string(),
            cookie_name: crate::session::DEFAULT_SESSION_COOKIE_NAME.to_string(),
            gc_interval: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MiddlewareConfig {
    pub name: String,
    pub is_use: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        MiddlewareConfig {
            name: String::new(),
            is_use: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RouterConfig {
    /// HTTP method, or `ANY`.
    pub method: String,
    pub path: String,
    /// Name passed to `register_handler`.
    pub handler: String,
    pub middlewares: Vec<MiddlewareConfig>,
    pub is_use: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            method: "GET".to_string(),
            path: String::new(),
            handler: String::new(),
            middlewares: Vec::new(),
            is_use: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupConfig {
    pub path: String,
    pub middlewares: Vec<MiddlewareConfig>,
    pub routers: Vec<RouterConfig>,
    pub is_use: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        GroupConfig {
            path: String::new(),
            middlewares: Vec::new(),
            routers: Vec::new(),
            is_use: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigSetItem {
    pub key: String,
    pub value: String,
}
