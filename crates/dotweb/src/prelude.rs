//! dotweb prelude: import everything a typical application needs with one
//! line.
//!
//! ```rust,ignore
//! use dotweb::prelude::*;
//! ```

// ── Core types ─────────────────────────────────────────────────
pub use crate::config::{Config, NotifyMode, NotifyPlugin};
pub use crate::context::HttpContext;
pub use crate::error::{DotwebError, Result};
pub use crate::server::HttpServer;

// ── Router & middleware ────────────────────────────────────────
pub use crate::handler::{HttpHandle, handle};
pub use crate::middleware::{Layer, Middleware, Next, RequestLog, TimeoutHook, from_fn};
pub use crate::router::{Group, Params, RouteNode, Router};

// ── Services ───────────────────────────────────────────────────
pub use crate::cache::CacheService;
pub use crate::cookie::Cookie;
pub use crate::mock::Mock;
pub use crate::plugin::Plugin;
pub use crate::session::SessionManager;
pub use crate::websocket::WebSocket;

// ── Logging ────────────────────────────────────────────────────
pub use crate::logging::{init_from_config, init_logging, init_logging_json, init_logging_pretty, init_logging_with_level};

// ── HTTP types ─────────────────────────────────────────────────
pub use hyper::http::{HeaderMap, Method, StatusCode};

// ── Serde (almost every handler needs these) ───────────────────
pub use serde::{Deserialize, Serialize};
