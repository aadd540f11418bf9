pub mod admin;
pub mod bind;
pub mod cache;
pub mod config;
pub mod context;
pub mod cookie;
pub mod error;
pub mod handler;
pub mod hijack;
pub mod items;
pub mod logging;
pub mod middleware;
pub mod mock;
pub mod multipart;
pub mod plugin;
pub mod pool;
pub mod prelude;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod state;
pub mod testing;
pub mod view;
pub mod websocket;

/// Crate version, reported by the admin routes.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use cache::CacheService;
pub use config::Config;
pub use context::HttpContext;
pub use error::{DotwebError, Result};
pub use handler::{HttpHandle, handle};
pub use middleware::{Layer, Middleware, Next};
pub use router::{Group, RouteNode, Router};
pub use server::HttpServer;
pub use testing::{TestApp, TestClient, TestResponse};
