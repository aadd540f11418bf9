//! Logging and tracing initialization for dotweb.
//!
//! Every log line in the framework goes through `tracing`; nothing is
//! printed until a subscriber is installed with one of the functions here.
//!
//! ```rust,no_run
//! use dotweb::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let mut server = HttpServer::new();
//!     server.get("/", |ctx| Box::pin(async move {
//!         ctx.write_string("hello")?;
//!         Ok(())
//!     }));
//!     server.listen_and_serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! The level follows `RUST_LOG` when it is set:
//!
//! ```bash
//! RUST_LOG=dotweb=debug,dotweb::request=info cargo run
//! ```

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, RUN_MODE_PRODUCTION};
use crate::error::{DotwebError, Result};

/// File name used under `AppConfig::log_path`.
pub const LOG_FILE_NAME: &str = "dotweb.log";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging at `info`, or whatever `RUST_LOG` says.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging() {
    init_logging_with_level("info");
}

/// Initialize logging with a specific default level (`"trace"` through
/// `"error"`). `RUST_LOG` still wins when set.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_with_level(level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Multi-line, colorized output with thread ids and line numbers.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_pretty() {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_line_number(true)
                .with_thread_ids(true)
                .with_target(true),
        )
        .init();
}

/// One JSON object per line, for log shippers.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_json() {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Install a subscriber from the `app` section of the config.
///
/// With `enabledLog` and a `logPath`, lines are appended to
/// `<logPath>/dotweb.log`; otherwise they go to stdout. Production run mode
/// logs JSON. Unlike the other initializers this returns an error instead
/// of panicking when a subscriber already exists.
pub fn init_from_config(app: &AppConfig) -> Result<()> {
    let level = if app.log_level.is_empty() {
        "info"
    } else {
        app.log_level.as_str()
    };
    let json = app.run_mode == RUN_MODE_PRODUCTION;
    let registry = tracing_subscriber::registry().with(env_filter(level));

    let installed = if app.enabled_log && !app.log_path.is_empty() {
        let dir = Path::new(&app.log_path);
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))?;
        let writer = Mutex::new(file);
        if json {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .try_init()
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()
        }
    } else if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.map_err(|e| DotwebError::Internal(format!("cannot install logger: {e}")))
}
