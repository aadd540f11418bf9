//! Background extensions started with the server.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::server::HttpServer;
use crate::shutdown::ShutdownSignal;

/// A long-running task owned by the server.
///
/// Each plugin runs on its own task once the server starts and should
/// return when `shutdown` fires.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Plugins answering `false` are skipped at startup.
    fn is_validate(&self) -> bool {
        true
    }

    async fn run(&self, server: Arc<HttpServer>, shutdown: ShutdownSignal) -> Result<()>;
}
