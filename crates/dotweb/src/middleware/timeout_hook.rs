use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::{Middleware, Next};
use crate::context::HttpContext;
use crate::error::Result;
use crate::handler::HttpHandle;

/// Item key under which [`TimeoutHook`] stores the measured duration.
pub const HANDLE_DURATION_KEY: &str = "dotweb.handle_duration";

/// Calls a hook after the rest of the pipeline took longer than a threshold.
pub struct TimeoutHook {
    threshold: Duration,
    hook: HttpHandle,
}

impl TimeoutHook {
    pub fn new<F>(threshold: Duration, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        TimeoutHook {
            threshold,
            hook: std::sync::Arc::new(hook),
        }
    }
}

#[async_trait]
impl Middleware for TimeoutHook {
    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<()> {
        let start = Instant::now();
        let result = next.run(ctx).await;
        let elapsed = start.elapsed();
        if elapsed > self.threshold {
            ctx.items().set(HANDLE_DURATION_KEY, elapsed);
            tracing::warn!(
                url = %ctx.request().url(),
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "request exceeded timeout threshold"
            );
            (self.hook)(ctx).await?;
        }
        result
    }
}
