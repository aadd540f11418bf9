use std::time::Instant;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::context::HttpContext;
use crate::error::Result;

/// Emits one `tracing` event per request with method, url, status, sizes
/// and latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog;

#[async_trait]
impl Middleware for RequestLog {
    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<()> {
        let start = Instant::now();
        let result = next.run(ctx).await;
        let req = ctx.request();
        let resp = ctx.response();
        tracing::info!(
            target: "dotweb::request",
            method = %req.method(),
            url = %req.url(),
            remote_ip = %req.real_ip(),
            proto = req.proto(),
            status = resp.status().as_u16(),
            req_bytes = req.content_length(),
            resp_bytes = resp.size(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            failed = result.is_err(),
            "request"
        );
        result
    }
}
