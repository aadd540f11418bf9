//! Handler signatures shared by the router, middleware and server.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::context::HttpContext;
use crate::error::{DotwebError, Result};
use crate::hijack::HijackConn;
use crate::websocket::WebSocket;

/// Request handler: borrows the context for the duration of the call.
///
/// Closures are written as `|ctx| Box::pin(async move { ... })`.
pub type HttpHandle =
    Arc<dyn for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Handler for an accepted WebSocket connection.
pub type WebSocketHandle = Arc<dyn Fn(WebSocket) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Handler for a hijacked connection.
pub type HijackHandle = Arc<dyn Fn(HijackConn) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Called with the error produced by a handler or with the panic it raised.
pub type ExceptionHandle = Arc<dyn Fn(&mut HttpContext, &DotwebError) + Send + Sync>;

/// Box an `HttpHandle` from a closure.
pub fn handle<F>(f: F) -> HttpHandle
where
    F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn websocket_handle<F, Fut>(f: F) -> WebSocketHandle
where
    F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ws| Box::pin(f(ws)))
}

pub(crate) fn hijack_handle<F, Fut>(f: F) -> HijackHandle
where
    F: Fn(HijackConn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |conn| Box::pin(f(conn)))
}
