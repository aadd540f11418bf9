//! Three-tier middleware pipeline.
//!
//! A request runs through the application middlewares, then the group
//! middlewares of the matched route, then the route's own middlewares, and
//! finally the handler. Each middleware decides whether to continue by
//! calling [`Next::run`]. A middleware can be excluded from individual route
//! patterns, in which case it is skipped for those routes only.

mod request_log;
mod timeout_hook;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::context::{HttpContext, MiddlewareTier};
use crate::error::Result;
use crate::handler::HttpHandle;

pub use request_log::RequestLog;
pub use timeout_hook::{HANDLE_DURATION_KEY, TimeoutHook};

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<()>;
}

/// A middleware registered on a tier, together with its excluded routes.
#[derive(Clone)]
pub struct Layer {
    middleware: Arc<dyn Middleware>,
    excludes: Arc<HashSet<String>>,
}

impl Layer {
    pub fn new(middleware: impl Middleware) -> Self {
        Self::from_arc(Arc::new(middleware))
    }

    pub fn from_arc(middleware: Arc<dyn Middleware>) -> Self {
        Layer {
            middleware,
            excludes: Arc::new(HashSet::new()),
        }
    }

    /// Skip this middleware for the given route patterns.
    pub fn exclude<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.excludes).extend(routes.into_iter().map(Into::into));
        self
    }

    pub fn has_exclude(&self) -> bool {
        !self.excludes.is_empty()
    }

    pub fn exists_exclude(&self, route: &str) -> bool {
        self.excludes.contains(route)
    }

    pub fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }
}

impl<M: Middleware> From<M> for Layer {
    fn from(middleware: M) -> Self {
        Layer::new(middleware)
    }
}

/// The rest of the pipeline, handed to each middleware.
pub struct Next<'a> {
    app: &'a [Layer],
    group: &'a [Layer],
    route: &'a [Layer],
    endpoint: &'a HttpHandle,
}

impl<'a> Next<'a> {
    pub fn new(
        app: &'a [Layer],
        group: &'a [Layer],
        route: &'a [Layer],
        endpoint: &'a HttpHandle,
    ) -> Self {
        Next {
            app,
            group,
            route,
            endpoint,
        }
    }

    fn pop(&mut self) -> Option<(&'a Layer, MiddlewareTier)> {
        let (app, group, route) = (self.app, self.group, self.route);
        if let Some((first, rest)) = app.split_first() {
            self.app = rest;
            return Some((first, MiddlewareTier::App));
        }
        if let Some((first, rest)) = group.split_first() {
            self.group = rest;
            return Some((first, MiddlewareTier::Group));
        }
        if let Some((first, rest)) = route.split_first() {
            self.route = rest;
            return Some((first, MiddlewareTier::Route));
        }
        None
    }

    /// Run the next middleware, or the handler once every tier is drained.
    /// Nothing runs after the context was ended.
    pub async fn run(mut self, ctx: &mut HttpContext) -> Result<()> {
        if ctx.is_end() {
            return Ok(());
        }
        while let Some((layer, tier)) = self.pop() {
            if layer.has_exclude() && ctx.route_path().is_some_and(|p| layer.exists_exclude(p)) {
                continue;
            }
            ctx.set_tier(tier);
            return layer.middleware.handle(ctx, self).await;
        }
        ctx.set_tier(MiddlewareTier::Handler);
        (self.endpoint)(ctx).await
    }
}

/// Middleware built from a closure, see [`from_fn`].
pub struct FnMiddleware<F>(F);

/// Wrap a closure as a middleware:
/// `from_fn(|ctx, next| Box::pin(async move { next.run(ctx).await }))`.
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut HttpContext, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FnMiddleware(f)
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut HttpContext, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<()> {
        (self.0)(ctx, next).await
    }
}
