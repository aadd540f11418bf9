use std::sync::Arc;

use futures_util::future::BoxFuture;
use hyper::http::Method;
use parking_lot::RwLock;

use super::{ANY_METHODS, RouteNode, Router, method_shortcuts};
use crate::context::HttpContext;
use crate::error::Result;
use crate::handler::HttpHandle;
use crate::middleware::Layer;

/// Routes sharing a path prefix and a list of group middlewares.
///
/// Group middlewares are shared with every route of the group, including
/// routes registered before the middleware was added.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middlewares: Arc<RwLock<Vec<Layer>>>,
}

impl<'r> Group<'r> {
    pub(super) fn new(router: &'r mut Router, prefix: String, middlewares: Vec<Layer>) -> Self {
        Group {
            router,
            prefix,
            middlewares: Arc::new(RwLock::new(middlewares)),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn use_middleware(&mut self, layer: impl Into<Layer>) -> &mut Self {
        self.middlewares.write().push(layer.into());
        self
    }

    /// Nested group. It starts with a copy of this group's middlewares.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let inherited = self.middlewares.read().clone();
        Group::new(self.router, format!("{}{prefix}", self.prefix), inherited)
    }

    pub fn try_handle(&mut self, method: Method, path: &str, handle: HttpHandle) -> Result<RouteNode> {
        let full = format!("{}{path}", self.prefix);
        self.router
            .add_route(&[method], &full, handle, Some(self.middlewares.clone()))
    }

    pub fn handle(&mut self, method: Method, path: &str, handle: HttpHandle) -> RouteNode {
        match self.try_handle(method, path, handle) {
            Ok(node) => node,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_any(&mut self, path: &str, handle: HttpHandle) -> Result<RouteNode> {
        let full = format!("{}{path}", self.prefix);
        self.router
            .add_route(&ANY_METHODS, &full, handle, Some(self.middlewares.clone()))
    }

    pub fn any<F>(&mut self, path: &str, handle: F) -> RouteNode
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        match self.try_any(path, Arc::new(handle)) {
            Ok(node) => node,
            Err(err) => panic!("{err}"),
        }
    }

    method_shortcuts! {
        get => GET,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        head => HEAD,
        options => OPTIONS,
    }
}
