//! Canned responses served instead of the real handler.
//!
//! A request carrying the header `dotweb_req_mock: true` whose matched route
//! pattern has a registered mock runs the mock as its endpoint. The
//! middleware pipeline still runs.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::context::HttpContext;
use crate::error::Result;
use crate::handler::HttpHandle;

pub const MOCK_HEADER: &str = "dotweb_req_mock";

#[derive(Default, Clone)]
pub struct Mock {
    handles: HashMap<String, HttpHandle>,
}

impl Mock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock the route registered under `route_pattern` with `handle`.
    pub fn register<F>(&mut self, route_pattern: &str, handle: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.handles.insert(route_pattern.to_string(), Arc::new(handle));
        self
    }

    /// Answer with a fixed text body.
    pub fn register_string(&mut self, route_pattern: &str, text: impl Into<String>) -> &mut Self {
        let text: Arc<str> = text.into().into();
        self.register(route_pattern, move |ctx| {
            let text = text.clone();
            Box::pin(async move {
                ctx.write_string(&*text)?;
                Ok(())
            })
        })
    }

    /// Answer with `value` serialized as JSON.
    pub fn register_json<T: Serialize>(&mut self, route_pattern: &str, value: &T) -> Result<&mut Self> {
        let body: Arc<serde_json::Value> = Arc::new(serde_json::to_value(value)?);
        Ok(self.register(route_pattern, move |ctx| {
            let body = body.clone();
            Box::pin(async move {
                ctx.write_json(&*body)?;
                Ok(())
            })
        }))
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The mock endpoint for `ctx`, when the request asks for one.
    pub(crate) fn handle_for(&self, ctx: &HttpContext) -> Option<HttpHandle> {
        if !ctx.request().header(MOCK_HEADER).eq_ignore_ascii_case("true") {
            return None;
        }
        self.handles.get(ctx.route_path()?).cloned()
    }
}
