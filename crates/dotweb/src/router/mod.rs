//! Request router.
//!
//! One radix tree per HTTP method resolves a path to a [`Route`]. Misses are
//! answered with trailing-slash or case-fixing redirects, `405` with an
//! `Allow` header, automatic `OPTIONS` replies or `404`, in that order.

pub mod files;
mod group;
mod params;
mod path;
mod tree;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use hyper::http::{Method, StatusCode, header};
use parking_lot::RwLock;

use crate::context::HttpContext;
use crate::error::{DotwebError, Result};
use crate::handler::{HttpHandle, WebSocketHandle, hijack_handle, websocket_handle};
use crate::hijack::HijackConn;
use crate::middleware::{Layer, Next};
use crate::server::HttpServer;
use crate::websocket::WebSocket;

pub use group::Group;
pub use params::{Param, Params};
pub use path::clean_path;
pub use tree::{Match, Node, NodeKind};

/// Methods registered by [`Router::any`].
pub const ANY_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

macro_rules! method_shortcuts {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            pub fn $name<F>(&mut self, path: &str, handle: F) -> RouteNode
            where
                F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
            {
                self.handle(Method::$method, path, Arc::new(handle))
            }
        )*
    };
}
pub(crate) use method_shortcuts;

/// A registered endpoint with its middleware chain.
pub struct Route {
    path: String,
    handle: HttpHandle,
    group_middlewares: Option<Arc<RwLock<Vec<Layer>>>>,
    middlewares: RwLock<Vec<Layer>>,
}

impl Route {
    fn new(path: &str, handle: HttpHandle, group: Option<Arc<RwLock<Vec<Layer>>>>) -> Self {
        Route {
            path: path.to_string(),
            handle,
            group_middlewares: group,
            middlewares: RwLock::new(Vec::new()),
        }
    }

    /// The pattern this route was registered under.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handle(&self) -> &HttpHandle {
        &self.handle
    }

    pub fn middlewares(&self) -> Vec<Layer> {
        self.middlewares.read().clone()
    }

    /// Middlewares of the group the route belongs to, if any.
    pub fn group_middlewares(&self) -> Vec<Layer> {
        self.group_middlewares
            .as_ref()
            .map(|m| m.read().clone())
            .unwrap_or_default()
    }

    pub fn use_middleware(&self, layer: impl Into<Layer>) {
        self.middlewares.write().push(layer.into());
    }
}

/// Handle returned by route registration, used to attach route middlewares.
#[derive(Clone)]
pub struct RouteNode {
    route: Arc<Route>,
}

impl RouteNode {
    pub fn use_middleware(&self, layer: impl Into<Layer>) -> &Self {
        self.route.use_middleware(layer);
        self
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn path(&self) -> &str {
        self.route.path()
    }
}

pub struct WebSocketRoute {
    path: String,
    handle: WebSocketHandle,
}

impl WebSocketRoute {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handle(&self) -> &WebSocketHandle {
        &self.handle
    }
}

/// Summary entry listed by `/dotweb/routers`.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
}

pub struct Router {
    trees: HashMap<Method, Node<Arc<Route>>>,
    websockets: Node<Arc<WebSocketRoute>>,
    routes: Vec<RouteInfo>,
    handlers: RwLock<HashMap<String, HttpHandle>>,
    auto_head: bool,
    /// Redirect when only the trailing slash differs from a registered route.
    pub redirect_trailing_slash: bool,
    /// Redirect to the cleaned, case-insensitively matched route.
    pub redirect_fixed_path: bool,
    /// Answer `405` with an `Allow` header when another method matches.
    pub handle_method_not_allowed: bool,
    not_found: Option<HttpHandle>,
    method_not_allowed: Option<HttpHandle>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            trees: HashMap::new(),
            websockets: Node::new(),
            routes: Vec::new(),
            handlers: RwLock::new(HashMap::new()),
            auto_head: false,
            redirect_trailing_slash: true,
            redirect_fixed_path: true,
            handle_method_not_allowed: true,
            not_found: None,
            method_not_allowed: None,
        }
    }

    /// Also register every non-HEAD route under HEAD.
    pub fn set_auto_head(&mut self, enabled: bool) {
        self.auto_head = enabled;
    }

    pub fn auto_head(&self) -> bool {
        self.auto_head
    }

    pub(crate) fn add_route(
        &mut self,
        methods: &[Method],
        path: &str,
        handle: HttpHandle,
        group: Option<Arc<RwLock<Vec<Layer>>>>,
    ) -> Result<RouteNode> {
        if !path.starts_with('/') {
            return Err(DotwebError::RouteMalformed(format!(
                "path must begin with '/' in path '{path}'"
            )));
        }
        let route = Arc::new(Route::new(path, handle, group));
        for method in methods {
            self.trees
                .entry(method.clone())
                .or_default()
                .insert(path, route.clone())?;
            self.routes.push(RouteInfo {
                method: method.to_string(),
                path: path.to_string(),
            });
            tracing::debug!(method = %method, path, "route registered");
        }
        if self.auto_head && !methods.contains(&Method::HEAD) {
            let head = self.trees.entry(Method::HEAD).or_default();
            let mut params = Params::new();
            if head.get_value(path, &mut params).value.is_none() {
                head.insert(path, route.clone())?;
                self.routes.push(RouteInfo {
                    method: Method::HEAD.to_string(),
                    path: path.to_string(),
                });
            }
        }
        Ok(RouteNode { route })
    }

    /// Register `handle` for `method` and `path`.
    pub fn try_handle(&mut self, method: Method, path: &str, handle: HttpHandle) -> Result<RouteNode> {
        self.add_route(&[method], path, handle, None)
    }

    /// Like [`try_handle`](Self::try_handle), but a conflicting or
    /// malformed pattern aborts with a panic carrying the error text.
    pub fn handle(&mut self, method: Method, path: &str, handle: HttpHandle) -> RouteNode {
        match self.try_handle(method, path, handle) {
            Ok(node) => node,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_any(&mut self, path: &str, handle: HttpHandle) -> Result<RouteNode> {
        self.add_route(&ANY_METHODS, path, handle, None)
    }

    /// Register `handle` for every method in [`ANY_METHODS`].
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

    /// Register a WebSocket endpoint. Upgrade requests for `path` are
    /// answered with the handshake and the handler receives the connection.
    pub fn websocket<F, Fut>(&mut self, path: &str, handle: F)
    where
        F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let route = Arc::new(WebSocketRoute {
            path: path.to_string(),
            handle: websocket_handle(handle),
        });
        if let Err(err) = self.websockets.insert(path, route) {
            panic!("{err}");
        }
        self.routes.push(RouteInfo {
            method: "WEBSOCKET".to_string(),
            path: path.to_string(),
        });
    }

    pub(crate) fn lookup_websocket(&self, path: &str) -> Option<(Arc<WebSocketRoute>, Params)> {
        let mut params = Params::new();
        let route = self.websockets.get_value(path, &mut params).value?.clone();
        Some((route, params))
    }

    /// Register a GET route whose handler takes over the connection.
    pub fn hijack<F, Fut>(&mut self, path: &str, handle: F) -> RouteNode
    where
        F: Fn(HijackConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = hijack_handle(handle);
        self.get(path, move |ctx| {
            let handle = handle.clone();
            Box::pin(async move {
                let conn = match ctx.hijack() {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(url = %ctx.request().url(), error = %err, "hijack failed");
                        ctx.write_string_c(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())?;
                        return Ok(());
                    }
                };
                let url = ctx.request().url();
                tokio::spawn(async move {
                    if let Err(err) = handle(conn).await {
                        tracing::warn!(url = %url, error = %err, "hijacked connection handler failed");
                    }
                });
                Ok(())
            })
        })
    }

    /// Serve files below `root`. `path` must end with `/*filepath`.
    pub fn serve_files(&mut self, path: &str, root: impl Into<PathBuf>) -> RouteNode {
        if !path.ends_with("/*filepath") {
            panic!(
                "{}",
                DotwebError::RouteMalformed(format!("path must end with /*filepath in path '{path}'"))
            );
        }
        let root = Arc::new(root.into());
        self.get(path, move |ctx| {
            let root = root.clone();
            Box::pin(async move { files::serve(ctx, &root).await })
        })
    }

    /// Open a group whose routes share `prefix` and the group middlewares.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group::new(self, prefix.to_string(), Vec::new())
    }

    /// Make `handle` available to configuration files under `name`.
    pub fn register_handler<F>(&self, name: &str, handle: F)
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.handlers.write().insert(name.to_string(), Arc::new(handle));
    }

    pub fn get_handler(&self, name: &str) -> Option<HttpHandle> {
        self.handlers.read().get(name).cloned()
    }

    pub fn set_not_found_handle<F>(&mut self, handle: F)
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(handle));
    }

    pub fn set_method_not_allowed_handle<F>(&mut self, handle: F)
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.method_not_allowed = Some(Arc::new(handle));
    }

    /// Every registered (method, pattern) pair in registration order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    /// Resolve `method` and `path`. The flag is the trailing slash
    /// recommendation on a miss.
    pub fn lookup(&self, method: &Method, path: &str, params: &mut Params) -> (Option<Arc<Route>>, bool) {
        let Some(tree) = self.trees.get(method) else {
            return (None, false);
        };
        let found = tree.get_value(path, params);
        (found.value.cloned(), found.tsr)
    }

    /// Whether `pattern` resolves to the route matched for `ctx`.
    pub fn match_path(&self, ctx: &HttpContext, pattern: &str) -> bool {
        let Some(current) = ctx.route() else {
            return false;
        };
        let Some(tree) = self.trees.get(ctx.request().method()) else {
            return false;
        };
        let mut params = Params::new();
        tree.get_value(pattern, &mut params)
            .value
            .is_some_and(|route| Arc::ptr_eq(route, current))
    }

    /// Comma separated methods that would match `path`, sorted, with
    /// `OPTIONS` appended. Empty when nothing matches.
    pub fn allowed(&self, path: &str, req_method: &Method) -> String {
        let mut allow: Vec<&str> = Vec::new();
        if path == "*" {
            for method in self.trees.keys() {
                if *method != Method::OPTIONS {
                    allow.push(method.as_str());
                }
            }
        } else {
            for (method, tree) in &self.trees {
                if method == req_method || *method == Method::OPTIONS {
                    continue;
                }
                let mut params = Params::new();
                if tree.get_value(path, &mut params).value.is_some() {
                    allow.push(method.as_str());
                }
            }
        }
        if allow.is_empty() {
            return String::new();
        }
        allow.sort_unstable();
        allow.push(Method::OPTIONS.as_str());
        allow.join(", ")
    }

    /// Route the request held by `ctx` and run its pipeline.
    pub(crate) async fn serve(&self, server: &HttpServer, ctx: &mut HttpContext) -> Result<()> {
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_string();

        let mut params = ctx.take_params();
        let (route, tsr) = self.lookup(&method, &path, &mut params);
        if let Some(route) = route {
            ctx.set_route(route.clone(), params);
            return self.run_route(server, ctx, &route).await;
        }
        params.clear();
        ctx.restore_params(params);

        if method != Method::CONNECT && path != "/" {
            let code = if method == Method::GET {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::TEMPORARY_REDIRECT
            };
            if tsr && self.redirect_trailing_slash {
                let target = match path.strip_suffix('/') {
                    Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
                    _ => format!("{path}/"),
                };
                return redirect_with_query(ctx, code, target);
            }
            if self.redirect_fixed_path
                && let Some(tree) = self.trees.get(&method)
                && let Some(fixed) =
                    tree.find_case_insensitive_path(&clean_path(&path), self.redirect_trailing_slash)
            {
                return redirect_with_query(ctx, code, fixed);
            }
        }

        let auto_options = server.config().server.enabled_auto_options;
        if method == Method::OPTIONS && auto_options {
            let allow = self.allowed(&path, &method);
            if !allow.is_empty() {
                ctx.response_mut().set_header(header::ALLOW.as_str(), &allow)?;
                ctx.response_mut().write_header(StatusCode::OK)?;
                return Ok(());
            }
        } else if self.handle_method_not_allowed {
            let allow = self.allowed(&path, &method);
            if !allow.is_empty() {
                ctx.response_mut().set_header(header::ALLOW.as_str(), &allow)?;
                if let Some(handle) = &self.method_not_allowed {
                    return handle(ctx).await;
                }
                ctx.write_string_c(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")?;
                return Ok(());
            }
        }

        if let Some(handle) = &self.not_found {
            return handle(ctx).await;
        }
        ctx.write_string_c(StatusCode::NOT_FOUND, "Not Found")?;
        Ok(())
    }

    async fn run_route(&self, server: &HttpServer, ctx: &mut HttpContext, route: &Route) -> Result<()> {
        let group = route.group_middlewares();
        let own = route.middlewares();
        let endpoint = server
            .mock()
            .and_then(|mock| mock.handle_for(ctx))
            .unwrap_or_else(|| route.handle().clone());
        Next::new(server.middlewares(), &group, &own, &endpoint)
            .run(ctx)
            .await
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn redirect_with_query(ctx: &mut HttpContext, code: StatusCode, mut target: String) -> Result<()> {
    let query = ctx.request().raw_query();
    if !query.is_empty() {
        target.push('?');
        target.push_str(query);
    }
    ctx.redirect(code, &target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static {
        |_ctx| Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_router_lookup_params() {
        let mut router = Router::new();
        router.get("/users/:id", noop());
        router.post("/users/:id/posts/:post_id", noop());

        let mut params = Params::new();
        let (route, _) = router.lookup(&Method::GET, "/users/123", &mut params);
        assert_eq!(route.unwrap().path(), "/users/:id");
        assert_eq!(params.by_name("id"), "123");

        let mut params = Params::new();
        let (route, _) = router.lookup(&Method::POST, "/users/123/posts/abc", &mut params);
        assert!(route.is_some());
        assert_eq!(params.by_name("post_id"), "abc");

        let mut params = Params::new();
        assert!(router.lookup(&Method::DELETE, "/users/1", &mut params).0.is_none());
    }

    #[test]
    fn test_allowed_lists_other_methods() {
        let mut router = Router::new();
        router.get("/a", noop());
        router.put("/a", noop());
        router.options("/a", noop());
        router.post("/b", noop());

        assert_eq!(router.allowed("/a", &Method::POST), "GET, PUT, OPTIONS");
        assert_eq!(router.allowed("/a", &Method::GET), "PUT, OPTIONS");
        assert_eq!(router.allowed("/missing", &Method::GET), "");
        assert_eq!(router.allowed("*", &Method::OPTIONS), "GET, POST, PUT, OPTIONS");
    }

    #[test]
    fn test_auto_head_shares_route() {
        let mut router = Router::new();
        router.set_auto_head(true);
        router.get("/page", noop());

        let mut params = Params::new();
        let (get, _) = router.lookup(&Method::GET, "/page", &mut params);
        let (head, _) = router.lookup(&Method::HEAD, "/page", &mut params);
        assert!(Arc::ptr_eq(&get.unwrap(), &head.unwrap()));
        assert_eq!(router.routes().len(), 2);
    }

    #[test]
    fn test_any_registers_all_methods() {
        let mut router = Router::new();
        router.any("/all", noop());
        for method in ANY_METHODS {
            let mut params = Params::new();
            assert!(router.lookup(&method, "/all", &mut params).0.is_some(), "{method}");
        }
    }

    #[test]
    fn test_try_handle_reports_conflict() {
        let mut router = Router::new();
        router.get("/user/:id", noop());
        let err = router
            .try_handle(Method::GET, "/user/:name", Arc::new(noop()))
            .err()
            .unwrap();
        assert!(matches!(err, DotwebError::RouteConflict(_)));
        assert!(matches!(
            router.try_handle(Method::GET, "nolead", Arc::new(noop())),
            Err(DotwebError::RouteMalformed(_))
        ));
    }

    #[test]
    #[should_panic(expected = "conflict")]
    fn test_handle_panics_on_conflict() {
        let mut router = Router::new();
        router.get("/files/*filepath", noop());
        router.get("/files/readme", noop());
    }

    #[test]
    fn test_named_handlers() {
        let router = Router::new();
        router.register_handler("index", noop());
        assert!(router.get_handler("index").is_some());
        assert!(router.get_handler("missing").is_none());
    }
}
