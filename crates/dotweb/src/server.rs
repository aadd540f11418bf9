//! The HTTP server: owns the router, configuration, shared services and
//! the hyper accept loop.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http_body::Body;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::http::{HeaderValue, Method, StatusCode, header};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin;
use crate::cache::{CacheService, DEFAULT_GC_INTERVAL, RuntimeCache};
use crate::config::{Config, ConfigType, OfflineConfig, RouterConfig};
use crate::context::{HttpContext, MIME_TEXT_PLAIN_UTF8};
use crate::cookie::Cookie;
use crate::error::{BoxError, DotwebError, Result};
use crate::handler::{ExceptionHandle, HttpHandle};
use crate::items::ItemMap;
use crate::middleware::{Layer, RequestLog};
use crate::mock::Mock;
use crate::plugin::Plugin;
use crate::pool::Pools;
use crate::request::{RemoteAddr, Request};
use crate::router::{Group, RouteNode, Router, method_shortcuts};
use crate::session::SessionManager;
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::state::ServerState;
use crate::view::Renderer;
use crate::websocket;

static SERVER_NAME: HeaderValue = HeaderValue::from_static("dotweb");

const DEFAULT_OFFLINE_TEXT: &str = "server is offline";

/// Builds the middleware registered under a name in the config file.
pub type MiddlewareFactory = Arc<dyn Fn() -> Layer + Send + Sync>;

pub struct HttpServer {
    router: Router,
    config: ArcSwap<Config>,
    config_source: Option<(PathBuf, ConfigType)>,
    config_set: ArcSwap<ItemMap>,
    middlewares: Vec<Layer>,
    middleware_factories: HashMap<String, MiddlewareFactory>,
    exception_handle: Option<ExceptionHandle>,
    session_manager: Option<SessionManager>,
    cache: Option<CacheService>,
    runtime_cache: Option<RuntimeCache>,
    renderer: Option<Arc<dyn Renderer>>,
    mock: Option<Mock>,
    plugins: Vec<Arc<dyn Plugin>>,
    app_items: ItemMap,
    state: ServerState,
    pools: Pools,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpServer {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut router = Router::new();
        router.set_auto_head(config.server.enabled_auto_head);
        if config.server.enabled_inner_router {
            admin::register(&mut router);
        }

        let runtime_cache = RuntimeCache::new();
        let mut middleware_factories: HashMap<String, MiddlewareFactory> = HashMap::new();
        middleware_factories.insert(
            "RequestLog".to_string(),
            Arc::new(|| Layer::new(RequestLog)),
        );

        HttpServer {
            router,
            config_set: ArcSwap::from_pointee(build_config_set(&config)),
            pools: Pools::new(config.server.pool_max_idle),
            config: ArcSwap::from_pointee(config),
            config_source: None,
            middlewares: Vec::new(),
            middleware_factories,
            exception_handle: None,
            session_manager: None,
            cache: Some(CacheService::new(runtime_cache.clone())),
            runtime_cache: Some(runtime_cache),
            renderer: None,
            mock: None,
            plugins: Vec::new(),
            app_items: ItemMap::new(),
            state: ServerState::new(),
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Load the configuration from `path`, choosing the format from its
    /// extension. The path is remembered for [`reload_config`](Self::reload_config).
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kind = ConfigType::from_path(path).ok_or_else(|| {
            DotwebError::ConfigParse(format!("unknown config format for {}", path.display()))
        })?;
        Self::from_config_file_with(path, kind)
    }

    pub fn from_config_file_with(path: impl AsRef<Path>, kind: ConfigType) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::from_file(path, kind)?;
        let mut server = Self::with_config(config);
        server.config_source = Some((path.to_path_buf(), kind));
        Ok(server)
    }

    // ===== Configuration =====

    /// The live configuration. Reloads swap it atomically.
    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// The `configSet` key/value section as an item map.
    pub fn config_set(&self) -> Arc<ItemMap> {
        self.config_set.load_full()
    }

    pub fn config_source(&self) -> Option<&Path> {
        self.config_source.as_ref().map(|(path, _)| path.as_path())
    }

    /// Replace the live configuration. Routing sections only take effect at
    /// [`start`](Self::start); everything read per request applies at once.
    pub fn reset_config(&self, config: Config) {
        self.config_set.store(Arc::new(build_config_set(&config)));
        self.config.store(Arc::new(config));
    }

    /// Re-read the file this server was loaded from.
    pub fn reload_config(&self) -> Result<()> {
        let (path, kind) = self.config_source.as_ref().ok_or_else(|| {
            DotwebError::ConfigParse("server was not loaded from a config file".into())
        })?;
        let config = Config::from_file(path, *kind)?;
        self.reset_config(config);
        tracing::info!(path = %path.display(), "configuration reloaded");
        Ok(())
    }

    // ===== Routing =====

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn handle(&mut self, method: Method, path: &str, handle: HttpHandle) -> RouteNode {
        self.router.handle(method, path, handle)
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

    pub fn any<F>(&mut self, path: &str, handle: F) -> RouteNode
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.router.any(path, handle)
    }

    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        self.router.group(prefix)
    }

    pub fn serve_files(&mut self, path: &str, root: impl Into<PathBuf>) -> RouteNode {
        self.router.serve_files(path, root)
    }

    pub fn websocket<F, Fut>(&mut self, path: &str, handle: F)
    where
        F: Fn(websocket::WebSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.router.websocket(path, handle)
    }

    /// Name a handler so config-declared routes can refer to it.
    pub fn register_handler<F>(&self, name: &str, handle: F)
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.router.register_handler(name, handle)
    }

    // ===== Middleware and services =====

    /// Append an app-level middleware; it runs for every routed request.
    pub fn use_middleware(&mut self, layer: impl Into<Layer>) -> &mut Self {
        self.middlewares.push(layer.into());
        self
    }

    pub fn middlewares(&self) -> &[Layer] {
        &self.middlewares
    }

    /// Name a middleware so config-declared middlewares can refer to it.
    pub fn register_middleware<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Layer + Send + Sync + 'static,
    {
        self.middleware_factories
            .insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Called instead of the default `500` when a handler fails or panics.
    pub fn set_exception_handle<F>(&mut self, handle: F) -> &mut Self
    where
        F: Fn(&mut HttpContext, &DotwebError) + Send + Sync + 'static,
    {
        self.exception_handle = Some(Arc::new(handle));
        self
    }

    pub fn set_session_manager(&mut self, manager: SessionManager) -> &mut Self {
        self.session_manager = Some(manager);
        self
    }

    pub fn session_manager(&self) -> Option<&SessionManager> {
        self.session_manager.as_ref()
    }

    /// Replace the default in-process cache.
    pub fn set_cache(&mut self, cache: CacheService) -> &mut Self {
        self.cache = Some(cache);
        self.runtime_cache = None;
        self
    }

    pub fn cache(&self) -> Option<&CacheService> {
        self.cache.as_ref()
    }

    pub fn set_renderer(&mut self, renderer: impl Renderer + 'static) -> &mut Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn renderer(&self) -> Option<Arc<dyn Renderer>> {
        self.renderer.clone()
    }

    pub fn set_mock(&mut self, mock: Mock) -> &mut Self {
        self.mock = Some(mock);
        self
    }

    pub fn mock(&self) -> Option<&Mock> {
        self.mock.as_ref()
    }

    pub fn use_plugin(&mut self, plugin: impl Plugin) -> &mut Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Application-wide items, shared by every request.
    pub fn app_items(&self) -> &ItemMap {
        &self.app_items
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    // ===== Lifecycle =====

    /// Ask the accept loop, plugins and GC tasks to stop.
    pub fn shutdown(&self) {
        tracing::info!("dotweb server shutdown requested");
        self.shutdown.trigger();
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Finish setup: apply config-declared middlewares and routes, open the
    /// session store and spawn background tasks and plugins.
    pub async fn start(mut self) -> Result<Arc<Self>> {
        let config = self.config();
        self.apply_routing_config(&config)?;
        if config.session.enabled_session && self.session_manager.is_none() {
            self.session_manager = Some(SessionManager::from_config(&config.session).await?);
        }

        let server = Arc::new(self);
        {
            let mut tasks = server.tasks.lock();
            if let Some(manager) = &server.session_manager {
                tasks.push(manager.spawn_gc(server.shutdown.subscribe()));
            }
            if let Some(cache) = &server.runtime_cache {
                tasks.push(cache.spawn_gc(DEFAULT_GC_INTERVAL, server.shutdown.subscribe()));
            }
            for plugin in &server.plugins {
                if !plugin.is_validate() {
                    tracing::warn!(plugin = plugin.name(), "plugin is not valid, skipping");
                    continue;
                }
                let plugin = plugin.clone();
                let owner = server.clone();
                let signal = server.shutdown.subscribe();
                tasks.push(tokio::spawn(async move {
                    if let Err(err) = plugin.run(owner, signal).await {
                        tracing::error!(plugin = plugin.name(), error = %err, "plugin stopped");
                    }
                }));
            }
        }

        tracing::info!(
            version = crate::VERSION,
            routes = server.router.routes().len(),
            run_mode = %config.app.run_mode,
            "dotweb server started"
        );
        Ok(server)
    }

    fn named_middleware(&self, name: &str) -> Result<Layer> {
        self.middleware_factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| DotwebError::ConfigParse(format!("unknown middleware '{name}'")))
    }

    fn named_middlewares(&self, configs: &[crate::config::MiddlewareConfig]) -> Result<Vec<Layer>> {
        configs
            .iter()
            .filter(|m| m.is_use)
            .map(|m| self.named_middleware(&m.name))
            .collect()
    }

    fn configured_route(&self, route: &RouterConfig) -> Result<ConfiguredRoute> {
        let method = match route.method.to_ascii_uppercase().as_str() {
            "ANY" => None,
            other => Some(Method::from_bytes(other.as_bytes()).map_err(|_| {
                DotwebError::ConfigParse(format!("invalid method '{}'", route.method))
            })?),
        };
        let handle = self.router.get_handler(&route.handler).ok_or_else(|| {
            DotwebError::ConfigParse(format!("unknown handler '{}'", route.handler))
        })?;
        Ok(ConfiguredRoute {
            method,
            path: route.path.clone(),
            handle,
            layers: self.named_middlewares(&route.middlewares)?,
        })
    }

    fn apply_routing_config(&mut self, config: &Config) -> Result<()> {
        let app_layers = self.named_middlewares(&config.middlewares)?;
        self.middlewares.extend(app_layers);

        for route in config.routers.iter().filter(|r| r.is_use) {
            let configured = self.configured_route(route)?;
            let node = match configured.method {
                Some(method) => self.router.try_handle(method, &configured.path, configured.handle)?,
                None => self.router.try_any(&configured.path, configured.handle)?,
            };
            for layer in configured.layers {
                node.use_middleware(layer);
            }
        }

        for group_config in config.groups.iter().filter(|g| g.is_use) {
            let group_layers = self.named_middlewares(&group_config.middlewares)?;
            let routes = group_config
                .routers
                .iter()
                .filter(|r| r.is_use)
                .map(|r| self.configured_route(r))
                .collect::<Result<Vec<_>>>()?;

            let mut group = self.router.group(&group_config.path);
            for layer in group_layers {
                group.use_middleware(layer);
            }
            for configured in routes {
                let node = match configured.method {
                    Some(method) => group.try_handle(method, &configured.path, configured.handle)?,
                    None => group.try_any(&configured.path, configured.handle)?,
                };
                for layer in configured.layers {
                    node.use_middleware(layer);
                }
            }
        }
        Ok(())
    }

    // ===== Request dispatch =====

    /// Run one request through the server and produce its response.
    pub async fn serve_http<B>(self: &Arc<Self>, req: hyper::Request<B>) -> hyper::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        if websocket::is_upgrade_request(req.headers())
            && let Some((route, params)) = self.router.lookup_websocket(req.uri().path())
        {
            return websocket::accept(route, params, req);
        }

        let config = self.config();
        if config.offline.offline {
            return offline_response(&config.offline);
        }

        let mut request = self.pools.requests.acquire();
        request.bind(req, config.server.max_body_size);
        let mut ctx = self.pools.contexts.acquire();
        ctx.attach(
            self.clone(),
            request,
            self.pools.responses.acquire(),
            self.pools.params.acquire(),
        );
        ctx.response_mut()
            .headers_mut()
            .insert(header::SERVER, SERVER_NAME.clone());
        self.state.add_request_count(1);

        if let Some(manager) = &self.session_manager {
            bind_session(&mut ctx, manager);
        }

        match AssertUnwindSafe(self.router.serve(self, &mut ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.handle_error(&mut ctx, err),
            Err(payload) => self.handle_panic(&mut ctx, payload),
        }

        if config.server.enabled_gzip
            && accepts_gzip(ctx.request())
            && let Err(err) = ctx.response_mut().gzip()
        {
            tracing::warn!(error = %err, "gzip encoding failed, sending identity body");
        }

        let response = ctx.response_mut().take_http();
        self.release(ctx);
        response
    }

    fn handle_error(&self, ctx: &mut HttpContext, err: DotwebError) {
        let url = ctx.request().path().to_string();
        tracing::error!(url = %url, error = %err, code = err.error_code(), "handler returned an error");
        self.state.add_error_count(&url, 1);
        if let Some(handle) = &self.exception_handle {
            handle(ctx, &err);
        } else if !ctx.response().is_committed() {
            if let Err(write_err) = ctx.write_string_c(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()) {
                tracing::warn!(url = %url, error = %write_err, "cannot write the error response");
            }
        }
    }

    fn handle_panic(&self, ctx: &mut HttpContext, payload: Box<dyn Any + Send>) {
        let url = ctx.request().path().to_string();
        let message = panic_message(payload.as_ref());
        let backtrace = Backtrace::force_capture();
        tracing::error!(url = %url, panic = %message, backtrace = %backtrace, "handler panicked");
        self.state.add_error_count(&url, 1);

        ctx.response_mut().discard();
        let err = DotwebError::HandlerPanic(message);
        if let Some(handle) = &self.exception_handle {
            handle(ctx, &err);
        } else {
            if let Err(write_err) = ctx.write_string_c(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()) {
                tracing::warn!(url = %url, error = %write_err, "cannot write the error response");
            }
        }
    }

    fn release(&self, mut ctx: HttpContext) {
        let (request, response, params) = ctx.detach();
        self.pools.requests.release(request);
        self.pools.responses.release(response);
        self.pools.params.release(params);
        self.pools.contexts.release(ctx);
    }

    // ===== Serving =====

    /// Accept connections from `listener` until shutdown is requested.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        let builder = http1_builder();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("dotweb server stopped accepting connections");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let _ = stream.set_nodelay(true);
                            let io = TokioIo::new(stream);
                            let server = self.clone();
                            let builder = builder.clone();

                            tokio::spawn(async move {
                                let svc = service_fn(move |mut req: hyper::Request<Incoming>| {
                                    let server = server.clone();
                                    req.extensions_mut().insert(RemoteAddr(peer));
                                    async move { Ok::<_, Infallible>(server.serve_http(req).await) }
                                });
                                if let Err(e) = builder.serve_connection(io, svc).with_upgrades().await
                                    && !e.is_incomplete_message()
                                    && !e.is_canceled()
                                    && !e.is_closed()
                                {
                                    tracing::debug!("connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("TCP accept error: {}", e);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Start the server and listen on the configured port until Ctrl-C.
    pub async fn listen_and_serve(self) -> Result<()> {
        let port = self.config().server.port;
        let server = self.start().await?;
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|e| DotwebError::Internal(format!("cannot listen on port {port}: {e}")))?;
        tracing::info!(addr = %listener.local_addr()?, "dotweb server listening");

        let owner = server.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            owner.shutdown();
        });

        server.serve(listener).await?;
        let tasks = std::mem::take(&mut *server.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

struct ConfiguredRoute {
    method: Option<Method>,
    path: String,
    handle: HttpHandle,
    layers: Vec<Layer>,
}

/// HTTP/1.1 connection settings shared by every accepted connection.
fn http1_builder() -> http1::Builder {
    let mut builder = http1::Builder::new();
    builder.keep_alive(true).half_close(false).max_buf_size(64 * 1024);
    builder
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down dotweb server...");
}

fn build_config_set(config: &Config) -> ItemMap {
    let items = ItemMap::new();
    for item in &config.config_set {
        items.set(item.key.clone(), item.value.clone());
    }
    items
}

fn offline_response(offline: &OfflineConfig) -> hyper::Response<Full<Bytes>> {
    let mut response = if !offline.offline_url.is_empty() {
        let mut response = hyper::Response::new(Full::default());
        *response.status_mut() = StatusCode::FOUND;
        if let Ok(location) = HeaderValue::from_str(&offline.offline_url) {
            response.headers_mut().insert(header::LOCATION, location);
        }
        response
    } else {
        let text = if offline.offline_text.is_empty() {
            DEFAULT_OFFLINE_TEXT
        } else {
            offline.offline_text.as_str()
        };
        let mut response = hyper::Response::new(Full::new(Bytes::copy_from_slice(text.as_bytes())));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(MIME_TEXT_PLAIN_UTF8),
        );
        response
    };
    response
        .headers_mut()
        .insert(header::SERVER, SERVER_NAME.clone());
    response
}

/// Reuse the session id from the request cookie or issue a new one.
fn bind_session(ctx: &mut HttpContext, manager: &SessionManager) {
    let id = match ctx.read_cookie_value(manager.cookie_name()) {
        Some(id) if !id.is_empty() => id,
        _ => {
            let id = SessionManager::new_session_id();
            let cookie = Cookie::new(manager.cookie_name(), id.clone())
                .path("/")
                .http_only(true);
            if let Err(err) = ctx.set_cookie(&cookie) {
                tracing::warn!(error = %err, "cannot set session cookie");
            }
            id
        }
    };
    ctx.set_session_id(id);
}

fn accepts_gzip(req: &Request) -> bool {
    req.headers()
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|coding| coding.split(';').next())
        .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
