//! Per-request context: the request and response wrappers plus everything a
//! handler needs while the request is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use bytes::Bytes;
use http_body::Body;
use hyper::http::{StatusCode, header};
use hyper::upgrade::OnUpgrade;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::bind;
use crate::cache::CacheService;
use crate::config::Config;
use crate::cookie::{Cookie, find_cookie};
use crate::error::{BoxError, DotwebError, Result};
use crate::hijack::HijackConn;
use crate::items::ItemMap;
use crate::pool::Recycle;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Params, Route};
use crate::server::HttpServer;
use crate::session::SessionState;

pub const MIME_TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub const MIME_TEXT_HTML_UTF8: &str = "text/html; charset=utf-8";
pub const MIME_JSON_UTF8: &str = "application/json; charset=utf-8";
pub const MIME_JAVASCRIPT_UTF8: &str = "application/javascript; charset=utf-8";

/// Which tier of the pipeline is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiddlewareTier {
    #[default]
    App,
    Group,
    Route,
    Handler,
}

#[derive(Default)]
pub struct HttpContext {
    request: Request,
    response: Response,
    route: Option<Arc<Route>>,
    params: Params,
    server: Option<Arc<HttpServer>>,
    items: ItemMap,
    view_data: Map<String, Value>,
    session_id: String,
    session: Option<Arc<SessionState>>,
    started_at: Option<Instant>,
    is_end: bool,
    tier: MiddlewareTier,
}

impl HttpContext {
    /// Build a detached context around `req`, without a server.
    ///
    /// Handy for exercising handlers and middleware directly.
    pub fn from_request<B>(req: hyper::Request<B>) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let mut ctx = HttpContext::default();
        ctx.request.bind(req, 0);
        ctx.started_at = Some(Instant::now());
        ctx
    }

    pub(crate) fn attach(
        &mut self,
        server: Arc<HttpServer>,
        request: Request,
        response: Response,
        params: Params,
    ) {
        self.server = Some(server);
        self.request = request;
        self.response = response;
        self.params = params;
        self.started_at = Some(Instant::now());
    }

    /// Hand the pooled parts back so they can be released separately.
    pub(crate) fn detach(&mut self) -> (Request, Response, Params) {
        (
            std::mem::take(&mut self.request),
            std::mem::take(&mut self.response),
            std::mem::take(&mut self.params),
        )
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// The matched route, once routing succeeded.
    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    /// Pattern of the matched route, e.g. `/user/:id`.
    pub fn route_path(&self) -> Option<&str> {
        self.route.as_deref().map(Route::path)
    }

    pub(crate) fn set_route(&mut self, route: Arc<Route>, params: Params) {
        self.route = Some(route);
        self.params = params;
    }

    pub(crate) fn take_params(&mut self) -> Params {
        std::mem::take(&mut self.params)
    }

    pub(crate) fn restore_params(&mut self, params: Params) {
        self.params = params;
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Value of the route parameter `name`, or `""`.
    pub fn param(&self, name: &str) -> &str {
        self.params.by_name(name)
    }

    pub fn server(&self) -> Option<&Arc<HttpServer>> {
        self.server.as_ref()
    }

    /// Configuration currently in effect.
    pub fn config(&self) -> Option<Arc<Config>> {
        self.server.as_ref().map(|s| s.config())
    }

    pub fn cache(&self) -> Option<CacheService> {
        self.server.as_ref().and_then(|s| s.cache().cloned())
    }

    /// Application-wide items owned by the server.
    pub fn app_items(&self) -> Option<&ItemMap> {
        self.server.as_ref().map(|s| s.app_items())
    }

    /// Request-scoped items, cleared when the request ends.
    pub fn items(&self) -> &ItemMap {
        &self.items
    }

    pub fn view_data(&self) -> &Map<String, Value> {
        &self.view_data
    }

    pub fn view_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.view_data
    }

    pub fn set_view_data<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.view_data.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn set_session_id(&mut self, id: String) {
        self.session_id = id;
    }

    /// The session of this request, loaded from the store on first use.
    pub async fn session(&mut self) -> Result<Arc<SessionState>> {
        if let Some(state) = &self.session {
            return Ok(state.clone());
        }
        let server = self
            .server
            .clone()
            .ok_or_else(|| DotwebError::SessionStoreFailure("context is not attached to a server".into()))?;
        let manager = server
            .session_manager()
            .ok_or_else(|| DotwebError::SessionStoreFailure("sessions are not enabled".into()))?;
        if self.session_id.is_empty() {
            return Err(DotwebError::SessionStoreFailure("request carries no session id".into()));
        }
        let state = manager.get_session_state(&self.session_id).await?;
        self.session = Some(state.clone());
        Ok(state)
    }

    /// Remove the session from the store and expire its cookie.
    pub async fn destroy_session(&mut self) -> Result<()> {
        let Some(server) = self.server.clone() else {
            return Ok(());
        };
        let Some(manager) = server.session_manager() else {
            return Ok(());
        };
        if !self.session_id.is_empty() {
            manager.remove_session_state(&self.session_id).await?;
        }
        self.session = None;
        self.remove_cookie(manager.cookie_name())
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn is_end(&self) -> bool {
        self.is_end
    }

    /// Stop the pipeline: no further middleware or handler runs.
    pub fn end(&mut self) {
        self.is_end = true;
    }

    pub fn tier(&self) -> MiddlewareTier {
        self.tier
    }

    pub(crate) fn set_tier(&mut self, tier: MiddlewareTier) {
        self.tier = tier;
    }

    pub fn is_hijacked(&self) -> bool {
        self.response.is_hijacked()
    }

    pub fn query_string(&self, key: &str) -> String {
        self.request.query_string(key)
    }

    pub fn query_strings(&self) -> Vec<(String, String)> {
        self.request.query_strings()
    }

    pub fn remote_ip(&self) -> String {
        self.request.remote_ip()
    }

    /// Client address from `X-Real-IP`, then `X-Forwarded-For`, then the peer.
    pub fn real_ip(&self) -> String {
        self.request.real_ip()
    }

    pub fn is_ajax(&self) -> bool {
        self.request.is_ajax()
    }

    pub fn is_websocket(&self) -> bool {
        self.request.is_websocket()
    }

    pub async fn form_value(&mut self, key: &str) -> Result<String> {
        self.request.form_value(key).await
    }

    pub async fn post_form_value(&mut self, key: &str) -> Result<String> {
        self.request.post_form_value(key).await
    }

    pub async fn post_body(&mut self) -> Result<Bytes> {
        self.request.post_body().await
    }

    /// Decode the request into `T` according to its content type.
    pub async fn bind<T: DeserializeOwned>(&mut self) -> Result<T> {
        bind::bind_request(&mut self.request).await
    }

    /// Decode the body as JSON whatever the content type says.
    pub async fn bind_json_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        let body = self.request.post_body().await?;
        if body.is_empty() {
            return Err(DotwebError::EmptyBody);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    pub fn read_cookie_value(&self, name: &str) -> Option<String> {
        self.request
            .headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|raw| find_cookie(raw, name))
    }

    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<()> {
        self.response
            .add_header(header::SET_COOKIE.as_str(), &cookie.to_header_value())
    }

    /// Set a cookie on `/`. A `max_age` of zero makes it a session cookie.
    pub fn set_cookie_value(&mut self, name: &str, value: &str, max_age: i64) -> Result<()> {
        let mut cookie = Cookie::new(name, value).path("/");
        if max_age > 0 {
            cookie = cookie.max_age(max_age);
        }
        self.set_cookie(&cookie)
    }

    pub fn remove_cookie(&mut self, name: &str) -> Result<()> {
        let cookie = Cookie::new(name, "")
            .path("/")
            .max_age(-1)
            .expires(UNIX_EPOCH);
        self.set_cookie(&cookie)
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.response.set_header(name, value)
    }

    pub fn set_content_type(&mut self, content_type: &'static str) {
        self.response.set_content_type(content_type);
    }

    /// Commit `code` without writing a body.
    pub fn set_status_code(&mut self, code: StatusCode) -> Result<()> {
        self.response.write_header(code)
    }

    /// Commits `code`, or `200` when no code is requested. Once committed,
    /// asking for a different code fails with `HeaderAlreadyCommitted` and
    /// the committed status stays.
    fn commit(&mut self, code: Option<StatusCode>) -> Result<()> {
        if self.response.is_committed() {
            return match code {
                Some(code) if code != self.response.status() => {
                    tracing::warn!(
                        url = %self.request.url(),
                        committed = self.response.status().as_u16(),
                        requested = code.as_u16(),
                        "response status already committed"
                    );
                    Err(DotwebError::HeaderAlreadyCommitted)
                }
                _ => Ok(()),
            };
        }
        self.response.write_header(code.unwrap_or(StatusCode::OK))
    }

    fn ensure_not_hijacked(&self) -> Result<()> {
        if self.response.is_hijacked() {
            return Err(DotwebError::Internal("connection has been hijacked".into()));
        }
        Ok(())
    }

    fn write_typed(
        &mut self,
        code: Option<StatusCode>,
        content_type: &str,
        data: &[u8],
    ) -> Result<usize> {
        self.ensure_not_hijacked()?;
        if !self.response.is_committed() && !content_type.is_empty() {
            self.response
                .set_header(header::CONTENT_TYPE.as_str(), content_type)?;
        }
        self.commit(code)?;
        Ok(self.response.write(data))
    }

    /// Write raw bytes with `code`, leaving the content type alone.
    pub fn write(&mut self, code: StatusCode, data: impl AsRef<[u8]>) -> Result<usize> {
        self.write_typed(Some(code), "", data.as_ref())
    }

    // The writers without a code commit `200` on first use and keep the
    // committed status afterwards; the `_c` variants insist on `code`.

    pub fn write_string(&mut self, content: impl AsRef<str>) -> Result<usize> {
        self.write_typed(None, MIME_TEXT_PLAIN_UTF8, content.as_ref().as_bytes())
    }

    pub fn write_string_c(&mut self, code: StatusCode, content: impl AsRef<str>) -> Result<usize> {
        self.write_typed(Some(code), MIME_TEXT_PLAIN_UTF8, content.as_ref().as_bytes())
    }

    pub fn write_html(&mut self, content: impl AsRef<str>) -> Result<usize> {
        self.write_typed(None, MIME_TEXT_HTML_UTF8, content.as_ref().as_bytes())
    }

    pub fn write_html_c(&mut self, code: StatusCode, content: impl AsRef<str>) -> Result<usize> {
        self.write_typed(Some(code), MIME_TEXT_HTML_UTF8, content.as_ref().as_bytes())
    }

    pub fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<usize> {
        let body = serde_json::to_vec(value)?;
        self.write_typed(None, MIME_JSON_UTF8, &body)
    }

    pub fn write_json_c<T: Serialize + ?Sized>(&mut self, code: StatusCode, value: &T) -> Result<usize> {
        let body = serde_json::to_vec(value)?;
        self.write_typed(Some(code), MIME_JSON_UTF8, &body)
    }

    /// Write `callback(<json>);`.
    pub fn write_jsonp<T: Serialize + ?Sized>(&mut self, callback: &str, value: &T) -> Result<usize> {
        let json = serde_json::to_string(value)?;
        let body = format!("{callback}({json});");
        self.write_typed(None, MIME_JAVASCRIPT_UTF8, body.as_bytes())
    }

    pub fn write_blob(&mut self, content_type: &str, data: impl AsRef<[u8]>) -> Result<usize> {
        self.write_typed(None, content_type, data.as_ref())
    }

    pub fn write_blob_c(
        &mut self,
        code: StatusCode,
        content_type: &str,
        data: impl AsRef<[u8]>,
    ) -> Result<usize> {
        self.write_typed(Some(code), content_type, data.as_ref())
    }

    /// Send a redirect. `code` must be a 3xx status.
    pub fn redirect(&mut self, code: StatusCode, target: &str) -> Result<()> {
        if !code.is_redirection() {
            return Err(DotwebError::Internal(format!(
                "invalid redirect status code {}",
                code.as_u16()
            )));
        }
        self.ensure_not_hijacked()?;
        self.commit(Some(code))?;
        self.response
            .set_header(header::LOCATION.as_str(), target)
    }

    /// Render `name` with the view data through the server's renderer.
    pub fn view(&mut self, name: &str) -> Result<usize> {
        let html = self.render(name)?;
        self.write_typed(None, MIME_TEXT_HTML_UTF8, html.as_bytes())
    }

    pub fn view_c(&mut self, code: StatusCode, name: &str) -> Result<usize> {
        let html = self.render(name)?;
        self.write_html_c(code, html)
    }

    fn render(&self, name: &str) -> Result<String> {
        let renderer = self
            .server
            .as_ref()
            .and_then(|s| s.renderer())
            .ok_or_else(|| DotwebError::Internal("no renderer configured".into()))?;
        renderer.render(name, &self.view_data)
    }

    /// Send the file at `path` with `Last-Modified` and conditional `304`
    /// handling.
    pub async fn serve_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        crate::router::files::serve_file(self, path.as_ref()).await
    }

    /// Take over the underlying connection.
    ///
    /// Only requests that asked for a protocol upgrade can be hijacked. The
    /// server answers `101 Switching Protocols` and the returned handle
    /// yields the raw stream once that response has been flushed.
    pub fn hijack(&mut self) -> Result<HijackConn> {
        let on_upgrade = self
            .request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or(DotwebError::NotHijackable)?;
        let protocol = match self.request.header(header::UPGRADE.as_str()) {
            "" => "tcp".to_string(),
            p => p.to_string(),
        };
        self.response
            .set_header(header::CONNECTION.as_str(), "upgrade")?;
        self.response
            .set_header(header::UPGRADE.as_str(), &protocol)?;
        self.response.write_header(StatusCode::SWITCHING_PROTOCOLS)?;
        self.response.mark_hijacked();
        Ok(HijackConn::new(on_upgrade))
    }
}

impl Recycle for HttpContext {
    fn recycle(&mut self) {
        self.request.recycle();
        self.response.recycle();
        self.params.clear();
        self.route = None;
        self.server = None;
        self.items.clear();
        self.view_data.clear();
        self.session_id.clear();
        self.session = None;
        self.started_at = None;
        self.is_end = false;
        self.tier = MiddlewareTier::App;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use bytes::Bytes;
    use http_body_util::Full;

    use super::*;
    use crate::pool::Pools;
    use crate::router::Router;
    use crate::session::{RuntimeStore, SessionStore};

    #[test]
    fn released_context_matches_a_fresh_one() {
        let pools = Pools::new(4);
        let mut router = Router::new();
        let route = router
            .get("/user/:id", |_ctx| Box::pin(async { Ok(()) }))
            .route()
            .clone();

        let mut request = pools.requests.acquire();
        request.bind(
            hyper::Request::builder()
                .uri("/user/7?tab=1")
                .body(Full::new(Bytes::from_static(b"payload")))
                .unwrap(),
            0,
        );
        let mut params = pools.params.acquire();
        params.push("id", "7");

        let mut ctx = pools.contexts.acquire();
        ctx.attach(
            Arc::new(HttpServer::new()),
            request,
            pools.responses.acquire(),
            pools.params.acquire(),
        );
        ctx.set_route(route, params);
        ctx.set_session_id("sess-1".to_string());
        let store: Weak<dyn SessionStore> = Weak::<RuntimeStore>::new();
        ctx.session = Some(Arc::new(SessionState::new("sess-1", store)));
        ctx.items().set("user", 7_i64);
        ctx.set_view_data("title", &"home").unwrap();
        ctx.set_tier(MiddlewareTier::Route);
        ctx.write_string("body").unwrap();
        ctx.end();

        pools.contexts.release(ctx);
        assert_eq!(pools.stats().contexts, 1);

        let ctx = pools.contexts.acquire();
        let fresh = HttpContext::default();
        assert!(ctx.server().is_none());
        assert!(ctx.route().is_none());
        assert!(ctx.session.is_none());
        assert_eq!(ctx.session_id(), fresh.session_id());
        assert!(ctx.items().is_empty());
        assert_eq!(ctx.view_data(), fresh.view_data());
        assert_eq!(ctx.is_end(), fresh.is_end());
        assert_eq!(ctx.tier(), fresh.tier());
        assert!(ctx.params().is_empty());
        assert!(ctx.started_at().is_none());
        assert_eq!(ctx.request().uri(), fresh.request().uri());
        assert!(!ctx.response().is_committed());
        assert!(ctx.response().body().is_empty());
    }
}
