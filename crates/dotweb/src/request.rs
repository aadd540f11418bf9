//! Request wrapper handed to handlers through [`HttpContext`](crate::HttpContext).

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Limited};
use hyper::http::{Extensions, HeaderMap, Method, Uri, Version, header};
use parking_lot::Mutex;

use crate::error::{BoxError, DotwebError, Result};
use crate::multipart::{Multipart, boundary_from_content_type};
use crate::pool::Recycle;

pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

pub const MIME_APPLICATION_JSON: &str = "application/json";
pub const MIME_APPLICATION_XML: &str = "application/xml";
pub const MIME_TEXT_XML: &str = "text/xml";
pub const MIME_APPLICATION_FORM: &str = "application/x-www-form-urlencoded";
pub const MIME_MULTIPART_FORM: &str = "multipart/form-data";

/// Peer address of the connection, inserted by the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Collects a boxed body behind a concrete, non-generic future, so handler
/// futures that await it satisfy the `for<'a>` bound of `HttpHandle`.
fn collect_body(body: RequestBody, limit: usize) -> BoxFuture<'static, Result<Bytes>> {
    // Apply the limit outside the async block; the `Limited` body bound is
    // otherwise checked with erased lifetimes and fails to be general enough.
    let body: RequestBody = if limit > 0 {
        Limited::new(body, limit).boxed_unsync()
    } else {
        body
    };
    Box::pin(async move {
        let collected = body.collect().await;
        collected
            .map(|c| c.to_bytes())
            .map_err(|e| DotwebError::Bind(format!("failed to read request body: {e}")))
    })
}

#[derive(Default)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
    remote_addr: Option<SocketAddr>,
    // The mutex only exists so the context stays `Sync`; it is never contended.
    body: Mutex<Option<RequestBody>>,
    post_body: Option<Bytes>,
    max_body_size: usize,
}

impl Request {
    /// Load an incoming request into this (pooled) wrapper.
    pub fn bind<B>(&mut self, req: hyper::Request<B>, max_body_size: usize)
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        self.method = parts.method;
        self.uri = parts.uri;
        self.version = parts.version;
        self.headers = parts.headers;
        self.extensions = parts.extensions;
        self.remote_addr = self.extensions.get::<RemoteAddr>().map(|addr| addr.0);
        *self.body.get_mut() = Some(body.map_err(Into::into).boxed_unsync());
        self.post_body = None;
        self.max_body_size = max_body_size;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string without the leading `?`.
    pub fn raw_query(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    /// Path plus query, as sent by the client.
    pub fn url(&self) -> String {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| self.uri.path().to_string())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn proto(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "HTTP/1.1",
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Header value as text, or `""` when absent or not valid UTF-8.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> String {
        let raw = self.header(header::CONTENT_TYPE.as_str());
        raw.split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    pub fn content_length(&self) -> u64 {
        self.header(header::CONTENT_LENGTH.as_str())
            .parse()
            .unwrap_or(0)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn remote_ip(&self) -> String {
        self.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }

    /// Client address honoring `X-Real-IP` and `X-Forwarded-For`.
    pub fn real_ip(&self) -> String {
        let real = self.header("x-real-ip");
        if !real.is_empty() {
            return real.to_string();
        }
        let forwarded = self.header("x-forwarded-for");
        if let Some(first) = forwarded.split(',').next().map(str::trim)
            && !first.is_empty()
        {
            return first.to_string();
        }
        self.remote_ip()
    }

    pub fn referer(&self) -> &str {
        self.header(header::REFERER.as_str())
    }

    pub fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT.as_str())
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .eq_ignore_ascii_case("XMLHttpRequest")
    }

    pub fn is_websocket(&self) -> bool {
        crate::websocket::is_upgrade_request(&self.headers)
    }

    /// All query pairs in order of appearance.
    pub fn query_strings(&self) -> Vec<(String, String)> {
        serde_urlencoded::from_str(self.raw_query()).unwrap_or_default()
    }

    /// First value of `key` in the query string, or `""`.
    pub fn query_string(&self, key: &str) -> String {
        first_value(&self.query_strings(), key)
    }

    pub fn has_body(&self) -> bool {
        self.post_body.as_ref().is_some_and(|b| !b.is_empty())
            || self.body.lock().as_ref().is_some_and(|b| !b.is_end_stream())
    }

    /// Take the raw body stream for incremental reading.
    ///
    /// Returns `None` when the body was already consumed, either by an
    /// earlier call or by [`post_body`](Self::post_body).
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.get_mut().take()
    }

    /// Read the whole body, honoring the configured size limit.
    ///
    /// The bytes are cached, so calling this repeatedly (or binding after
    /// reading) returns the same content.
    pub async fn post_body(&mut self) -> Result<Bytes> {
        if let Some(body) = &self.post_body {
            return Ok(body.clone());
        }
        let bytes = match self.body.get_mut().take() {
            Some(body) => collect_body(body, self.max_body_size).await?,
            None => Bytes::new(),
        };
        self.post_body = Some(bytes.clone());
        Ok(bytes)
    }

    /// Form fields carried in the body: urlencoded pairs or the text parts
    /// of a multipart payload.
    pub async fn post_form(&mut self) -> Result<Vec<(String, String)>> {
        let content_type = self.content_type();
        if content_type == MIME_APPLICATION_FORM {
            let body = self.post_body().await?;
            return serde_urlencoded::from_bytes(&body)
                .map_err(|e| DotwebError::Bind(format!("invalid form body: {e}")));
        }
        if content_type == MIME_MULTIPART_FORM {
            let boundary = boundary_from_content_type(self.header(header::CONTENT_TYPE.as_str()))
                .ok_or_else(|| DotwebError::Bind("multipart body without boundary".into()))?;
            let body = self.post_body().await?;
            let fields = Multipart::new(&body, &boundary)
                .filter(|part| part.filename.is_none())
                .map(|part| {
                    (
                        part.name.to_string(),
                        String::from_utf8_lossy(part.body).into_owned(),
                    )
                })
                .collect();
            return Ok(fields);
        }
        Ok(Vec::new())
    }

    /// First value of `key` in the body form, or `""`.
    pub async fn post_form_value(&mut self, key: &str) -> Result<String> {
        Ok(first_value(&self.post_form().await?, key))
    }

    /// First value of `key`, looking at the body form before the query.
    pub async fn form_value(&mut self, key: &str) -> Result<String> {
        let form = self.post_form().await?;
        if form.iter().any(|(k, _)| k == key) {
            return Ok(first_value(&form, key));
        }
        Ok(self.query_string(key))
    }

    /// Body form pairs followed by query pairs.
    pub async fn form(&mut self) -> Result<Vec<(String, String)>> {
        let mut pairs = self.post_form().await?;
        pairs.extend(self.query_strings());
        Ok(pairs)
    }
}

impl Recycle for Request {
    fn recycle(&mut self) {
        self.method = Method::GET;
        self.uri = Uri::default();
        self.version = Version::default();
        self.headers.clear();
        self.extensions.clear();
        self.remote_addr = None;
        *self.body.get_mut() = None;
        self.post_body = None;
        self.max_body_size = 0;
    }
}

fn first_value(pairs: &[(String, String)], key: &str) -> String {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn request(uri: &str, content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = hyper::Request::builder().method(Method::POST).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        let raw = builder.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap();
        let mut req = Request::default();
        req.bind(raw, 0);
        req
    }

    #[tokio::test]
    async fn body_is_cached_after_first_read() {
        let mut req = request("/echo", Some("text/plain"), "hello");
        assert_eq!(req.post_body().await.unwrap(), "hello");
        assert_eq!(req.post_body().await.unwrap(), "hello");
        assert!(req.take_body().is_none());
    }

    #[tokio::test]
    async fn form_value_prefers_body_over_query() {
        let mut req = request(
            "/login?user=query&page=2",
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            "user=body",
        );
        assert_eq!(req.form_value("user").await.unwrap(), "body");
        assert_eq!(req.form_value("page").await.unwrap(), "2");
        assert_eq!(req.post_form_value("page").await.unwrap(), "");
        assert_eq!(req.query_string("user"), "query");
    }

    #[tokio::test]
    async fn body_limit_is_enforced() {
        let raw = hyper::Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .body(Full::new(Bytes::from_static(b"0123456789")))
            .unwrap();
        let mut req = Request::default();
        req.bind(raw, 4);
        assert!(matches!(req.post_body().await, Err(DotwebError::Bind(_))));
    }

    #[test]
    fn real_ip_prefers_proxy_headers() {
        let raw = hyper::Request::builder()
            .uri("/")
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let mut req = Request::default();
        req.bind(raw, 0);
        assert_eq!(req.real_ip(), "10.0.0.1");
    }

    #[test]
    fn recycle_wipes_everything() {
        let mut req = request("/a?b=c", Some("text/plain"), "x");
        req.recycle();
        assert_eq!(req.path(), "/");
        assert!(req.headers().is_empty());
        assert_eq!(req.raw_query(), "");
        assert!(!req.has_body());
    }
}
