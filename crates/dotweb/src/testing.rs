//! Test harness: run a server on a random port and talk to it over HTTP, or
//! push requests straight through [`HttpServer::serve_http`].
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn test_index() {
//!     let mut server = HttpServer::new();
//!     server.get("/", |ctx| Box::pin(async move {
//!         ctx.write_string("index")?;
//!         Ok(())
//!     }));
//!     let app = TestApp::start(server).await;
//!     let res = app.client.get(&app.url("/")).await;
//!     assert_eq!(res.status, 200);
//!     assert_eq!(res.body, "index");
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::http::{HeaderMap, Method, header};
use tokio::net::TcpListener;

use crate::request::RemoteAddr;
use crate::server::HttpServer;

/// A started server listening on `127.0.0.1` with an OS-assigned port.
///
/// Dropping the app requests shutdown.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: TestClient,
    pub server: Arc<HttpServer>,
}

impl TestApp {
    pub async fn start(server: HttpServer) -> Self {
        let server = server.start().await.expect("Failed to start test server");
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let serving = server.clone();
        tokio::spawn(async move {
            serving.serve(listener).await.expect("test server failed");
        });

        TestApp {
            addr,
            client: TestClient::new(addr),
            server,
        }
    }

    /// Get the full URL for `path` on the test server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// A small HTTP client that never follows redirects, so tests can assert on
/// `301`/`302`/`307` responses.
#[derive(Clone)]
pub struct TestClient {
    inner: reqwest::Client,
    base_addr: SocketAddr,
}

impl TestClient {
    pub fn new(addr: SocketAddr) -> Self {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build test client");
        TestClient {
            inner,
            base_addr: addr,
        }
    }

    pub async fn get(&self, url: &str) -> TestResponse {
        self.send(self.inner.get(url)).await
    }

    pub async fn get_with_headers(&self, url: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = self.inner.get(url);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder).await
    }

    /// POST a JSON body.
    pub async fn post(&self, url: &str, body: &str) -> TestResponse {
        self.post_with_type(url, "application/json", body).await
    }

    pub async fn post_with_type(&self, url: &str, content_type: &str, body: &str) -> TestResponse {
        let builder = self
            .inner
            .post(url)
            .header("Content-Type", content_type)
            .body(body.to_string());
        self.send(builder).await
    }

    /// Send an arbitrary method with no body.
    pub async fn request(&self, method: Method, url: &str) -> TestResponse {
        self.send(self.inner.request(method, url)).await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.base_addr)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> TestResponse {
        let res = builder.send().await.expect("request failed");
        TestResponse::from_response(res).await
    }
}

/// A simplified HTTP response for test assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let body = res.text().await.unwrap_or_default();
        TestResponse {
            status,
            body,
            headers,
        }
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Failed to parse response as JSON")
    }

    /// A header value, or `""` when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// Build a bodyless request for [`call`].
pub fn request(method: Method, uri: &str) -> hyper::Request<Full<Bytes>> {
    hyper::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::default())
        .expect("invalid test request")
}

/// Build a request with `body` and a `Content-Type` for [`call`].
pub fn request_with_body(
    method: Method,
    uri: &str,
    content_type: &str,
    body: impl Into<Bytes>,
) -> hyper::Request<Full<Bytes>> {
    hyper::Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Full::new(body.into()))
        .expect("invalid test request")
}

/// Dispatch `req` through `server` without a socket.
pub async fn call(server: &Arc<HttpServer>, mut req: hyper::Request<Full<Bytes>>) -> TestResponse {
    if req.extensions().get::<RemoteAddr>().is_none() {
        req.extensions_mut()
            .insert(RemoteAddr(SocketAddr::from(([127, 0, 0, 1], 0))));
    }
    let res = server.serve_http(req).await;
    let status = res.status().as_u16();
    let (parts, body) = res.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };
    let body = match parts.headers.get(header::CONTENT_ENCODING) {
        Some(encoding) if encoding == "gzip" => gunzip(&bytes),
        _ => String::from_utf8_lossy(&bytes).into_owned(),
    };
    TestResponse {
        status,
        body,
        headers: parts.headers,
    }
}

fn gunzip(bytes: &[u8]) -> String {
    use std::io::Read;

    let mut decoded = String::new();
    flate2::read::GzDecoder::new(bytes)
        .read_to_string(&mut decoded)
        .expect("invalid gzip body");
    decoded
}
