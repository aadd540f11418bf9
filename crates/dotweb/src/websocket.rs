//! WebSocket endpoints.
//!
//! Upgrade requests that match a WebSocket route are answered with the
//! handshake directly; the connection then runs on its own task and never
//! enters the middleware pipeline.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::http::{HeaderMap, HeaderValue, StatusCode, header};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;

use crate::error::{DotwebError, Result};
use crate::router::{Params, WebSocketRoute};

pub type WsStream = WebSocketStream<TokioIo<Upgraded>>;

pub struct WebSocket {
    stream: WsStream,
    path: String,
    query: String,
    params: Params,
    headers: HeaderMap,
}

impl WebSocket {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn param(&self, name: &str) -> &str {
        self.params.by_name(name)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query_string(&self, key: &str) -> String {
        serde_urlencoded::from_str::<Vec<(String, String)>>(&self.query)
            .unwrap_or_default()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .unwrap_or_default()
    }

    pub async fn send_message(&mut self, text: impl Into<String>) -> Result<()> {
        self.stream
            .send(Message::text(text.into()))
            .await
            .map_err(ws_error)
    }

    /// Next text message. Binary frames are decoded lossily; `None` means
    /// the peer closed the connection.
    pub async fn read_message(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message.map_err(ws_error)? {
                Message::Text(text) => return Ok(Some(text.as_str().to_string())),
                Message::Binary(data) => return Ok(Some(String::from_utf8_lossy(&data).into_owned())),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    pub fn stream_mut(&mut self) -> &mut WsStream {
        &mut self.stream
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await.map_err(ws_error)
    }
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> DotwebError {
    DotwebError::Internal(format!("websocket error: {err}"))
}

fn header_contains(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case(token))
}

pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    header_contains(headers, header::CONNECTION, "upgrade")
        && header_contains(headers, header::UPGRADE, "websocket")
}

fn bad_request(reason: &'static str) -> hyper::Response<Full<Bytes>> {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(reason.as_bytes())));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// Answer the handshake for `route` and spawn its handler on the upgraded
/// connection.
pub(crate) fn accept<B>(
    route: Arc<WebSocketRoute>,
    params: Params,
    mut req: hyper::Request<B>,
) -> hyper::Response<Full<Bytes>> {
    let Some(key) = req.headers().get(header::SEC_WEBSOCKET_KEY) else {
        return bad_request("missing Sec-WebSocket-Key");
    };
    if req
        .headers()
        .get(header::SEC_WEBSOCKET_VERSION)
        .is_none_or(|v| v != "13")
    {
        return bad_request("unsupported Sec-WebSocket-Version");
    }
    let accept_key = derive_accept_key(key.as_bytes());
    let on_upgrade = hyper::upgrade::on(&mut req);
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let headers = req.headers().clone();

    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "websocket upgrade failed");
                return;
            }
        };
        let stream = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        let ws = WebSocket {
            stream,
            path: path.clone(),
            query,
            params,
            headers,
        };
        if let Err(err) = (route.handle())(ws).await {
            tracing::warn!(path = %path, error = %err, "websocket handler failed");
        }
    });

    let mut response = hyper::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    if let Ok(value) = HeaderValue::from_str(&accept_key) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
    }
    response
}
