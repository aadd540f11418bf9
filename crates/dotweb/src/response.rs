//! Buffered response writer.
//!
//! The status line is committed by the first `write_header` or the first
//! body write; after that the status can no longer change. The server turns
//! the buffered state into a hyper response once the pipeline finishes.

use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::GzEncoder;
use http_body_util::Full;
use hyper::http::header::{self, HeaderName, HeaderValue};
use hyper::http::{HeaderMap, StatusCode};

use crate::error::{DotwebError, Result};
use crate::pool::Recycle;

#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    committed: bool,
    hijacked: bool,
    headers: HeaderMap,
    body: BytesMut,
    size: u64,
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| DotwebError::Internal(format!("invalid header name '{name}': {e}")))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| DotwebError::Internal(format!("invalid header value '{value}': {e}")))
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Replace every value of `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.insert(header_name(name)?, header_value(value)?);
        Ok(())
    }

    /// Append `value` to the values of `name`.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.append(header_name(name)?, header_value(value)?);
        Ok(())
    }

    pub fn del_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    pub fn set_content_type(&mut self, content_type: &'static str) {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    /// Commit the status line. Fails when it was already committed.
    pub fn write_header(&mut self, code: StatusCode) -> Result<()> {
        if self.committed {
            return Err(DotwebError::HeaderAlreadyCommitted);
        }
        self.status = code;
        self.committed = true;
        Ok(())
    }

    /// Append to the body, committing a 200 status first if nothing was
    /// committed yet. Writes after a hijack are dropped.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.hijacked {
            return 0;
        }
        if !self.committed {
            self.status = StatusCode::OK;
            self.committed = true;
        }
        self.body.extend_from_slice(data);
        self.size += data.len() as u64;
        data.len()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Bytes written to the body so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn mark_hijacked(&mut self) {
        self.hijacked = true;
    }

    /// Drop whatever was produced so far so an error response can be written.
    pub(crate) fn discard(&mut self) {
        self.status = StatusCode::OK;
        self.committed = false;
        self.body.clear();
        self.size = 0;
        self.headers.remove(header::CONTENT_TYPE);
        self.headers.remove(header::CONTENT_ENCODING);
    }

    /// Gzip the buffered body in place.
    pub(crate) fn gzip(&mut self) -> Result<()> {
        if self.body.is_empty()
            || self.hijacked
            || self.headers.contains_key(header::CONTENT_ENCODING)
        {
            return Ok(());
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(self.body.len() / 2), Compression::default());
        encoder.write_all(&self.body)?;
        let compressed = encoder.finish()?;
        self.body.clear();
        self.body.extend_from_slice(&compressed);
        self.headers
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        self.headers
            .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        self.headers.remove(header::CONTENT_LENGTH);
        Ok(())
    }

    /// Move the buffered state into a hyper response, leaving this wrapper
    /// empty.
    pub(crate) fn take_http(&mut self) -> hyper::Response<Full<Bytes>> {
        let body = self.body.split().freeze();
        let mut response = hyper::Response::new(Full::new(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        response
    }
}

impl Recycle for Response {
    fn recycle(&mut self) {
        self.status = StatusCode::OK;
        self.committed = false;
        self.hijacked = false;
        self.headers.clear();
        self.body.clear();
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_commits_ok() {
        let mut resp = Response::default();
        assert_eq!(resp.write(b"hi"), 2);
        assert!(resp.is_committed());
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(matches!(
            resp.write_header(StatusCode::NOT_FOUND),
            Err(DotwebError::HeaderAlreadyCommitted)
        ));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn explicit_status_then_body() {
        let mut resp = Response::default();
        resp.write_header(StatusCode::CREATED).unwrap();
        resp.write(b"made");
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.body(), b"made");
        assert_eq!(resp.size(), 4);
    }

    #[test]
    fn gzip_sets_encoding() {
        let mut resp = Response::default();
        resp.write("a".repeat(512).as_bytes());
        resp.gzip().unwrap();
        assert_eq!(resp.header("content-encoding"), "gzip");
        assert!(resp.body().len() < 512);
    }

    #[test]
    fn take_http_moves_state() {
        let mut resp = Response::default();
        resp.set_header("X-Trace", "abc").unwrap();
        resp.write_header(StatusCode::ACCEPTED).unwrap();
        let http = resp.take_http();
        assert_eq!(http.status(), StatusCode::ACCEPTED);
        assert_eq!(http.headers()["x-trace"], "abc");
        assert!(resp.headers().is_empty());
    }
}
