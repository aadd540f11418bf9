//! Raw connection takeover.

use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{DotwebError, Result};

/// Status line written in front of every blob sent on a hijacked stream.
pub const DEFAULT_HIJACK_HEADER: &str = "HTTP/1.1 200 OK\r\n";

/// Pending takeover, resolved once the `101` response left the server.
pub struct HijackConn {
    on_upgrade: OnUpgrade,
    header: String,
}

impl HijackConn {
    pub(crate) fn new(on_upgrade: OnUpgrade) -> Self {
        HijackConn {
            on_upgrade,
            header: DEFAULT_HIJACK_HEADER.to_string(),
        }
    }

    /// Override the header prefix used by the stream writers.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub async fn upgrade(self) -> Result<HijackedStream> {
        let upgraded = self
            .on_upgrade
            .await
            .map_err(|e| DotwebError::Internal(format!("connection upgrade failed: {e}")))?;
        Ok(HijackedStream {
            io: TokioIo::new(upgraded),
            header: self.header,
        })
    }
}

pub struct HijackedStream {
    io: TokioIo<Upgraded>,
    header: String,
}

impl HijackedStream {
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Write the header prefix, a blank line and `data`.
    pub async fn write_blob(&mut self, data: &[u8]) -> Result<usize> {
        let mut frame = Vec::with_capacity(self.header.len() + 2 + data.len());
        frame.extend_from_slice(self.header.as_bytes());
        frame.extend_from_slice(b"\r\n");
        frame.extend_from_slice(data);
        self.io.write_all(&frame).await?;
        self.io.flush().await?;
        Ok(frame.len())
    }

    pub async fn write_string(&mut self, content: &str) -> Result<usize> {
        self.write_blob(content.as_bytes()).await
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.io.read(buf).await?)
    }

    pub async fn close(mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }

    /// The raw upgraded stream.
    pub fn into_inner(self) -> TokioIo<Upgraded> {
        self.io
    }
}
