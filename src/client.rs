//! Thin client for the daemon socket.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::protocol::{decode_line, encode_line, Reply, Request};

/// Upper bound on one request/reply exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DaemonClient {
    socket: PathBuf,
    timeout: Duration,
}

impl DaemonClient {
    pub fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn send(&self, request: &Request) -> Result<Reply> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| {
                anyhow!(
                    "Timed out after {}s waiting for the daemon",
                    self.timeout.as_secs()
                )
            })?
    }

    async fn exchange(&self, request: &Request) -> Result<Reply> {
        let stream = UnixStream::connect(&self.socket).await.with_context(|| {
            format!(
                "Cannot connect to daemon at {} (is it running?)",
                self.socket.display()
            )
        })?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(encode_line(request)?.as_bytes())
            .await
            .context("Failed to send request")?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .context("Failed to read reply")?;
        if read == 0 {
            bail!("Daemon closed the connection without replying");
        }
        decode_line(&line)
    }
}

/// Turn an error reply into an `Err`.
pub fn expect_ok(reply: Reply) -> Result<Reply> {
    match reply {
        Reply::Error(e) => bail!("{}", e),
        other => Ok(other),
    }
}
