//! Unix-socket server around the [`CommandProcessor`].
//!
//! Each connection is served on its own task. Commands that touch block
//! state take the processor lock and run on the blocking pool; version
//! queries skip the lock.

use anyhow::{Context, Result};
use chrono::Utc;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::DaemonError;
use crate::processor::{CheckupOutcome, CommandProcessor, VERSION};
use crate::protocol::{decode_line, encode_line, Caller, Reply, Request, MAX_LINE_LEN};
use crate::signal::ShutdownToken;

pub type SharedProcessor = Arc<Mutex<CommandProcessor>>;

/// Remove a stale socket, bind, and open it to unprivileged clients.
pub fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(listener)
}

/// Accept connections and run periodic checkups until `shutdown` fires.
pub async fn serve(
    listener: UnixListener,
    processor: CommandProcessor,
    checkup_interval: Duration,
    shutdown: ShutdownToken,
) -> Result<()> {
    let processor: SharedProcessor = Arc::new(Mutex::new(processor));
    let mut ticker = tokio::time::interval(checkup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Daemon {} listening", VERSION);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutting down accept loop");
                break;
            }
            _ = ticker.tick() => {
                tokio::spawn(run_checkup(Arc::clone(&processor)));
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let processor = Arc::clone(&processor);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, processor).await {
                            warn!("Connection error: {:#}", e);
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
        }
    }

    // Let an in-flight mutation finish before returning
    let _idle = processor.lock().await;
    Ok(())
}

async fn run_checkup(processor: SharedProcessor) {
    let guard = processor.lock_owned().await;
    let outcome = tokio::task::spawn_blocking(move || {
        let mut processor = guard;
        processor.checkup(Utc::now())
    })
    .await;

    match outcome {
        Ok(Ok(CheckupOutcome::Idle)) | Ok(Ok(CheckupOutcome::Running)) => {}
        Ok(Ok(other)) => info!("Checkup: {:?}", other),
        Ok(Err(e)) => error!("Checkup failed: {}", e),
        Err(e) => error!("Checkup task panicked: {}", e),
    }
}

fn caller_of(stream: &UnixStream) -> Result<Caller> {
    let cred = stream.peer_cred().context("Failed to read peer credentials")?;
    Ok(Caller {
        uid: cred.uid(),
        gid: cred.gid(),
        pid: cred.pid(),
    })
}

async fn serve_connection(stream: UnixStream, processor: SharedProcessor) -> Result<()> {
    let caller = caller_of(&stream)?;
    debug!("Connection from {}", caller);

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut line = String::new();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_line(&mut line)
            .await
            .context("Failed to read request")?;
        if read == 0 {
            return Ok(());
        }

        if line.len() > MAX_LINE_LEN {
            let reply = Reply::Error(
                DaemonError::Internal(anyhow::anyhow!("Request too large")).to_reply(),
            );
            write_half.write_all(encode_line(&reply)?.as_bytes()).await?;
            return Ok(());
        }

        let reply = match decode_line::<Request>(&line) {
            Ok(request) => dispatch(request, caller, &processor).await,
            Err(e) => {
                warn!("Bad request from {}: {:#}", caller, e);
                Reply::Error(DaemonError::Internal(e).to_reply())
            }
        };

        write_half
            .write_all(encode_line(&reply)?.as_bytes())
            .await
            .context("Failed to write reply")?;
    }
}

async fn dispatch(request: Request, caller: Caller, processor: &SharedProcessor) -> Reply {
    if let Request::GetVersion = request {
        return Reply::Version(VERSION.to_string());
    }

    let guard = Arc::clone(processor).lock_owned().await;
    let result = tokio::task::spawn_blocking(move || {
        let mut processor = guard;
        processor.handle(request, &caller)
    })
    .await;

    result.unwrap_or_else(|e| {
        error!("Command task panicked: {}", e);
        Reply::Error(DaemonError::Internal(anyhow::anyhow!("Command aborted")).to_reply())
    })
}
