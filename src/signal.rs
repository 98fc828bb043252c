//! Signal handling for graceful daemon shutdown.
//!
//! SIGINT and SIGTERM stop the accept loop. A command that is already
//! mutating state is not interrupted; it runs to completion first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{info, warn};

/// A token that can be shared across tasks to check for and await shutdown.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown and wake every waiter.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once [`Self::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Spawns a task that cancels `token` on SIGINT or SIGTERM.
///
/// If signal handlers cannot be registered (e.g., in restricted environments),
/// signal handling is disabled and only an explicit cancel stops the daemon.
pub fn install_handlers(token: ShutdownToken) {
    tokio::spawn(async move {
        let sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGINT handler: {}", e);
                None
            }
        };

        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                None
            }
        };

        match (sigint, sigterm) {
            (Some(mut int), Some(mut term)) => {
                tokio::select! {
                    _ = int.recv() => info!("Received SIGINT, shutting down"),
                    _ = term.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            (Some(mut int), None) => {
                int.recv().await;
                info!("Received SIGINT, shutting down");
            }
            (None, Some(mut term)) => {
                term.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            (None, None) => {
                warn!("No signal handlers registered - graceful shutdown disabled");
                return;
            }
        }
        token.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_token() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_shutdown_token_clone_shares_state() {
        let token1 = ShutdownToken::new();
        let token2 = token1.clone();
        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = ShutdownToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = ShutdownToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("should not block");
    }
}
