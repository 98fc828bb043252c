//! Error types surfaced by the SkyControl daemon.
//!
//! Validation errors are returned before any state is touched. Everything
//! that goes wrong after enforcement has started is reported either as
//! [`DaemonError::Enforcement`] (external tool failure, unverified clear)
//! or [`DaemonError::Internal`] (I/O and the rest).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Authorization failed (status {status})")]
    AuthorizationFailed { status: i32 },

    #[error("A block is already running")]
    BlockAlreadyRunning,

    #[error("Blocklist is empty or the end date is already in the past")]
    EmptyBlocklist,

    #[error("No block is running")]
    BlockNotRunning,

    #[error("Blocklist updates are not allowed while an allowlist block is running")]
    UpdateNotAllowedForAllowlist,

    #[error("New end date is earlier than the current end date")]
    EndDateEarlierThanCurrent,

    #[error("New end date extends the block too far in one step")]
    EndDateTooFarInFuture,

    #[error("Emergency unlock is rate limited, try again later")]
    UnlockRateLimited,

    #[error("Enforcement error: {0}")]
    Enforcement(String),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl DaemonError {
    /// Stable numeric code sent to clients.
    pub fn code(&self) -> i32 {
        match self {
            DaemonError::AuthorizationFailed { .. } => 401,
            DaemonError::BlockAlreadyRunning => 301,
            DaemonError::EmptyBlocklist => 302,
            DaemonError::BlockNotRunning => 304,
            DaemonError::UpdateNotAllowedForAllowlist => 305,
            DaemonError::EndDateEarlierThanCurrent => 308,
            DaemonError::EndDateTooFarInFuture => 309,
            DaemonError::UnlockRateLimited => 310,
            DaemonError::Enforcement(_) => 500,
            DaemonError::Internal(_) => 1,
        }
    }

    /// Short machine-readable kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            DaemonError::AuthorizationFailed { .. } => "AuthorizationFailed",
            DaemonError::BlockAlreadyRunning => "BlockAlreadyRunning",
            DaemonError::EmptyBlocklist => "EmptyBlocklist",
            DaemonError::BlockNotRunning => "BlockNotRunning",
            DaemonError::UpdateNotAllowedForAllowlist => "UpdateNotAllowedForAllowlist",
            DaemonError::EndDateEarlierThanCurrent => "EndDateEarlierThanCurrent",
            DaemonError::EndDateTooFarInFuture => "EndDateTooFarInFuture",
            DaemonError::UnlockRateLimited => "UnlockRateLimited",
            DaemonError::Enforcement(_) => "Enforcement",
            DaemonError::Internal(_) => "Unknown",
        }
    }

    pub fn to_reply(&self) -> ErrorReply {
        ErrorReply {
            code: self.code(),
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Wire form of a [`DaemonError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: i32,
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(DaemonError::BlockAlreadyRunning.code(), 301);
        assert_eq!(DaemonError::EmptyBlocklist.code(), 302);
        assert_eq!(DaemonError::BlockNotRunning.code(), 304);
        assert_eq!(DaemonError::UpdateNotAllowedForAllowlist.code(), 305);
        assert_eq!(DaemonError::EndDateEarlierThanCurrent.code(), 308);
        assert_eq!(DaemonError::EndDateTooFarInFuture.code(), 309);
        assert_eq!(DaemonError::UnlockRateLimited.code(), 310);
        assert_eq!(DaemonError::AuthorizationFailed { status: -60002 }.code(), 401);
    }

    #[test]
    fn test_authorization_message_only_carries_status() {
        let err = DaemonError::AuthorizationFailed { status: -60004 };
        assert_eq!(err.to_string(), "Authorization failed (status -60004)");
    }

    #[test]
    fn test_internal_wraps_anyhow_chain() {
        let inner = anyhow::anyhow!("disk full").context("Failed to write settings");
        let err: DaemonError = inner.into();
        let reply = err.to_reply();
        assert_eq!(reply.code, 1);
        assert_eq!(reply.kind, "Unknown");
        assert!(reply.message.contains("Failed to write settings"));
        assert!(reply.message.contains("disk full"));
    }

    #[test]
    fn test_reply_roundtrip_json() {
        let reply = DaemonError::UnlockRateLimited.to_reply();
        let json = serde_json::to_string(&reply).unwrap();
        let parsed: ErrorReply = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reply);
        assert_eq!(parsed.kind, "UnlockRateLimited");
    }
}
