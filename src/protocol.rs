//! Request/reply messages exchanged between clients and the daemon.
//!
//! One JSON document per line in each direction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ErrorReply;
use crate::settings::BlockSettings;

/// Longest request line the daemon will read.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    StartBlock {
        blocklist: Vec<String>,
        is_allowlist: bool,
        end_date: DateTime<Utc>,
        #[serde(default)]
        settings: BlockSettings,
        token: Option<String>,
    },
    UpdateBlocklist {
        blocklist: Vec<String>,
        token: Option<String>,
    },
    UpdateBlockEndDate {
        end_date: DateTime<Utc>,
        token: Option<String>,
    },
    ClearBlock {
        reason: Option<String>,
        token: Option<String>,
    },
    GetVersion,
    GetStatus,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::StartBlock { .. } => "startBlock",
            Request::UpdateBlocklist { .. } => "updateBlocklist",
            Request::UpdateBlockEndDate { .. } => "updateBlockEndDate",
            Request::ClearBlock { .. } => "clearBlock",
            Request::GetVersion => "getVersion",
            Request::GetStatus => "getStatus",
        }
    }
}

/// Read-only snapshot of the block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    pub is_allowlist: bool,
    pub end_date: DateTime<Utc>,
    pub blocklist: Vec<String>,
    pub tampering_detected: bool,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    Version(String),
    Status(StatusReport),
    Error(ErrorReply),
}

/// Identity of the process on the other end of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "uid={} gid={} pid={}", self.uid, self.gid, pid),
            None => write!(f, "uid={} gid={}", self.uid, self.gid),
        }
    }
}

/// Serialize `msg` as a single newline-terminated line.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String> {
    let mut line = serde_json::to_string(msg).context("Failed to encode message")?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim_end()).context("Failed to decode message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_wire_shape() {
        let req = Request::ClearBlock {
            reason: Some("deadline".into()),
            token: None,
        };
        let line = encode_line(&req).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["command"], "clear_block");
        assert_eq!(value["reason"], "deadline");
        assert_eq!(decode_line::<Request>(&line).unwrap(), req);
    }

    #[test]
    fn test_start_request_settings_default() {
        let line = r#"{"command":"start_block","blocklist":["a.com"],"is_allowlist":false,"end_date":"2026-01-01T00:00:00Z","token":"t"}"#;
        let req: Request = decode_line(line).unwrap();
        match req {
            Request::StartBlock { settings, end_date, .. } => {
                assert_eq!(settings, BlockSettings::default());
                assert_eq!(end_date, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reply_variants() {
        let ok: Reply = decode_line(&encode_line(&Reply::Ok).unwrap()).unwrap();
        assert_eq!(ok, Reply::Ok);

        let version = encode_line(&Reply::Version("1.0.0".into())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&version).unwrap();
        assert_eq!(value["status"], "version");
        assert_eq!(value["data"], "1.0.0");
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_line::<Request>("{\"command\":\"format_disk\"}").is_err());
        assert!(decode_line::<Request>("not json").is_err());
    }
}
