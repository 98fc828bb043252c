//! # SkyControl - time-boxed website and network blocker
//!
//! A privileged daemon blocks (or, in allowlist mode, exclusively allows)
//! a set of hosts, IPs and ports until a fixed end time, and refuses to be
//! switched off early except through a rate-limited emergency unlock.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SkyControl                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: daemon, start, add, extend, clear, status  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport (tokio Unix socket, newline-delimited JSON)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CommandProcessor (state machine, one mutation at a time)   │
//! │    ├── Authorization gate (HMAC tokens per right)           │
//! │    ├── Settings store (per-machine JSON record)             │
//! │    └── Emergency unlock policy + audit log                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BlockManager (enforcement orchestrator)                    │
//! │    ├── PfController (anchor file, pf.conf, pfctl)           │
//! │    └── HostFileBlockerSet (/etc/hosts + VPN copies)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use skycontrol::blocklist::{normalize, parse_entry};
//!
//! let tokens = normalize("https://user@Example.com:8080/path");
//! assert_eq!(tokens, vec!["example.com:8080"]);
//!
//! let entry = parse_entry(&tokens[0]).unwrap();
//! assert_eq!(entry.hostname, "example.com");
//! assert_eq!(entry.port, 8080);
//! ```
//!
//! ## Modules
//!
//! - [`auth`] - Per-command rights and token verification
//! - [`block_manager`] - Enforcement orchestrator
//! - [`blocklist`] - Entry normalization and parsing
//! - [`cli`] - Command-line interface definitions
//! - [`client`] - Daemon socket client
//! - [`commands`] - CLI command implementations
//! - [`config`] - Daemon configuration
//! - [`daemon`] - Socket server and periodic checkup
//! - [`dns`] - Hostname resolution
//! - [`enforcer`] - Packet-filter backend
//! - [`hosts`] - Hosts-file enforcement
//! - [`lock`] - Single-instance lock file
//! - [`processor`] - Command state machine
//! - [`protocol`] - Wire messages
//! - [`related`] - Related-entry expansion
//! - [`settings`] - Persistent block state
//! - [`signal`] - Graceful shutdown signal handling
//! - [`unlock`] - Emergency unlock policy and audit trail
//! - [`utils`] - Output formatting helpers

pub mod auth;
pub mod block_manager;
pub mod blocklist;
pub mod cli;
pub mod client;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod dns;
pub mod enforcer;
pub mod error;
pub mod fs_abstraction;
pub mod hosts;
pub mod lock;
pub mod processor;
pub mod protocol;
pub mod related;
pub mod settings;
pub mod signal;
pub mod unlock;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::DaemonConfig;
pub use error::{DaemonError, ErrorReply};
pub use processor::{CheckupOutcome, CommandProcessor};
