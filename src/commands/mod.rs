//! CLI command implementations.

pub mod add;
pub mod clear;
pub mod daemon;
pub mod extend;
pub mod start;
pub mod status;
pub mod version;

use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use crate::auth::{AuthCommand, TokenAuthority};
use crate::client::DaemonClient;
use crate::config::DaemonConfig;
use crate::fs_abstraction::RealFileSystem;
use std::sync::Arc;

fn load_config(config_path: &Path) -> Result<DaemonConfig> {
    DaemonConfig::load_or_default(config_path)
}

fn client(config: &DaemonConfig) -> DaemonClient {
    DaemonClient::new(&config.paths.socket)
}

/// Mint a token for `command`. Needs read access to the daemon key.
fn issue_token(config: &DaemonConfig, command: AuthCommand) -> Result<String> {
    let authority = TokenAuthority::from_config(config, Arc::new(RealFileSystem));
    authority.issue(command, Utc::now())
}
