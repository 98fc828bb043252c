//! Add command implementation: grow the running blocklist.

use anyhow::{bail, Result};
use std::path::Path;

use crate::auth::AuthCommand;
use crate::blocklist::clean_blocklist;
use crate::client::expect_ok;
use crate::protocol::Request;

/// Run the add command
pub async fn run(config_path: &Path, hosts: &[String]) -> Result<()> {
    let entries = clean_blocklist(hosts);
    if entries.is_empty() {
        bail!("No hosts given");
    }

    let config = super::load_config(config_path)?;
    let token = super::issue_token(&config, AuthCommand::UpdateBlocklist)?;
    let count = entries.len();

    let request = Request::UpdateBlocklist {
        blocklist: entries,
        token: Some(token),
    };
    expect_ok(super::client(&config).send(&request).await?)?;

    println!("[OK] Added {} entries to the running block", count);
    Ok(())
}
