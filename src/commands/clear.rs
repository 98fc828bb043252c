//! Clear command implementation (emergency unlock).

use anyhow::Result;
use std::path::Path;

use crate::auth::AuthCommand;
use crate::client::expect_ok;
use crate::protocol::Request;

/// Run the clear command
pub async fn run(config_path: &Path, reason: Option<String>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let token = super::issue_token(&config, AuthCommand::ClearBlock)?;

    let request = Request::ClearBlock {
        reason,
        token: Some(token),
    };
    expect_ok(super::client(&config).send(&request).await?)?;

    println!("[OK] Block cleared");
    Ok(())
}
