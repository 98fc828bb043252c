//! Extend command implementation.

use anyhow::{bail, Result};
use chrono::{Duration, Local};
use std::path::Path;

use crate::auth::AuthCommand;
use crate::client::expect_ok;
use crate::protocol::{Reply, Request};

/// Run the extend command: push the end date `minutes` past the current one.
pub async fn run(config_path: &Path, minutes: u64) -> Result<()> {
    if minutes == 0 {
        bail!("Extension must be at least one minute");
    }

    let config = super::load_config(config_path)?;
    let client = super::client(&config);

    let current = match expect_ok(client.send(&Request::GetStatus).await?)? {
        Reply::Status(status) if status.running => status.end_date,
        Reply::Status(_) => bail!("No block is running"),
        other => bail!("Unexpected reply from daemon: {:?}", other),
    };

    let end_date = current + Duration::minutes(minutes as i64);
    let token = super::issue_token(&config, AuthCommand::UpdateBlockEndDate)?;
    let request = Request::UpdateBlockEndDate {
        end_date,
        token: Some(token),
    };
    expect_ok(client.send(&request).await?)?;

    println!(
        "[OK] Block extended until {}",
        end_date.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}
