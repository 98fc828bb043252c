//! Start command implementation.

use anyhow::{bail, Result};
use chrono::{Duration, Local, Utc};
use std::path::Path;

use crate::auth::AuthCommand;
use crate::blocklist::clean_blocklist;
use crate::client::expect_ok;
use crate::protocol::Request;
use crate::settings::BlockSettings;
use crate::validation::validate_block_minutes;

/// Run the start command
pub async fn run(
    config_path: &Path,
    minutes: u64,
    allowlist: bool,
    blocks: &[String],
    blocklist: Option<&str>,
) -> Result<()> {
    validate_block_minutes(minutes)?;

    let mut raw: Vec<String> = blocks.to_vec();
    if let Some(list) = blocklist {
        raw.extend(list.split(',').map(str::to_string));
    }
    let entries = clean_blocklist(&raw);
    if entries.is_empty() && !allowlist {
        bail!("Nothing to block. Pass --block or --blocklist.");
    }

    let config = super::load_config(config_path)?;
    let token = super::issue_token(&config, AuthCommand::StartBlock)?;

    let end_date = Utc::now() + Duration::minutes(minutes as i64);
    let count = entries.len();
    let request = Request::StartBlock {
        blocklist: entries,
        is_allowlist: allowlist,
        end_date,
        settings: BlockSettings::default(),
        token: Some(token),
    };

    expect_ok(super::client(&config).send(&request).await?)?;

    println!(
        "[OK] {} started with {} entries until {}",
        if allowlist { "Allowlist" } else { "Block" },
        count,
        end_date.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}
