//! Status command implementation.

use anyhow::{bail, Result};
use chrono::{Local, Utc};
use std::path::Path;

use crate::client::expect_ok;
use crate::protocol::{Reply, Request, StatusReport};
use crate::utils::{format_remaining, truncate};

const MAX_SHOWN: usize = 20;

/// Run the status command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    let reply = expect_ok(super::client(&config).send(&Request::GetStatus).await?)?;

    match reply {
        Reply::Status(status) => print_status(&status),
        other => bail!("Unexpected reply from daemon: {:?}", other),
    }
    Ok(())
}

fn print_status(status: &StatusReport) {
    println!();
    if !status.running {
        println!("SkyControl: NO BLOCK RUNNING");
        println!("Daemon: {}", status.version);
        println!();
        return;
    }

    let mode = if status.is_allowlist { "allowlist" } else { "blocklist" };
    println!("SkyControl: BLOCK RUNNING ({})", mode);
    println!(
        "Ends: {} ({} left)",
        status.end_date.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        format_remaining(status.end_date - Utc::now())
    );
    if status.tampering_detected {
        println!("Tampering detected: block was re-applied");
    }
    println!("Daemon: {}", status.version);
    println!();

    println!("Entries ({}):", status.blocklist.len());
    for entry in status.blocklist.iter().take(MAX_SHOWN) {
        println!("  {}", truncate(entry, 60));
    }
    if status.blocklist.len() > MAX_SHOWN {
        println!("  ... and {} more", status.blocklist.len() - MAX_SHOWN);
    }
    println!();
}
