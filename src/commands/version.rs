//! Version command implementation.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use crate::protocol::{Reply, Request};

/// Print the client version and, if reachable, the daemon's.
pub async fn run(config_path: &Path) -> Result<()> {
    println!("skycontrol {}", env!("CARGO_PKG_VERSION"));

    let config = super::load_config(config_path).unwrap_or_default();
    let client = super::client(&config).with_timeout(Duration::from_secs(2));
    match client.send(&Request::GetVersion).await {
        Ok(Reply::Version(v)) => println!("daemon {}", v),
        Ok(_) | Err(_) => println!("daemon not reachable"),
    }
    Ok(())
}
