//! Daemon command: run the privileged block daemon.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{AuthCommand, TokenAuthority};
use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::DaemonConfig;
use crate::daemon::{bind_socket, serve};
use crate::dns::SystemResolver;
use crate::enforcer::check_root;
use crate::fs_abstraction::{FileSystem, RealFileSystem};
use crate::lock::LockGuard;
use crate::processor::{CommandProcessor, VERSION};
use crate::signal::{install_handlers, ShutdownToken};

/// Run the daemon command
pub async fn run(config_path: &Path, print_config: bool) -> Result<()> {
    if print_config {
        print!("{}", DaemonConfig::generate_default_yaml());
        return Ok(());
    }

    check_root()?;
    let config = super::load_config(config_path)?;
    let _lock = LockGuard::acquire(&config.paths.lock_file)?;

    info!("Starting skycontrol daemon {}", VERSION);

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let authority = TokenAuthority::from_config(&config, Arc::clone(&fs));
    authority.ensure_key()?;
    for command in AuthCommand::ALL {
        authority.rights().ensure_registered(command)?;
    }

    let processor = CommandProcessor::new(
        config.clone(),
        Arc::new(authority),
        Arc::new(RealCommandExecutor),
        fs,
        Arc::new(SystemResolver),
    );

    let listener = bind_socket(&config.paths.socket)?;
    let shutdown = ShutdownToken::new();
    install_handlers(shutdown.clone());

    serve(
        listener,
        processor,
        Duration::from_secs(config.daemon.checkup_interval_secs),
        shutdown,
    )
    .await?;

    if let Err(e) = std::fs::remove_file(&config.paths.socket) {
        tracing::debug!("Could not remove socket: {}", e);
    }
    info!("Daemon stopped");
    Ok(())
}
