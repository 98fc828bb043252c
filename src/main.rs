//! SkyControl - time-boxed website and network blocker.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use skycontrol::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false);

    // The daemon's log is read after the fact, so it keeps timestamps
    if matches!(cli.command, Commands::Daemon { .. }) {
        tracing::subscriber::set_global_default(builder.finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())?;
    }

    match cli.command {
        Commands::Daemon { print_config } => {
            skycontrol::commands::daemon::run(&cli.config, print_config).await
        }
        Commands::Start {
            minutes,
            allowlist,
            blocks,
            blocklist,
        } => {
            skycontrol::commands::start::run(
                &cli.config,
                minutes,
                allowlist,
                &blocks,
                blocklist.as_deref(),
            )
            .await
        }
        Commands::Add { hosts } => skycontrol::commands::add::run(&cli.config, &hosts).await,
        Commands::Extend { minutes } => {
            skycontrol::commands::extend::run(&cli.config, minutes).await
        }
        Commands::Clear { reason } => skycontrol::commands::clear::run(&cli.config, reason).await,
        Commands::Status => skycontrol::commands::status::run(&cli.config).await,
        Commands::Version => skycontrol::commands::version::run(&cli.config).await,
    }
}
