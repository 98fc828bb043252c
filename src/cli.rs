//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "skycontrol")]
#[command(author, version, about = "Time-boxed website and network blocker")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Daemon config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the privileged block daemon
    Daemon {
        /// Print the default configuration and exit
        #[arg(long)]
        print_config: bool,
    },

    /// Start a new block
    Start {
        /// Block duration in minutes
        #[arg(short, long)]
        minutes: u64,

        /// Block everything except the listed entries
        #[arg(long)]
        allowlist: bool,

        /// Entry to block (repeatable)
        #[arg(short, long = "block", value_name = "HOST")]
        blocks: Vec<String>,

        /// Comma-separated entries to block
        #[arg(long, value_name = "LIST")]
        blocklist: Option<String>,
    },

    /// Add entries to the running block
    Add {
        /// Hosts, IPs or CIDR ranges
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// Extend the running block
    Extend {
        /// Minutes to add to the current end time
        #[arg(short, long)]
        minutes: u64,
    },

    /// Clear the running block (rate limited)
    Clear {
        /// Why the block is being cleared, recorded in the unlock log
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show the current block
    Status,

    /// Show client and daemon versions
    Version,
}
