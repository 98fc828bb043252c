//! Enforcement backends: pf anchor and hosts-file overrides.

pub mod pf;
pub mod rules;

use anyhow::Result;

pub use pf::{parse_token, PfController, PfPaths};
pub use rules::PfRuleBuilder;

/// Packet-filter side of a block.
///
/// Exit codes from the control tool are passed through; callers decide
/// whether nonzero is fatal.
pub trait PacketFilter: Send {
    /// Emit TCP+UDP rules for one destination. `None` is any address.
    fn add_rule(&mut self, ip: Option<&str>, port: u16, mask_len: u8) -> Result<()>;

    /// Route further rules straight into the live anchor file.
    fn enter_append_mode(&mut self) -> Result<()>;

    fn finish_appending(&mut self) -> Result<()>;

    /// Write anchor and pf.conf, enable pf, load the ruleset.
    fn start_block(&mut self) -> Result<i32>;

    /// Reload pf.conf without re-enabling.
    fn refresh_rules(&mut self) -> Result<i32>;

    /// Blank the anchor, drop its reference, release pf.
    fn stop_block(&mut self, force: bool) -> Result<i32>;

    /// pf.conf still references the anchor.
    fn contains_block(&self) -> bool;
}

/// Check if running as root (effective UID == 0)
///
/// pfctl, pf.conf and /etc/hosts all need it.
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions and never fails.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!("This operation requires root privileges. Please run with sudo.")
    }
    Ok(())
}
