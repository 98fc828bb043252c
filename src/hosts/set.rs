use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::HostFileBlocker;
use crate::fs_abstraction::FileSystem;

/// The real hosts file plus any alternate hosts files that VPN clients swap
/// in. Every operation is broadcast; failures are aggregated so that one
/// bad member does not stop the others from being processed.
pub struct HostFileBlockerSet {
    blockers: Vec<HostFileBlocker>,
}

impl HostFileBlockerSet {
    /// Exactly these files, the first being the primary hosts file.
    pub fn with_paths(paths: &[PathBuf], fs: Arc<dyn FileSystem>) -> Self {
        let blockers = paths
            .iter()
            .map(|p| HostFileBlocker::new(p.clone(), fs.clone()))
            .collect();
        Self { blockers }
    }

    /// The primary hosts file plus whichever alternates exist right now.
    pub fn detect(hosts_file: &Path, alternates: &[PathBuf], fs: Arc<dyn FileSystem>) -> Self {
        let mut paths = vec![hosts_file.to_path_buf()];
        for alt in alternates {
            if fs.exists(alt) {
                debug!("Including alternate hosts file {}", alt.display());
                paths.push(alt.clone());
            }
        }
        Self::with_paths(&paths, fs)
    }

    pub fn blockers(&self) -> &[HostFileBlocker] {
        &self.blockers
    }

    pub fn primary(&self) -> Option<&HostFileBlocker> {
        self.blockers.first()
    }

    /// Any member carries a region.
    pub fn contains_block(&self) -> bool {
        self.blockers.iter().any(|b| b.contains_block())
    }

    pub fn add_header(&self) {
        self.blockers.iter().for_each(|b| b.add_header());
    }

    pub fn add_footer(&self) {
        self.blockers.iter().for_each(|b| b.add_footer());
    }

    pub fn add_rule(&self, domain: &str) {
        self.blockers.iter().for_each(|b| b.add_rule(domain));
    }

    pub fn append_into_existing_block(&self, domain: &str) {
        for blocker in &self.blockers {
            if !blocker.append_into_existing_block(domain) {
                debug!("{} has no block region to append to", blocker.path().display());
            }
        }
    }

    pub fn remove_block(&self) {
        self.blockers.iter().for_each(|b| b.remove_block());
    }

    pub fn revert_to_disk(&self) {
        self.blockers.iter().for_each(|b| b.revert_to_disk());
    }

    pub fn write_new_contents(&self) -> Result<()> {
        self.all(|b| b.write_new_contents())
    }

    pub fn create_backup(&self) -> Result<()> {
        self.all(|b| b.create_backup())
    }

    pub fn restore_backup(&self) -> Result<()> {
        self.all(|b| b.restore_backup())
    }

    /// Run `op` on every member; Ok only if all succeeded.
    fn all<F>(&self, op: F) -> Result<()>
    where
        F: Fn(&HostFileBlocker) -> Result<()>,
    {
        let mut failures = Vec::new();
        for blocker in &self.blockers {
            if let Err(e) = op(blocker) {
                warn!("{:#}", e);
                failures.push(format!("{:#}", e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(failures.join("; "))
        }
    }
}
