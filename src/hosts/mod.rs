//! Hosts-file enforcement.
//!
//! A [`HostFileBlocker`] keeps an in-memory copy of one hosts-like file and
//! edits a sentinel-delimited region inside it. Nothing reaches disk until
//! [`HostFileBlocker::write_new_contents`]. [`HostFileBlockerSet`] fans the
//! same operations out over the real hosts file and any VPN-client copies.

mod set;

pub use set::HostFileBlockerSet;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::fs_abstraction::FileSystem;

pub const BLOCK_HEADER: &str = "# BEGIN SELFCONTROL BLOCK";
pub const BLOCK_FOOTER: &str = "# END SELFCONTROL BLOCK";

/// Stand-in contents when the hosts file does not exist.
pub const DEFAULT_HOSTS_CONTENTS: &str = "##\n\
# Host Database\n\
#\n\
# localhost is used to configure the loopback interface\n\
# when the system is booting.  Do not change this entry.\n\
##\n\
127.0.0.1\tlocalhost\n\
255.255.255.255\tbroadcasthost\n\
::1             localhost\n\
fe80::1%lo0\tlocalhost\n\
\n";

fn rule_lines(domain: &str) -> String {
    format!("0.0.0.0\t{domain}\n::\t{domain}\n")
}

pub struct HostFileBlocker {
    path: PathBuf,
    backup_path: PathBuf,
    contents: Mutex<String>,
    fs: Arc<dyn FileSystem>,
}

impl HostFileBlocker {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let path = path.into();
        let mut backup = path.clone().into_os_string();
        backup.push(".bak");
        let contents = read_or_default(fs.as_ref(), &path);
        Self {
            path,
            backup_path: PathBuf::from(backup),
            contents: Mutex::new(contents),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Current in-memory contents.
    pub fn contents(&self) -> String {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.contents.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains_block(&self) -> bool {
        self.lock().contains(BLOCK_HEADER)
    }

    pub fn add_header(&self) {
        let mut contents = self.lock();
        contents.push('\n');
        contents.push_str(BLOCK_HEADER);
        contents.push('\n');
    }

    pub fn add_footer(&self) {
        let mut contents = self.lock();
        contents.push_str(BLOCK_FOOTER);
        contents.push('\n');
    }

    /// Null-route `domain` at the end of the buffer.
    pub fn add_rule(&self, domain: &str) {
        self.lock().push_str(&rule_lines(domain));
    }

    /// Null-route `domain` just above the footer of an existing region.
    /// Returns false when there is no footer to insert before.
    pub fn append_into_existing_block(&self, domain: &str) -> bool {
        let mut contents = self.lock();
        let Some(header_at) = contents.find(BLOCK_HEADER) else {
            return false;
        };
        let Some(footer_rel) = contents[header_at..].find(BLOCK_FOOTER) else {
            return false;
        };
        contents.insert_str(header_at + footer_rel, &rule_lines(domain));
        true
    }

    /// Delete the region, one blank line before it and one line break
    /// after it. Without a footer everything from the header on goes.
    pub fn remove_block(&self) {
        let mut contents = self.lock();
        let Some(header_at) = contents.find(BLOCK_HEADER) else {
            return;
        };

        let mut start = header_at;
        if contents[..start].ends_with('\n') {
            start -= 1;
        }

        let end = match contents[header_at..].find(BLOCK_FOOTER) {
            Some(rel) => {
                let mut end = header_at + rel + BLOCK_FOOTER.len();
                if contents[end..].starts_with('\n') {
                    end += 1;
                }
                end
            }
            None => contents.len(),
        };

        contents.replace_range(start..end, "");
    }

    /// Flush the buffer to disk.
    pub fn write_new_contents(&self) -> Result<()> {
        let contents = self.lock();
        self.fs
            .write_atomic(&self.path, contents.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Drop in-memory edits and reload from disk.
    pub fn revert_to_disk(&self) {
        let fresh = read_or_default(self.fs.as_ref(), &self.path);
        *self.lock() = fresh;
    }

    /// Copy the file to its `.bak` sibling, writing the boilerplate first if
    /// the file does not exist yet.
    pub fn create_backup(&self) -> Result<()> {
        self.delete_backup();

        if !self.fs.exists(&self.path) {
            self.fs
                .write_atomic(&self.path, DEFAULT_HOSTS_CONTENTS.as_bytes())
                .with_context(|| format!("Failed to create {}", self.path.display()))?;
        }

        self.fs
            .copy(&self.path, &self.backup_path)
            .with_context(|| format!("Failed to back up {}", self.path.display()))?;
        debug!("Backed up {} to {}", self.path.display(), self.backup_path.display());
        Ok(())
    }

    pub fn delete_backup(&self) {
        if self.fs.exists(&self.backup_path) {
            if let Err(e) = self.fs.remove_file(&self.backup_path) {
                debug!("Could not remove {}: {}", self.backup_path.display(), e);
            }
        }
    }

    /// Move the `.bak` copy back over the live file.
    pub fn restore_backup(&self) -> Result<()> {
        if !self.fs.exists(&self.backup_path) {
            anyhow::bail!("No backup at {}", self.backup_path.display());
        }
        self.fs
            .rename(&self.backup_path, &self.path)
            .with_context(|| format!("Failed to restore {}", self.path.display()))?;
        self.revert_to_disk();
        Ok(())
    }
}

fn read_or_default(fs: &dyn FileSystem, path: &Path) -> String {
    fs.read_to_string(path)
        .unwrap_or_else(|_| DEFAULT_HOSTS_CONTENTS.to_string())
}
