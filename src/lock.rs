//! File-based locking so only one daemon instance mutates block state.
//!
//! Uses flock-style advisory locking. In-process serialization of commands
//! is handled by the daemon's mutex; this lock covers the system-wide case
//! of a second daemon being started by hand.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Holds an exclusive lock for as long as it lives.
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the lock at `lock_path` without blocking.
    ///
    /// create+read+write without truncate avoids a TOCTOU race between
    /// creating the file and locking it.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).ok();
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another skycontrol daemon is already running.\n\
                 If you believe this is an error, remove the lock file: {}",
                lock_path.display()
            )
        })?;

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Released when the file is closed on drop
