//! Filesystem access behind a trait.
//!
//! The enforcers (hosts files, pf anchor and pf.conf, token file) go through
//! [`FileSystem`] so tests can run against a temp directory or simulate
//! permission failures with `MockFileSystem`.

use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

#[cfg(test)]
use mockall::automock;

/// Mode for files `write_atomic` creates. Hosts files must stay world-readable.
pub const NEW_FILE_MODE: u32 = 0o644;

#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write bytes in place, creating the file if needed.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Write to a sibling temp file then rename over `path`. An existing
    /// file keeps its mode; a new one gets [`NEW_FILE_MODE`].
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Create `path` with mode 0600. The contents are never visible under a
    /// wider mode, and an existing file is left alone (`AlreadyExists`).
    fn write_private(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Open `path` for appending, positioned at end of file.
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    fn exists(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Set Unix permission bits (e.g. 0o600).
    fn set_permissions_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// `std::fs` implementation.
#[derive(Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        // Keep the permissions of the file being replaced (hosts is 0644)
        let mode = std::fs::metadata(path)
            .map(|meta| meta.permissions().mode())
            .unwrap_or(NEW_FILE_MODE);

        let temp = filled_temp_file(path, contents)?;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(mode))?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_private(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let temp = filled_temp_file(path, contents)?;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o600))?;
        temp.persist_noclobber(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn open_append(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let file = std::fs::OpenOptions::new().append(true).open(path)?;
        Ok(Box::new(file))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn set_permissions_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
}

/// Sibling temp file (created 0600 by `tempfile`) holding `contents`.
fn filled_temp_file(path: &Path, contents: &[u8]) -> io::Result<tempfile::NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}
