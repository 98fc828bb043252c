//! Durable block state.
//!
//! One JSON record holds everything the daemon needs to re-enforce or lift
//! a block after a restart. The file lives at a per-machine path derived
//! from the hardware serial so it is not trivially found and deleted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::fs_abstraction::FileSystem;

const SETTINGS_SEED: &str = "SkyControlUserPreferences";
const UNKNOWN_SERIAL: &str = "unknown-serial";

/// The far-past sentinel used for "no end date".
pub fn far_past() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub block_end_date: DateTime<Utc>,
    /// Normalized entries, re-parsed on every enforcement pass
    pub active_blocklist: Vec<String>,
    pub active_block_as_allowlist: bool,
    pub block_is_running: bool,
    pub tampering_detected: bool,

    pub evaluate_common_subdomains: bool,
    pub include_linked_domains: bool,
    pub block_sound_should_play: bool,
    pub block_sound: i32,
    pub clear_caches: bool,
    pub allow_local_networks: bool,
    pub enable_error_reporting: bool,

    pub settings_version_number: u64,
    pub last_settings_update: DateTime<Utc>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            block_end_date: far_past(),
            active_blocklist: Vec::new(),
            active_block_as_allowlist: false,
            block_is_running: false,
            tampering_detected: false,
            evaluate_common_subdomains: true,
            include_linked_domains: true,
            block_sound_should_play: false,
            block_sound: 5,
            clear_caches: true,
            allow_local_networks: true,
            enable_error_reporting: true,
            settings_version_number: 0,
            last_settings_update: far_past(),
        }
    }
}

impl Settings {
    /// Copy the feature flags from a `startBlock` bundle.
    pub fn apply_block_settings(&mut self, flags: &BlockSettings) {
        self.evaluate_common_subdomains = flags.evaluate_common_subdomains;
        self.include_linked_domains = flags.include_linked_domains;
        self.block_sound_should_play = flags.block_sound_should_play;
        self.block_sound = flags.block_sound;
        self.clear_caches = flags.clear_caches;
        self.allow_local_networks = flags.allow_local_networks;
        self.enable_error_reporting = flags.enable_error_reporting;
    }

    /// Back to Idle: no list, end date in the far past.
    pub fn reset_block(&mut self) {
        self.block_is_running = false;
        self.block_end_date = far_past();
        self.active_blocklist.clear();
        self.active_block_as_allowlist = false;
        self.tampering_detected = false;
    }
}

/// Feature flags sent along with `startBlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockSettings {
    pub evaluate_common_subdomains: bool,
    pub include_linked_domains: bool,
    pub block_sound_should_play: bool,
    pub block_sound: i32,
    pub clear_caches: bool,
    pub allow_local_networks: bool,
    pub enable_error_reporting: bool,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for BlockSettings {
    fn from(s: &Settings) -> Self {
        Self {
            evaluate_common_subdomains: s.evaluate_common_subdomains,
            include_linked_domains: s.include_linked_domains,
            block_sound_should_play: s.block_sound_should_play,
            block_sound: s.block_sound,
            clear_caches: s.clear_caches,
            allow_local_networks: s.allow_local_networks,
            enable_error_reporting: s.enable_error_reporting,
        }
    }
}

/// Running/expired checks. The flag alone is not enough: a block whose end
/// date has passed is over even if nobody has cleared the flag yet.
pub struct BlockState;

impl BlockState {
    pub fn is_expired(end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        end <= now
    }

    pub fn is_running(settings: &Settings, now: DateTime<Utc>) -> bool {
        settings.block_is_running && !Self::is_expired(settings.block_end_date, now)
    }
}

/// Owns the settings file.
pub struct SettingsStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults when the file does not exist yet.
    pub fn load(&self) -> Result<Settings> {
        if !self.fs.exists(&self.path) {
            debug!("No settings at {}, using defaults", self.path.display());
            return Ok(Settings::default());
        }
        let content = self
            .fs
            .read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", self.path.display()))
    }

    /// Persist `settings` with the version bumped by one and
    /// `last_settings_update` set to `now`. Returns what was written.
    pub fn save(&self, settings: &Settings, now: DateTime<Utc>) -> Result<Settings> {
        let mut updated = settings.clone();
        updated.settings_version_number += 1;
        updated.last_settings_update = now;

        if let Some(parent) = self.path.parent() {
            self.fs
                .create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&updated).context("Failed to serialize settings")?;
        self.fs
            .write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write settings: {}", self.path.display()))?;
        self.fs.set_permissions_mode(&self.path, 0o600).ok();

        Ok(updated)
    }
}

/// Settings file name for a machine serial.
pub fn settings_file_name(serial: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SETTINGS_SEED.as_bytes());
    hasher.update(serial.as_bytes());
    format!(".{}.json", hex::encode(hasher.finalize()))
}

pub fn settings_path(state_dir: &Path, serial: &str) -> PathBuf {
    state_dir.join(settings_file_name(serial))
}

/// Hardware serial number, best effort.
///
/// `ioreg` on macOS, then the DMI serial, then the machine id.
pub fn machine_serial(executor: &dyn CommandExecutor, fs: &dyn FileSystem) -> String {
    let ioreg = executor.execute(
        "/usr/sbin/ioreg",
        &args_to_strings(&["-rd1", "-c", "IOPlatformExpertDevice"]),
    );
    if let Ok(output) = ioreg {
        if output.success {
            if let Some(serial) = parse_ioreg_serial(&output.stdout) {
                return serial;
            }
        }
    }

    for candidate in ["/sys/class/dmi/id/product_serial", "/etc/machine-id"] {
        if let Ok(content) = fs.read_to_string(Path::new(candidate)) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    UNKNOWN_SERIAL.to_string()
}

fn parse_ioreg_serial(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.contains("\"IOPlatformSerialNumber\""))
        .and_then(|l| l.split('=').nth(1))
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};
    use crate::fs_abstraction::{MockFileSystem, RealFileSystem};
    use chrono::{Duration, TimeZone};
    use std::io;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join(".settings.json"), Arc::new(RealFileSystem))
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.block_end_date, far_past());
        assert!(!s.block_is_running);
        assert!(s.evaluate_common_subdomains);
        assert!(s.include_linked_domains);
        assert!(s.allow_local_networks);
        assert!(s.clear_caches);
        assert!(s.enable_error_reporting);
        assert!(!s.block_sound_should_play);
        assert_eq!(s.block_sound, 5);
        assert_eq!(s.settings_version_number, 0);
    }

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).load().unwrap(), Settings::default());
    }

    #[test]
    fn test_save_increments_version_and_stamps_time() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let mut settings = Settings::default();
        settings.block_is_running = true;
        settings.active_blocklist = vec!["example.com".to_string()];

        let written = store.save(&settings, now).unwrap();
        assert_eq!(written.settings_version_number, 1);
        assert_eq!(written.last_settings_update, now);

        let loaded = store.load().unwrap();
        assert_eq!(loaded, written);

        let again = store.save(&loaded, now + Duration::minutes(1)).unwrap();
        assert_eq!(again.settings_version_number, 2);
    }

    #[test]
    fn test_json_uses_camel_case_keys() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("\"blockEndDate\""));
        assert!(json.contains("\"activeBlockAsAllowlist\""));
        assert!(json.contains("\"settingsVersionNumber\""));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_save_failure_surfaces() {
        let mut fs = MockFileSystem::new();
        fs.expect_create_dir_all().returning(|_| Ok(()));
        fs.expect_write_atomic()
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::PermissionDenied, "ro")));
        let store = SettingsStore::new("/var/db/.s.json", Arc::new(fs));
        assert!(store.save(&Settings::default(), Utc::now()).is_err());
    }

    #[test]
    fn test_block_state() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert!(BlockState::is_expired(now, now));
        assert!(!BlockState::is_expired(now + Duration::seconds(1), now));

        let mut s = Settings::default();
        s.block_end_date = now + Duration::minutes(5);
        assert!(!BlockState::is_running(&s, now));
        s.block_is_running = true;
        assert!(BlockState::is_running(&s, now));
        assert!(!BlockState::is_running(&s, now + Duration::minutes(5)));
    }

    #[test]
    fn test_block_settings_roundtrip_from_settings() {
        let mut s = Settings::default();
        s.evaluate_common_subdomains = false;
        s.block_sound = 2;
        let flags = BlockSettings::from(&s);

        let mut fresh = Settings::default();
        fresh.apply_block_settings(&flags);
        assert!(!fresh.evaluate_common_subdomains);
        assert_eq!(fresh.block_sound, 2);
    }

    #[test]
    fn test_reset_block() {
        let mut s = Settings::default();
        s.block_is_running = true;
        s.active_blocklist.push("a.com".into());
        s.block_end_date = Utc::now();
        s.reset_block();
        assert!(!s.block_is_running);
        assert!(s.active_blocklist.is_empty());
        assert_eq!(s.block_end_date, far_past());
    }

    #[test]
    fn test_settings_file_name_is_stable_and_hidden() {
        let a = settings_file_name("C02ABC123");
        assert_eq!(a, settings_file_name("C02ABC123"));
        assert_ne!(a, settings_file_name("C02ABC124"));
        assert!(a.starts_with('.'));
        assert!(a.ends_with(".json"));
        assert_eq!(a.len(), 1 + 64 + 5);
    }

    #[test]
    fn test_machine_serial_from_ioreg() {
        let mut exec = MockCommandExecutor::new();
        exec.expect_execute().returning(|_, _| {
            Ok(CommandOutput {
                stdout: "  | \"IOPlatformSerialNumber\" = \"C02XYZ\"\n".to_string(),
                stderr: String::new(),
                success: true,
                code: Some(0),
            })
        });
        let fs = MockFileSystem::new();
        assert_eq!(machine_serial(&exec, &fs), "C02XYZ");
    }

    #[test]
    fn test_machine_serial_fallbacks() {
        let mut exec = MockCommandExecutor::new();
        exec.expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("no ioreg")));

        let mut fs = MockFileSystem::new();
        fs.expect_read_to_string()
            .withf(|p| p == Path::new("/sys/class/dmi/id/product_serial"))
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "x")));
        fs.expect_read_to_string()
            .withf(|p| p == Path::new("/etc/machine-id"))
            .returning(|_| Ok("abc123\n".to_string()));
        assert_eq!(machine_serial(&exec, &fs), "abc123");

        let mut exec = MockCommandExecutor::new();
        exec.expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("no ioreg")));
        let mut fs = MockFileSystem::new();
        fs.expect_read_to_string()
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "x")));
        assert_eq!(machine_serial(&exec, &fs), UNKNOWN_SERIAL);
    }
}
