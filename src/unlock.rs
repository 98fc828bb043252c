//! Emergency unlock rate limiting and audit trail.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::config::PolicyConfig;
use crate::fs_abstraction::FileSystem;

const NO_REASON: &str = "(no reason provided)";

/// One forced clear. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyUnlockRecord {
    pub date: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Cooldown plus daily cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyUnlockPolicy {
    pub cooldown_minutes: u32,
    pub max_per_day: u32,
}

impl Default for EmergencyUnlockPolicy {
    fn default() -> Self {
        Self {
            cooldown_minutes: 15,
            max_per_day: 1,
        }
    }
}

impl From<&PolicyConfig> for EmergencyUnlockPolicy {
    fn from(cfg: &PolicyConfig) -> Self {
        Self {
            cooldown_minutes: cfg.unlock_cooldown_minutes,
            max_per_day: cfg.unlock_max_per_day,
        }
    }
}

impl EmergencyUnlockPolicy {
    /// Whether an unlock is allowed at `now`. The daily cap resets at
    /// midnight in `now`'s time zone.
    pub fn can_unlock<Tz: TimeZone>(
        &self,
        history: &[EmergencyUnlockRecord],
        now: &DateTime<Tz>,
    ) -> bool {
        let now_utc = now.with_timezone(&Utc);
        let cooldown_start = now_utc - Duration::minutes(i64::from(self.cooldown_minutes));
        if history.iter().any(|r| r.date > cooldown_start) {
            return false;
        }

        let today = start_of_day(now);
        let todays = history.iter().filter(|r| r.date >= today).count();
        todays < self.max_per_day as usize
    }

    /// [`Self::can_unlock`] with the machine's local midnight.
    pub fn can_unlock_local(&self, history: &[EmergencyUnlockRecord], now: DateTime<Utc>) -> bool {
        self.can_unlock(history, &now.with_timezone(&Local))
    }
}

fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Midnight skipped by a DST jump; fall back to UTC midnight
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// Append-only JSON array of unlock records.
pub struct EmergencyUnlockStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl EmergencyUnlockStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    /// Missing history is empty. A corrupt file is also treated as empty
    /// and logged.
    pub fn load(&self) -> Vec<EmergencyUnlockRecord> {
        let Ok(content) = self.fs.read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!("Ignoring unreadable unlock history {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn append(&self, record: EmergencyUnlockRecord) -> Result<()> {
        let mut history = self.load();
        history.push(record);

        if let Some(parent) = self.path.parent() {
            self.fs
                .create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&history).context("Failed to serialize unlock history")?;
        self.fs
            .write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// Human-readable audit log, one line per unlock or attempt.
pub struct UnlockLogger {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl UnlockLogger {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, reason: Option<&str>, cleared: bool, now: DateTime<Utc>) -> Result<()> {
        let line = format_log_line(reason, cleared, now);

        if self.fs.exists(&self.path) {
            let mut handle = self
                .fs
                .open_append(&self.path)
                .with_context(|| format!("Failed to open {}", self.path.display()))?;
            handle
                .write_all(line.as_bytes())
                .with_context(|| format!("Failed to append to {}", self.path.display()))?;
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            self.fs.create_dir_all(parent).ok();
        }
        self.fs
            .write(&self.path, line.as_bytes())
            .with_context(|| format!("Failed to create {}", self.path.display()))
    }
}

/// `<RFC3339> | cleared|attempted | <reason>`
pub fn format_log_line(reason: Option<&str>, cleared: bool, now: DateTime<Utc>) -> String {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(NO_REASON);
    let status = if cleared { "cleared" } else { "attempted" };
    format!(
        "{} | {} | {}\n",
        now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        status,
        reason
    )
}
