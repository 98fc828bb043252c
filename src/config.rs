//! Configuration management for the SkyControl daemon.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::validation::validate_anchor_name;

/// Default location of the daemon config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/skycontrol/daemon.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub paths: PathsConfig,
    pub firewall: FirewallConfig,
    pub policy: PolicyConfig,
    pub daemon: DaemonSection,
}

/// Every file the daemon reads or writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for settings, unlock history, auth key and rights
    pub state_dir: PathBuf,
    /// Fixed settings file. When unset the path is derived from the machine serial.
    pub settings_file: Option<PathBuf>,
    pub hosts_file: PathBuf,
    /// Alternate hosts files used by VPN clients, included when present
    pub alternate_hosts: Vec<PathBuf>,
    pub pf_conf: PathBuf,
    pub anchor_dir: PathBuf,
    pub pfctl: PathBuf,
    pub pf_token: PathBuf,
    pub unlock_history: PathBuf,
    pub unlock_log: PathBuf,
    pub socket: PathBuf,
    pub lock_file: PathBuf,
    pub auth_key: PathBuf,
    pub rights_db: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let state = PathBuf::from("/usr/local/etc/skycontrol");
        Self {
            settings_file: None,
            hosts_file: PathBuf::from("/etc/hosts"),
            alternate_hosts: default_alternate_hosts(),
            pf_conf: PathBuf::from("/etc/pf.conf"),
            anchor_dir: PathBuf::from("/etc/pf.anchors"),
            pfctl: PathBuf::from("/sbin/pfctl"),
            pf_token: PathBuf::from("/etc/SelfControlPFToken"),
            unlock_history: state.join("emergency-unlocks.json"),
            unlock_log: PathBuf::from("/var/log/selfcontrol-unlock.log"),
            socket: PathBuf::from("/var/run/skycontrold.sock"),
            lock_file: PathBuf::from("/var/run/skycontrold.lock"),
            auth_key: state.join("auth.key"),
            rights_db: state.join("rights.json"),
            state_dir: state,
        }
    }
}

fn default_alternate_hosts() -> Vec<PathBuf> {
    [
        "/etc/pulse-hosts.bak",
        "/etc/jnpr-pulse-hosts.bak",
        "/etc/pulse.hosts.bak",
        "/etc/jnpr-nc-hosts.bak",
        "/etc/hosts.ac",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FirewallConfig {
    /// pf anchor holding the block rules
    pub anchor_name: String,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            anchor_name: "com.skynet".to_string(),
        }
    }
}

/// Limits on emergency unlocks and extensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub unlock_cooldown_minutes: u32,
    pub unlock_max_per_day: u32,
    pub max_extension_hours: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            unlock_cooldown_minutes: 15,
            unlock_max_per_day: 1,
            max_extension_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonSection {
    /// Seconds between expiry/tamper checks
    pub checkup_interval_secs: u64,
    /// Lifetime of issued authorization tokens
    pub token_ttl_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            checkup_interval_secs: 60,
            token_ttl_secs: 300,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: DaemonConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path`, or return defaults if the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default layout relocated under `root`. Used for tests and for
    /// running against a scratch tree.
    pub fn rooted_at(root: &Path) -> Self {
        let state = root.join("state");
        let paths = PathsConfig {
            settings_file: None,
            hosts_file: root.join("etc/hosts"),
            alternate_hosts: default_alternate_hosts()
                .iter()
                .filter_map(|p| p.file_name().map(|n| root.join("etc").join(n)))
                .collect(),
            pf_conf: root.join("etc/pf.conf"),
            anchor_dir: root.join("etc/pf.anchors"),
            pfctl: PathBuf::from("/sbin/pfctl"),
            pf_token: root.join("etc/SelfControlPFToken"),
            unlock_history: state.join("emergency-unlocks.json"),
            unlock_log: root.join("log/selfcontrol-unlock.log"),
            socket: root.join("run/skycontrold.sock"),
            lock_file: root.join("run/skycontrold.lock"),
            auth_key: state.join("auth.key"),
            rights_db: state.join("rights.json"),
            state_dir: state,
        };
        Self {
            paths,
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_anchor_name(&self.firewall.anchor_name)?;

        if self.daemon.checkup_interval_secs == 0 {
            bail!("daemon.checkup_interval_secs must be greater than 0");
        }
        if self.daemon.token_ttl_secs == 0 {
            bail!("daemon.token_ttl_secs must be greater than 0");
        }
        if self.policy.max_extension_hours == 0 {
            bail!("policy.max_extension_hours must be greater than 0");
        }
        if self.policy.unlock_max_per_day == 0 {
            bail!("policy.unlock_max_per_day must be greater than 0");
        }

        let p = &self.paths;
        let mut all: Vec<(&str, &PathBuf)> = vec![
            ("state_dir", &p.state_dir),
            ("hosts_file", &p.hosts_file),
            ("pf_conf", &p.pf_conf),
            ("anchor_dir", &p.anchor_dir),
            ("pfctl", &p.pfctl),
            ("pf_token", &p.pf_token),
            ("unlock_history", &p.unlock_history),
            ("unlock_log", &p.unlock_log),
            ("socket", &p.socket),
            ("lock_file", &p.lock_file),
            ("auth_key", &p.auth_key),
            ("rights_db", &p.rights_db),
        ];
        if let Some(settings) = &p.settings_file {
            all.push(("settings_file", settings));
        }
        for alt in &p.alternate_hosts {
            all.push(("alternate_hosts", alt));
        }
        for (name, path) in all {
            if !path.is_absolute() {
                bail!("paths.{} must be an absolute path, got {:?}", name, path);
            }
        }

        Ok(())
    }

    /// Save configuration to file atomically.
    /// Writes to a temporary file first, then renames to prevent corruption.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self).with_context(|| "Failed to serialize config")?;

        let parent_dir = path.parent().unwrap_or(Path::new("/etc/skycontrol"));
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create {:?}", parent_dir))?;
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }

    /// Annotated default config, for `skycontrol daemon --print-config`.
    pub fn generate_default_yaml() -> String {
        let body = serde_yaml::to_string(&DaemonConfig::default()).unwrap_or_default();
        format!(
            "# SkyControl daemon configuration\n# Location: {}\n\n{}",
            DEFAULT_CONFIG_PATH, body
        )
    }
}
