//! Authorization gate for privileged daemon commands.
//!
//! Each privileged command maps to a named right. A caller with read access
//! to the daemon key (root) issues a short-lived HMAC-signed token bound to
//! that right; the daemon verifies the token non-interactively against the
//! key and the rights database.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(test)]
use mockall::automock;

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::fs_abstraction::FileSystem;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const RIGHT_PREFIX: &str = "com.skynet.selfcontrol.";

/// Status codes carried by [`DaemonError::AuthorizationFailed`].
pub mod status {
    pub const MALFORMED: i32 = -60001;
    pub const BAD_SIGNATURE: i32 = -60002;
    pub const WRONG_RIGHT: i32 = -60003;
    pub const EXPIRED: i32 = -60004;
    pub const RIGHT_NOT_REGISTERED: i32 = -60005;
    pub const DENIED: i32 = -60006;
    pub const UNAVAILABLE: i32 = -60007;
    pub const MISSING: i32 = -60008;
}

/// Privileged commands, one right each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthCommand {
    StartBlock,
    UpdateBlocklist,
    UpdateBlockEndDate,
    ClearBlock,
}

impl AuthCommand {
    pub const ALL: [AuthCommand; 4] = [
        AuthCommand::StartBlock,
        AuthCommand::UpdateBlocklist,
        AuthCommand::UpdateBlockEndDate,
        AuthCommand::ClearBlock,
    ];

    fn method_name(&self) -> &'static str {
        match self {
            AuthCommand::StartBlock => "startBlock",
            AuthCommand::UpdateBlocklist => "updateBlocklist",
            AuthCommand::UpdateBlockEndDate => "updateBlockEndDate",
            AuthCommand::ClearBlock => "clearBlock",
        }
    }

    pub fn right_name(&self) -> String {
        format!("{}{}", RIGHT_PREFIX, self.method_name())
    }

    pub fn prompt_description(&self) -> &'static str {
        match self {
            AuthCommand::StartBlock => "SkyControl needs your password to start a new block.",
            AuthCommand::UpdateBlocklist => {
                "SkyControl needs your password to add sites to the running block."
            }
            AuthCommand::UpdateBlockEndDate => {
                "SkyControl needs your password to extend the running block."
            }
            AuthCommand::ClearBlock => "SkyControl needs your password to clear the block.",
        }
    }
}

impl std::fmt::Display for AuthCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method_name())
    }
}

/// Secure string type that zeroizes memory on drop
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Raw HMAC key, wiped when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SigningKey([u8; KEY_LEN]);

impl SigningKey {
    fn from_hex(text: &SecureString) -> Result<Self> {
        let mut bytes = hex::decode(text.as_str().trim()).context("Authorization key is not valid hex")?;
        if bytes.len() != KEY_LEN {
            let len = bytes.len();
            bytes.zeroize();
            bail!("Authorization key has {} bytes, expected {}", len, KEY_LEN);
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self(key))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.0).map_err(|_| anyhow!("hmac key"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RightRule {
    AuthenticateAsAdmin,
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightDefinition {
    pub rule: RightRule,
    pub prompt: String,
}

/// Root-owned JSON map of right name to rule.
pub struct RightsDatabase {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl RightsDatabase {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn load(&self) -> Result<BTreeMap<String, RightDefinition>> {
        if !self.fs.exists(&self.path) {
            return Ok(BTreeMap::new());
        }
        let content = self
            .fs
            .read_to_string(&self.path)
            .with_context(|| format!("Failed to read rights database {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse rights database {}", self.path.display()))
    }

    pub fn lookup(&self, command: AuthCommand) -> Result<Option<RightDefinition>> {
        Ok(self.load()?.remove(&command.right_name()))
    }

    /// Registers the right with `authenticate-as-admin` if it is absent.
    pub fn ensure_registered(&self, command: AuthCommand) -> Result<RightDefinition> {
        let mut rights = self.load()?;
        if let Some(existing) = rights.get(&command.right_name()) {
            return Ok(existing.clone());
        }

        let definition = RightDefinition {
            rule: RightRule::AuthenticateAsAdmin,
            prompt: command.prompt_description().to_string(),
        };
        rights.insert(command.right_name(), definition.clone());

        if let Some(parent) = self.path.parent() {
            self.fs
                .create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&rights).context("Failed to serialize rights")?;
        self.fs
            .write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write rights database {}", self.path.display()))?;
        info!("Registered right {}", command.right_name());
        Ok(definition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TokenClaims {
    right: String,
    issued_at: i64,
    expires_at: i64,
    nonce: String,
}

/// Daemon-side check of a caller-supplied token.
#[cfg_attr(test, automock)]
pub trait Authorizer: Send + Sync {
    fn verify(&self, token: Option<String>, command: AuthCommand) -> DaemonResult<()>;
}

/// HMAC token issuer and verifier backed by the on-disk key.
pub struct TokenAuthority {
    key_path: PathBuf,
    #[cfg_attr(not(feature = "dev-bypass"), allow(dead_code))]
    state_dir: PathBuf,
    rights: RightsDatabase,
    ttl: Duration,
    fs: Arc<dyn FileSystem>,
}

impl TokenAuthority {
    pub fn new(
        key_path: impl Into<PathBuf>,
        rights_path: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        ttl: Duration,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            key_path: key_path.into(),
            state_dir: state_dir.into(),
            rights: RightsDatabase::new(rights_path, Arc::clone(&fs)),
            ttl,
            fs,
        }
    }

    pub fn from_config(config: &DaemonConfig, fs: Arc<dyn FileSystem>) -> Self {
        let secs = i64::try_from(config.daemon.token_ttl_secs)
            .unwrap_or(i64::MAX)
            .min(86_400);
        let ttl = Duration::seconds(secs);
        Self::new(
            &config.paths.auth_key,
            &config.paths.rights_db,
            &config.paths.state_dir,
            ttl,
            fs,
        )
    }

    pub fn rights(&self) -> &RightsDatabase {
        &self.rights
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Create the key file (0600) if it does not exist yet.
    pub fn ensure_key(&self) -> Result<()> {
        if self.fs.exists(&self.key_path) {
            self.load_key()?;
            return Ok(());
        }

        let mut raw = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut raw);
        let encoded = SecureString::new(hex::encode(raw));
        raw.zeroize();

        if let Some(parent) = self.key_path.parent() {
            self.fs
                .create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        self.fs
            .write_private(&self.key_path, encoded.as_str().as_bytes())
            .with_context(|| format!("Failed to write authorization key {}", self.key_path.display()))?;
        info!("Generated authorization key at {}", self.key_path.display());
        Ok(())
    }

    fn load_key(&self) -> Result<SigningKey> {
        let text = SecureString::new(self.fs.read_to_string(&self.key_path).with_context(|| {
            format!(
                "Cannot read authorization key {} (run as root)",
                self.key_path.display()
            )
        })?);
        SigningKey::from_hex(&text)
    }

    /// Caller side: register the right if needed and mint a token for it.
    pub fn issue(&self, command: AuthCommand, now: DateTime<Utc>) -> Result<String> {
        let key = self.load_key()?;
        self.rights.ensure_registered(command)?;

        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);
        let claims = TokenClaims {
            right: command.right_name(),
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
            nonce: hex::encode(nonce),
        };

        let payload = serde_json::to_vec(&claims).context("Failed to serialize token claims")?;
        let mut mac = key.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        debug!("Issued token for {}", claims.right);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Daemon side: check `token` grants `command` at `now`.
    pub fn verify_at(
        &self,
        token: Option<&str>,
        command: AuthCommand,
        now: DateTime<Utc>,
    ) -> DaemonResult<()> {
        if self.dev_bypass_enabled() {
            warn!("Authorization bypassed for {} (development build)", command);
            return Ok(());
        }

        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(denied(status::MISSING)),
        };

        let (payload_b64, sig_b64) = token.split_once('.').ok_or_else(|| denied(status::MALFORMED))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| denied(status::MALFORMED))?;
        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| denied(status::MALFORMED))?;
        if payload.is_empty() || signature.len() != 32 {
            return Err(denied(status::MALFORMED));
        }

        let mut mac = self
            .load_key()
            .and_then(|key| key.mac())
            .map_err(|e| unavailable(&e))?;
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| denied(status::BAD_SIGNATURE))?;

        let claims: TokenClaims =
            serde_json::from_slice(&payload).map_err(|_| denied(status::MALFORMED))?;
        if claims.right != command.right_name() {
            return Err(denied(status::WRONG_RIGHT));
        }
        if now.timestamp() >= claims.expires_at {
            return Err(denied(status::EXPIRED));
        }

        match self.rights.lookup(command).map_err(|e| unavailable(&e))? {
            None => Err(denied(status::RIGHT_NOT_REGISTERED)),
            Some(def) if def.rule == RightRule::Deny => Err(denied(status::DENIED)),
            Some(_) => Ok(()),
        }
    }

    #[cfg(feature = "dev-bypass")]
    fn dev_bypass_enabled(&self) -> bool {
        std::env::var("SKYCONTROL_DEV_BYPASS_AUTH").as_deref() == Ok("1")
            || self.fs.exists(&self.state_dir.join("skycontrold.dev"))
    }

    #[cfg(not(feature = "dev-bypass"))]
    fn dev_bypass_enabled(&self) -> bool {
        false
    }
}

impl Authorizer for TokenAuthority {
    fn verify(&self, token: Option<String>, command: AuthCommand) -> DaemonResult<()> {
        self.verify_at(token.as_deref(), command, Utc::now())
    }
}

fn denied(status: i32) -> DaemonError {
    DaemonError::AuthorizationFailed { status }
}

/// Key or rights database unreadable. Details stay in the daemon log.
fn unavailable(e: &anyhow::Error) -> DaemonError {
    warn!("Authorization state unavailable: {:#}", e);
    denied(status::UNAVAILABLE)
}
