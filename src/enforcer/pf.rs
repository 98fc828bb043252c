//! pf anchor controller.
//!
//! Owns the anchor file, the two reference lines in pf.conf, and the pf
//! enable token. Rules are buffered in memory and written in one go on
//! [`PacketFilter::start_block`], or streamed straight into the existing
//! anchor file while in append mode.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::rules::{is_safe_pf_address, PfRuleBuilder};
use super::PacketFilter;
use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::config::DaemonConfig;
use crate::fs_abstraction::FileSystem;

const TOKEN_PREFIX: &str = "Token : ";

/// Extract the enable token from `pfctl -E` output.
pub fn parse_token(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(TOKEN_PREFIX))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Files and binary the controller works with.
#[derive(Debug, Clone)]
pub struct PfPaths {
    pub pfctl: PathBuf,
    pub pf_conf: PathBuf,
    pub anchor_dir: PathBuf,
    pub token_file: PathBuf,
}

pub struct PfController {
    anchor_name: String,
    anchor_path: PathBuf,
    paths: PfPaths,
    builder: PfRuleBuilder,
    executor: Arc<dyn CommandExecutor>,
    fs: Arc<dyn FileSystem>,
    rules: Vec<String>,
    append_handle: Option<Box<dyn Write + Send>>,
}

impl PfController {
    pub fn new(
        anchor_name: &str,
        paths: PfPaths,
        allowlist: bool,
        executor: Arc<dyn CommandExecutor>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            anchor_name: anchor_name.to_string(),
            anchor_path: paths.anchor_dir.join(anchor_name),
            builder: PfRuleBuilder::new(allowlist, anchor_name),
            paths,
            executor,
            fs,
            rules: Vec::new(),
            append_handle: None,
        }
    }

    pub fn from_config(
        config: &DaemonConfig,
        allowlist: bool,
        executor: Arc<dyn CommandExecutor>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let paths = PfPaths {
            pfctl: config.paths.pfctl.clone(),
            pf_conf: config.paths.pf_conf.clone(),
            anchor_dir: config.paths.anchor_dir.clone(),
            token_file: config.paths.pf_token.clone(),
        };
        Self::new(&config.firewall.anchor_name, paths, allowlist, executor, fs)
    }

    pub fn anchor_path(&self) -> &Path {
        &self.anchor_path
    }

    /// Buffered rule lines not yet written.
    pub fn pending_rules(&self) -> &[String] {
        &self.rules
    }

    fn write_configuration(&self) -> Result<()> {
        self.fs
            .create_dir_all(&self.paths.anchor_dir)
            .with_context(|| format!("Failed to create {}", self.paths.anchor_dir.display()))?;
        let config = self.builder.build_config(&self.rules);
        self.fs
            .write_atomic(&self.anchor_path, config.as_bytes())
            .with_context(|| format!("Failed to write anchor {}", self.anchor_path.display()))?;
        debug!(
            "Wrote {} rule lines to {}",
            self.rules.len(),
            self.anchor_path.display()
        );
        Ok(())
    }

    /// Append the anchor reference to pf.conf unless it is already there.
    fn add_anchor_reference(&self) -> Result<()> {
        let existing = self.read_pf_conf();
        let anchor_path = self.anchor_path.display().to_string();
        if existing.contains(&anchor_path) {
            return Ok(());
        }

        let mut updated = existing;
        updated.push_str(&format!("\nanchor \"{}\"\n", self.anchor_name));
        updated.push_str(&format!(
            "load anchor \"{}\" from \"{}\"\n",
            self.anchor_name, anchor_path
        ));
        self.fs
            .write_atomic(&self.paths.pf_conf, updated.as_bytes())
            .with_context(|| format!("Failed to update {}", self.paths.pf_conf.display()))
    }

    fn remove_anchor_reference(&self) -> Result<()> {
        if !self.fs.exists(&self.paths.pf_conf) {
            return Ok(());
        }
        let conf = self.read_pf_conf();
        let kept: Vec<&str> = conf
            .split('\n')
            .filter(|line| !line.contains(&self.anchor_name))
            .collect();
        let mut new_conf = kept.join("\n").trim().to_string();
        new_conf.push('\n');
        self.fs
            .write_atomic(&self.paths.pf_conf, new_conf.as_bytes())
            .with_context(|| format!("Failed to update {}", self.paths.pf_conf.display()))
    }

    fn read_pf_conf(&self) -> String {
        self.fs
            .read_to_string(&self.paths.pf_conf)
            .unwrap_or_default()
    }

    fn pfctl(&self, args: &[&str]) -> Result<i32> {
        let pfctl = self.paths.pfctl.display().to_string();
        let output = self.executor.execute(&pfctl, &args_to_strings(args))?;
        if !output.success {
            warn!(
                "pfctl {} exited with {}: {}",
                args.join(" "),
                output.exit_code(),
                output.stderr.trim()
            );
        }
        Ok(output.exit_code())
    }

    fn pf_conf_arg(&self) -> String {
        self.paths.pf_conf.display().to_string()
    }
}

impl PacketFilter for PfController {
    fn add_rule(&mut self, ip: Option<&str>, port: u16, mask_len: u8) -> Result<()> {
        if let Some(addr) = ip {
            if !is_safe_pf_address(addr) {
                warn!("Skipping unsafe pf address: {:?}", addr);
                return Ok(());
            }
        }

        let lines = self.builder.rule_strings(ip, port, mask_len);
        match self.append_handle.as_mut() {
            Some(handle) => {
                for line in &lines {
                    handle
                        .write_all(line.as_bytes())
                        .context("Failed to append pf rule")?;
                }
            }
            None => self.rules.extend(lines),
        }
        Ok(())
    }

    fn enter_append_mode(&mut self) -> Result<()> {
        if self.append_handle.is_some() {
            return Ok(());
        }
        let handle = self
            .fs
            .open_append(&self.anchor_path)
            .with_context(|| format!("Failed to open {} for append", self.anchor_path.display()))?;
        self.append_handle = Some(handle);
        Ok(())
    }

    fn finish_appending(&mut self) -> Result<()> {
        if let Some(mut handle) = self.append_handle.take() {
            handle.flush().context("Failed to flush pf anchor")?;
        }
        Ok(())
    }

    fn start_block(&mut self) -> Result<i32> {
        self.add_anchor_reference()?;
        self.write_configuration()?;

        let conf = self.pf_conf_arg();
        let pfctl = self.paths.pfctl.display().to_string();
        let output = self
            .executor
            .execute(&pfctl, &args_to_strings(&["-E", "-f", &conf, "-F", "states"]))?;

        match parse_token(&output.combined()) {
            Some(token) => {
                self.fs
                    .write_atomic(&self.paths.token_file, token.as_bytes())
                    .with_context(|| {
                        format!("Failed to write {}", self.paths.token_file.display())
                    })?;
                self.fs.set_permissions_mode(&self.paths.token_file, 0o600).ok();
            }
            None => warn!("pfctl -E returned no enable token"),
        }

        if output.success {
            info!("pf anchor {} loaded", self.anchor_name);
        } else {
            warn!(
                "pfctl -E exited with {}: {}",
                output.exit_code(),
                output.stderr.trim()
            );
        }
        Ok(output.exit_code())
    }

    fn refresh_rules(&mut self) -> Result<i32> {
        let conf = self.pf_conf_arg();
        self.pfctl(&["-f", &conf, "-F", "states"])
    }

    fn stop_block(&mut self, force: bool) -> Result<i32> {
        let token = self
            .fs
            .read_to_string(&self.paths.token_file)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if let Err(e) = self.fs.write_atomic(&self.anchor_path, b"") {
            warn!("Failed to blank {}: {}", self.anchor_path.display(), e);
        }
        self.remove_anchor_reference()?;

        let conf = self.pf_conf_arg();
        if !token.is_empty() && !force {
            self.pfctl(&["-X", &token, "-f", &conf])
        } else {
            self.pfctl(&["-d", "-f", &conf])
        }
    }

    fn contains_block(&self) -> bool {
        self.read_pf_conf().contains(&self.anchor_name)
    }
}
