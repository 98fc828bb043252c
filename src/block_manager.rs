//! Enforcement orchestrator.
//!
//! Drives the packet filter and the hosts-file set through the phases of a
//! block: prepare, add entries, finalize; or append to a running block; or
//! clear. One `BlockManager` is built per command and dropped afterwards.

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::blocklist::{parse_entry, BlockEntry};
use crate::dns::HostResolver;
use crate::enforcer::PacketFilter;
use crate::hosts::HostFileBlockerSet;
use crate::related::{google_entries, is_google_domain, related_entries, ExpansionOptions};
use crate::settings::BlockSettings;
use crate::validation::{is_valid_ip, validate_ip_or_cidr};

/// Private and link-local ranges kept reachable in allowlist mode.
const LOCAL_NETWORKS: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "fe80::/10",
    "fc00::/7",
];

#[derive(Debug, Clone, Copy)]
pub struct BlockOptions {
    pub allowlist: bool,
    pub allow_local_networks: bool,
    pub common_subdomains: bool,
    pub linked_domains: bool,
}

impl BlockOptions {
    pub fn new(allowlist: bool, flags: &BlockSettings) -> Self {
        Self {
            allowlist,
            allow_local_networks: flags.allow_local_networks,
            common_subdomains: flags.evaluate_common_subdomains,
            linked_domains: flags.include_linked_domains,
        }
    }

    fn expansion(&self) -> ExpansionOptions {
        ExpansionOptions {
            common_subdomains: self.common_subdomains,
            linked_domains: self.linked_domains,
        }
    }
}

pub struct BlockManager {
    pf: Box<dyn PacketFilter>,
    hosts: HostFileBlockerSet,
    resolver: Arc<dyn HostResolver>,
    options: BlockOptions,
    hosts_enabled: bool,
    append_mode: bool,
    added: HashSet<BlockEntry>,
}

impl BlockManager {
    pub fn new(
        pf: Box<dyn PacketFilter>,
        hosts: HostFileBlockerSet,
        resolver: Arc<dyn HostResolver>,
        options: BlockOptions,
    ) -> Self {
        Self {
            pf,
            hosts,
            resolver,
            options,
            hosts_enabled: false,
            append_mode: false,
            added: HashSet::new(),
        }
    }

    pub fn hosts(&self) -> &HostFileBlockerSet {
        &self.hosts
    }

    /// Strip leftovers of an earlier block and open a fresh hosts region.
    pub fn prepare(&mut self) -> Result<()> {
        for blocker in self.hosts.blockers() {
            if blocker.contains_block() {
                warn!("Removing stale block region from {}", blocker.path().display());
                blocker.remove_block();
                if let Err(e) = blocker.write_new_contents() {
                    warn!("{:#}", e);
                }
            }
        }

        let primary_has_region = self.hosts.primary().is_some_and(|b| b.contains_block());
        if !self.options.allowlist && !primary_has_region {
            self.hosts.create_backup()?;
            self.hosts.add_header();
            self.hosts_enabled = true;
        } else {
            self.hosts_enabled = false;
        }

        if self.options.allowlist && self.options.allow_local_networks {
            for range in LOCAL_NETWORKS {
                if let Some(entry) = parse_entry(range) {
                    self.pf.add_rule(Some(&entry.hostname), 0, entry.mask_len)?;
                }
            }
        }
        Ok(())
    }

    pub fn add_block_entries<S: AsRef<str>>(&mut self, raw: &[S]) -> Result<()> {
        for item in raw {
            self.add_block_entry_from(item.as_ref())?;
        }
        Ok(())
    }

    fn add_block_entry_from(&mut self, raw: &str) -> Result<()> {
        let Some(entry) = parse_entry(raw) else {
            debug!("Skipping unparseable entry {:?}", raw);
            return Ok(());
        };

        for related in related_entries(&entry, self.options.expansion()) {
            self.add_entry(related)?;
        }
        self.add_entry(entry)
    }

    fn add_entry(&mut self, entry: BlockEntry) -> Result<()> {
        if !self.added.insert(entry.clone()) {
            return Ok(());
        }

        let host = entry.hostname.as_str();
        let is_ip = is_valid_ip(host);

        if entry.is_wildcard() {
            if entry.mask_len > 0 {
                warn!("Ignoring mask on any-host entry {}", entry);
            }
            self.pf.add_rule(None, entry.port, 0)?;
        } else if is_ip {
            if entry.mask_len > 0 {
                // A v4 address with a v6-sized mask would break the whole anchor
                if let Err(e) = validate_ip_or_cidr(&format!("{}/{}", host, entry.mask_len)) {
                    warn!("Skipping {}: {}", entry, e);
                    return Ok(());
                }
            }
            self.pf.add_rule(Some(host), entry.port, entry.mask_len)?;
        } else if self.options.allowlist && is_google_domain(host) {
            debug!("Using fixed Google ranges for {}", host);
            for range in google_entries() {
                self.pf.add_rule(Some(&range.hostname), range.port, range.mask_len)?;
            }
        } else {
            let addresses = self.resolver.resolve(host);
            if addresses.is_empty() {
                debug!("No addresses for {}", host);
            }
            for ip in addresses {
                self.pf.add_rule(Some(&ip), entry.port, entry.mask_len)?;
            }
        }

        if self.hosts_enabled && !entry.is_wildcard() && entry.port == 0 && !is_ip {
            if self.append_mode {
                self.hosts.append_into_existing_block(host);
            } else {
                self.hosts.add_rule(host);
            }
        }
        Ok(())
    }

    /// Route new rules into the live block. Hosts files are only touched
    /// when the primary one still carries a region.
    pub fn enter_append_mode(&mut self) -> Result<()> {
        if self.options.allowlist {
            bail!("Cannot append to an allowlist block");
        }
        self.hosts_enabled = self.hosts.primary().is_some_and(|b| b.contains_block());
        if !self.hosts_enabled {
            warn!("No hosts block region found, appending to pf only");
        }
        self.append_mode = true;
        self.pf.enter_append_mode()
    }

    pub fn finish_appending(&mut self) -> Result<()> {
        if self.hosts_enabled {
            self.hosts.write_new_contents()?;
        }
        self.pf.finish_appending()?;
        self.append_mode = false;

        let code = self.pf.refresh_rules()?;
        if code != 0 {
            bail!("pfctl refresh exited with status {}", code);
        }
        Ok(())
    }

    /// Close the hosts region and turn the firewall on.
    pub fn finalize(&mut self) -> Result<()> {
        if self.hosts_enabled {
            self.hosts.add_footer();
            self.hosts.write_new_contents()?;
        }

        let code = self.pf.start_block()?;
        if code != 0 {
            bail!("pfctl exited with status {}", code);
        }
        info!("Block enforcement active ({} entries)", self.added.len());
        Ok(())
    }

    /// Tear down both mechanisms. True only when both are verified clean.
    pub fn clear_block(&mut self) -> bool {
        if let Err(e) = self.pf.stop_block(false) {
            warn!("Failed to stop pf block: {:#}", e);
        }
        let pf_clean = !self.pf.contains_block();
        if !pf_clean {
            warn!("pf.conf still references the block anchor");
        }

        self.hosts.remove_block();
        let hosts_written = match self.hosts.write_new_contents() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write hosts files: {:#}", e);
                false
            }
        };
        self.hosts.revert_to_disk();
        let hosts_clean = !self.hosts.contains_block();

        if !hosts_written || !hosts_clean {
            warn!("Hosts files not clean, restoring backups");
            if let Err(e) = self.hosts.restore_backup() {
                warn!("Failed to restore hosts backup: {:#}", e);
            }
        }

        pf_clean && hosts_written && hosts_clean
    }

    /// Either mechanism still shows block markers.
    pub fn block_is_active(&self) -> bool {
        self.hosts.contains_block() || self.pf.contains_block()
    }
}
