//! Related-entry expansion.
//!
//! A best-effort, deliberately incomplete table of extra endpoints that
//! should go along with a user's entry: the `www.` twin of every hostname
//! and a few hard-coded services whose traffic does not go to the domain
//! the user typed. Matching is by domain suffix.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::blocklist::{parse_entry, BlockEntry};
use crate::validation::is_valid_ip;
use tracing::debug;

struct RelatedRule {
    suffix: &'static str,
    extra: &'static [&'static str],
}

const RELATED_TABLE: &[RelatedRule] = &[
    RelatedRule {
        suffix: "facebook.com",
        extra: FACEBOOK_RANGES,
    },
    RelatedRule {
        suffix: "twitter.com",
        extra: &["api.twitter.com"],
    },
    RelatedRule {
        suffix: "netflix.com",
        extra: &["assets.nflxext.com", "codex.nflxext.com", "nflxext.com"],
    },
];

const FACEBOOK_RANGES: &[&str] = &[
    "31.13.24.0/21",
    "31.13.64.0/18",
    "45.64.40.0/22",
    "66.220.144.0/20",
    "69.63.176.0/20",
    "69.171.224.0/19",
    "74.119.76.0/22",
    "102.132.96.0/20",
    "103.4.96.0/22",
    "129.134.0.0/16",
    "147.75.208.0/20",
    "157.240.0.0/16",
    "173.252.64.0/18",
    "179.60.192.0/22",
    "185.60.216.0/22",
    "185.89.216.0/22",
    "199.201.64.0/22",
    "204.15.20.0/22",
];

/// Published Google ranges. In allowlist mode these replace DNS answers for
/// Google-family hostnames, which rotate too quickly to pin by lookup.
pub const GOOGLE_RANGES: &[&str] = &[
    "8.8.4.0/24",
    "8.34.208.0/20",
    "8.35.192.0/20",
    "23.236.48.0/20",
    "23.251.128.0/19",
    "34.64.0.0/10",
    "34.128.0.0/10",
    "35.184.0.0/13",
    "35.192.0.0/14",
    "35.196.0.0/15",
    "35.198.0.0/16",
    "35.199.0.0/17",
    "35.199.128.0/18",
    "35.200.0.0/13",
    "35.208.0.0/12",
    "35.224.0.0/12",
    "35.240.0.0/13",
    "64.15.112.0/20",
    "64.233.160.0/19",
    "66.102.0.0/20",
    "66.249.64.0/19",
    "70.32.128.0/19",
    "72.14.192.0/18",
    "74.114.24.0/21",
    "74.125.0.0/16",
    "104.154.0.0/16",
    "104.196.0.0/14",
    "104.237.160.0/19",
    "107.167.160.0/19",
    "107.178.192.0/18",
    "108.59.80.0/20",
    "108.170.192.0/18",
    "108.177.0.0/17",
    "130.211.0.0/16",
    "136.112.0.0/12",
    "142.250.0.0/15",
    "146.148.0.0/17",
    "162.216.148.0/22",
    "162.222.176.0/21",
    "172.110.32.0/21",
    "172.217.0.0/16",
    "172.253.0.0/16",
    "173.194.0.0/16",
    "173.255.112.0/20",
    "192.158.28.0/22",
    "192.178.0.0/15",
    "193.186.4.0/24",
    "199.36.154.0/23",
    "199.36.156.0/24",
    "199.192.112.0/22",
    "199.223.232.0/21",
    "207.223.160.0/20",
    "208.65.152.0/22",
    "208.68.108.0/22",
    "208.81.188.0/22",
    "208.117.224.0/19",
    "209.85.128.0/17",
    "216.58.192.0/19",
    "216.73.80.0/20",
    "216.239.32.0/19",
    "2001:4860::/32",
    "2404:6800::/32",
    "2404:f340::/32",
];

/// Which expansions to apply.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionOptions {
    pub common_subdomains: bool,
    pub linked_domains: bool,
}

/// Entries that should be enforced alongside `entry`.
pub fn related_entries(entry: &BlockEntry, options: ExpansionOptions) -> Vec<BlockEntry> {
    let mut related = Vec::new();

    if options.linked_domains {
        related.extend(linked_domains(entry));
    }

    if options.common_subdomains && !entry.is_wildcard() && !is_valid_ip(&entry.hostname) {
        for raw in common_subdomains(&entry.hostname) {
            if let Some(parsed) = parse_entry(&raw) {
                related.push(parsed);
            }
        }
    }

    related
}

/// Extension point for following links from a page to the domains it
/// loads. Not implemented; always empty.
pub fn linked_domains(entry: &BlockEntry) -> Vec<BlockEntry> {
    debug!("Linked-domain expansion requested for {} (not implemented)", entry.hostname);
    Vec::new()
}

fn common_subdomains(host: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for rule in RELATED_TABLE {
        if host.ends_with(rule.suffix) {
            out.extend(rule.extra.iter().map(|s| s.to_string()));
        }
    }

    match host.strip_prefix("www.") {
        Some(bare) => out.push(bare.to_string()),
        None => out.push(format!("www.{}", host)),
    }

    out.dedup();
    out
}

/// `(<label>.)*(google|youtube|...).<tld>[.<cc>]` where the TLD and
/// country parts are 1-3 ASCII letters.
static GOOGLE_DOMAIN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]+\.)*(google|youtube|picasa|sketchup|blogger|blogspot)\.([a-z]{1,3})(\.[a-z]{1,3})?$")
        .ok()
});

/// Hostname is one of Google's properties.
pub fn is_google_domain(host: &str) -> bool {
    GOOGLE_DOMAIN.as_ref().is_some_and(|re| re.is_match(host))
}

/// The Google ranges as entries.
pub fn google_entries() -> Vec<BlockEntry> {
    GOOGLE_RANGES.iter().filter_map(|r| parse_entry(r)).collect()
}
