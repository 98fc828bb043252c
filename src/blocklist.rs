//! Blocklist entry normalization and parsing.
//!
//! User input goes through two stages. [`normalize`] is lossy but never
//! fails: anything it cannot make sense of degrades to an empty result.
//! [`parse_entry`] then turns one normalized token into a [`BlockEntry`].
//!
//! Canonical token form is `host[/mask][:port]`, e.g. `example.com`,
//! `10.0.0.0/8`, `example.com:443`, `:53` (any host, port 53).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Hostnames are capped at the DNS limit.
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Hostname value that matches any destination.
pub const WILDCARD_HOST: &str = "*";

/// One enforceable endpoint.
///
/// `port == 0` means any port, `mask_len == 0` means a single host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockEntry {
    pub hostname: String,
    pub port: u16,
    pub mask_len: u8,
}

impl BlockEntry {
    pub fn new(hostname: impl Into<String>, port: u16, mask_len: u8) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            mask_len,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.hostname == WILDCARD_HOST
    }
}

impl fmt::Display for BlockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hostname)?;
        if self.mask_len > 0 {
            write!(f, "/{}", self.mask_len)?;
        }
        if self.port > 0 {
            write!(f, ":{}", self.port)?;
        }
        Ok(())
    }
}

/// Normalize one raw user string into zero or more canonical tokens.
///
/// Multi-line input is split and each line normalized on its own.
pub fn normalize(raw: &str) -> Vec<String> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return Vec::new();
    }

    if s.contains(['\n', '\r']) {
        return s.lines().flat_map(normalize).collect();
    }

    let mut s = s.as_str();

    // scheme://
    if let Some(idx) = s.find("://") {
        s = &s[idx + 3..];
    }

    // user:pass@
    if let Some(idx) = s.rfind('@') {
        s = &s[idx + 1..];
    }

    let mut mask: Option<u8> = None;
    let mut port: Option<u16> = None;

    let mut slash_parts = s.split('/');
    let mut host_part = slash_parts.next().unwrap_or("");
    if let Some(last) = slash_parts.last() {
        // A port may trail the mask in already-normalized input (`host/24:80`)
        let (mask_str, port_str) = match last.split_once(':') {
            Some((m, p)) => (m, Some(p)),
            None => (last, None),
        };
        mask = parse_mask(mask_str);
        if mask.is_some() {
            port = port_str.and_then(parse_port);
        }
    }

    if host_part.contains(':') {
        let mut colon_parts = host_part.split(':');
        let first = colon_parts.next().unwrap_or("");
        if let Some(p) = colon_parts.last().and_then(parse_port) {
            port = Some(p);
        }
        host_part = first;
    }

    let host: String = host_part
        .chars()
        .take(MAX_HOSTNAME_LEN)
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_'))
        .collect();

    if host.is_empty() && port.is_none() {
        return Vec::new();
    }

    let mut out = host;
    if let Some(m) = mask {
        out.push_str(&format!("/{}", m));
    }
    if let Some(p) = port {
        out.push_str(&format!(":{}", p));
    }
    vec![out]
}

/// Normalize a whole list, flattening and dropping duplicates while keeping
/// first-seen order.
pub fn normalize_list<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in raw {
        for token in normalize(item.as_ref()) {
            if seen.insert(token.clone()) {
                out.push(token);
            }
        }
    }
    out
}

/// Trim every entry and drop the empty ones.
pub fn clean_blocklist<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.as_ref().trim())
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse one normalized token into a [`BlockEntry`].
///
/// When a mask is present the port is read from the mask segment
/// (`host/24:80`), otherwise from the host segment (`host:80`). An empty
/// host is the wildcard, and a wildcard without a port is rejected since
/// it would match all traffic.
pub fn parse_entry(raw: &str) -> Option<BlockEntry> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut slash_parts = trimmed.split('/');
    let mut hostname = slash_parts.next().unwrap_or("");
    let mut mask_len = 0u8;
    let mut port = 0u16;

    match slash_parts.next() {
        Some(mask_segment) => {
            let (mask_str, port_str) = match mask_segment.split_once(':') {
                Some((m, p)) => (m, Some(p)),
                None => (mask_segment, None),
            };
            mask_len = parse_mask(mask_str).unwrap_or(0);
            if let Some(p) = port_str {
                port = first_colon_field(p).parse().unwrap_or(0);
            }
        }
        None => {
            if let Some((host, rest)) = hostname.split_once(':') {
                hostname = host;
                port = first_colon_field(rest).parse().unwrap_or(0);
            }
        }
    }

    let hostname = if hostname.is_empty() {
        WILDCARD_HOST
    } else {
        hostname
    };

    if hostname == WILDCARD_HOST && port == 0 {
        return None;
    }

    Some(BlockEntry::new(hostname, port, mask_len))
}

fn first_colon_field(s: &str) -> &str {
    s.split(':').next().unwrap_or("")
}

fn parse_mask(s: &str) -> Option<u8> {
    match s.parse::<u8>() {
        Ok(m) if (1..=128).contains(&m) => Some(m),
        _ => None,
    }
}

fn parse_port(s: &str) -> Option<u16> {
    match s.parse::<u16>() {
        Ok(p) if p >= 1 => Some(p),
        _ => None,
    }
}
