//! Centralized validation functions for SkyControl.
//!
//! This module provides unified validation for:
//! - IP address literals (deciding between DNS resolution and direct rules)
//! - pf anchor names
//! - Block durations from the CLI

use anyhow::{bail, Result};
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Longest block a single `start` may request: one week.
pub const MAX_BLOCK_MINUTES: u64 = 7 * 24 * 60;

/// True if `value` is a dotted-quad IPv4 literal.
///
/// # Examples
/// ```
/// use skycontrol::validation::is_valid_ipv4;
/// assert!(is_valid_ipv4("10.0.0.1"));
/// assert!(!is_valid_ipv4("10.0.0"));
/// ```
pub fn is_valid_ipv4(value: &str) -> bool {
    value.parse::<Ipv4Addr>().is_ok()
}

/// True if `value` is an IPv6 literal (no brackets, no zone id).
pub fn is_valid_ipv6(value: &str) -> bool {
    value.parse::<Ipv6Addr>().is_ok()
}

/// True if `value` is either an IPv4 or an IPv6 literal.
///
/// # Examples
/// ```
/// use skycontrol::validation::is_valid_ip;
/// assert!(is_valid_ip("192.168.1.1"));
/// assert!(is_valid_ip("::1"));
/// assert!(!is_valid_ip("example.com"));
/// ```
pub fn is_valid_ip(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

/// Validate an IP address or CIDR string and return the parsed IpNet.
///
/// A plain address becomes a /32 (IPv4) or /128 (IPv6) network.
pub fn validate_ip_or_cidr(ip_str: &str) -> Result<IpNet> {
    if ip_str.contains('/') {
        ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", ip_str))
    } else {
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))?;
        Ok(IpNet::from(ip))
    }
}

/// Validate a pf anchor name.
///
/// The name is interpolated into pf.conf and into the anchor file path,
/// so only `[A-Za-z0-9._-]` is allowed and it may not start with a dot.
pub fn validate_anchor_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Anchor name cannot be empty");
    }
    if name.len() > 64 {
        bail!("Anchor name '{}' is too long (max 64 characters)", name);
    }
    if name.starts_with('.') {
        bail!("Anchor name '{}' cannot start with '.'", name);
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        bail!("Anchor name '{}' contains invalid character '{}'", name, bad);
    }
    Ok(())
}

/// Validate a block length in minutes.
pub fn validate_block_minutes(minutes: u64) -> Result<()> {
    if minutes == 0 {
        bail!("Block length must be at least one minute");
    }
    if minutes > MAX_BLOCK_MINUTES {
        bail!(
            "Block length of {} minutes exceeds the maximum of {} minutes",
            minutes,
            MAX_BLOCK_MINUTES
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_literals() {
        assert!(is_valid_ipv4("1.2.3.4"));
        assert!(is_valid_ipv4("0.0.0.0"));
        assert!(is_valid_ipv4("255.255.255.255"));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.2.3.4/24"));
        assert!(!is_valid_ipv4("::1"));
        assert!(!is_valid_ipv4(""));
    }

    #[test]
    fn test_ipv6_literals() {
        assert!(is_valid_ipv6("::1"));
        assert!(is_valid_ipv6("2001:4860::"));
        assert!(is_valid_ipv6("fe80::1"));
        assert!(!is_valid_ipv6("1.2.3.4"));
        assert!(!is_valid_ipv6("[::1]"));
        assert!(!is_valid_ipv6("example.com"));
    }

    #[test]
    fn test_is_valid_ip_either_family() {
        assert!(is_valid_ip("8.8.8.8"));
        assert!(is_valid_ip("2404:6800::"));
        assert!(!is_valid_ip("*"));
        assert!(!is_valid_ip("www.google.com"));
    }

    #[test]
    fn test_validate_ip_or_cidr() {
        let net = validate_ip_or_cidr("192.168.0.0/24").unwrap();
        assert_eq!(net.prefix_len(), 24);

        let single = validate_ip_or_cidr("10.0.0.1").unwrap();
        assert_eq!(single.prefix_len(), 32);

        let v6 = validate_ip_or_cidr("2001:4860::/32").unwrap();
        assert_eq!(v6.prefix_len(), 32);

        assert!(validate_ip_or_cidr("10.0.0.0/33").is_err());
        assert!(validate_ip_or_cidr("not-an-ip").is_err());
    }

    #[test]
    fn test_anchor_name_valid() {
        assert!(validate_anchor_name("com.skynet").is_ok());
        assert!(validate_anchor_name("sky_control-1").is_ok());
    }

    #[test]
    fn test_anchor_name_invalid() {
        assert!(validate_anchor_name("").is_err());
        assert!(validate_anchor_name(".hidden").is_err());
        assert!(validate_anchor_name("com/skynet").is_err());
        assert!(validate_anchor_name("a\"b").is_err());
        assert!(validate_anchor_name("a b").is_err());
        assert!(validate_anchor_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_anchor_name_injection_attempts() {
        assert!(validate_anchor_name("x\"\npass all").is_err());
        assert!(validate_anchor_name("../../etc/passwd").is_err());
    }

    #[test]
    fn test_block_minutes() {
        assert!(validate_block_minutes(1).is_ok());
        assert!(validate_block_minutes(MAX_BLOCK_MINUTES).is_ok());
        assert!(validate_block_minutes(0).is_err());
        assert!(validate_block_minutes(MAX_BLOCK_MINUTES + 1).is_err());
    }
}
