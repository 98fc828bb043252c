//! Forward DNS resolution for blocklist hostnames.
//!
//! pf rules are address based, so every hostname entry is resolved to its
//! A/AAAA records at the time the block is built.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Lookups slower than this are logged.
const SLOW_LOOKUP_THRESHOLD: Duration = Duration::from_millis(2500);

#[cfg_attr(test, automock)]
pub trait HostResolver: Send + Sync {
    /// All addresses for `host` as strings. Empty on failure.
    fn resolve(&self, host: &str) -> Vec<String>;
}

/// Resolver backed by the system's `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, host: &str) -> Vec<String> {
        if host.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        let result = dns_lookup::lookup_host(host);
        let elapsed = started.elapsed();

        if elapsed > SLOW_LOOKUP_THRESHOLD {
            warn!(
                "Resolving {} took {:.2}s",
                host,
                elapsed.as_secs_f64()
            );
        }

        match result {
            Ok(addrs) => {
                let mut out: Vec<String> = Vec::with_capacity(addrs.len());
                for addr in addrs {
                    let s = addr.to_string();
                    if !out.contains(&s) {
                        out.push(s);
                    }
                }
                out
            }
            Err(e) => {
                debug!("Failed to resolve {}: {}", host, e);
                Vec::new()
            }
        }
    }
}
