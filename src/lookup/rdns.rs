use anyhow::{Context, Result};
use hickory_resolver::Resolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

use crate::lookup::sanitize_display;

/// Reverse DNS for hop responders
///
/// `None` means the lookup failed; callers fall back to the raw address.
pub trait ReverseLookup {
    fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

impl<L: ReverseLookup + ?Sized> ReverseLookup for &L {
    fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        (**self).reverse_lookup(ip)
    }
}

/// Blocking DNS lookup with a per-session cache
pub struct DnsLookup {
    resolver: Resolver,
    cache: RwLock<HashMap<Ipv4Addr, Option<String>>>,
}

impl DnsLookup {
    /// Use the system resolver configuration, falling back to defaults
    pub fn new() -> Result<Self> {
        let resolver = match Resolver::from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "System resolver config unavailable, using defaults");
                Resolver::new(ResolverConfig::default(), ResolverOpts::default())
                    .context("Failed to create DNS resolver")?
            }
        };

        Ok(Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
        })
    }
}

impl ReverseLookup for DnsLookup {
    fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        // Check cache first
        if let Some(hostname) = self.cache.read().get(&ip) {
            return hostname.clone();
        }

        let hostname = match self.resolver.reverse_lookup(IpAddr::V4(ip)) {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| clean_hostname(&name.to_string()))
                .filter(|name| !name.is_empty()),
            Err(e) => {
                debug!(%ip, error = %e, "Reverse lookup failed");
                None
            }
        };

        self.cache.write().insert(ip, hostname.clone());
        hostname
    }
}

/// Strip the trailing root dot and any terminal control characters
fn clean_hostname(name: &str) -> String {
    sanitize_display(name.trim_end_matches('.'))
}
