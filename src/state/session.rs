use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::time::Duration;

use crate::config::Config;
use crate::error::{TraceError, TraceResult};

/// Outcome of a single probe attempt
///
/// `elapsed == None` is a timeout; otherwise the responder is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(with = "option_duration_serde", rename = "rtt_us")]
    pub elapsed: Option<Duration>,
    pub responder: Option<Ipv4Addr>,
}

impl ProbeResult {
    pub fn timeout() -> Self {
        Self {
            elapsed: None,
            responder: None,
        }
    }

    pub fn reply(responder: Ipv4Addr, elapsed: Duration) -> Self {
        Self {
            elapsed: Some(elapsed),
            responder: Some(responder),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.elapsed.is_none()
    }
}

/// All attempts made at one TTL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopOutcome {
    pub ttl: u8,
    /// Address from the first attempt that got any reply
    pub responder: Option<Ipv4Addr>,
    /// Attempt results in the order they were made
    pub attempts: Vec<ProbeResult>,
}

impl HopOutcome {
    pub fn new(ttl: u8) -> Self {
        Self {
            ttl,
            responder: None,
            attempts: Vec::new(),
        }
    }

    /// Record an attempt; only the first reply sets the responder
    pub fn record(&mut self, result: ProbeResult) {
        if self.responder.is_none() {
            self.responder = result.responder;
        }
        self.attempts.push(result);
    }

    /// True when every attempt timed out
    pub fn all_timeouts(&self) -> bool {
        self.attempts.iter().all(ProbeResult::is_timeout)
    }
}

/// The destination as given and as resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub original: String,
    pub resolved: Ipv4Addr,
}

impl Target {
    pub fn new(original: String, resolved: Ipv4Addr) -> Self {
        Self { original, resolved }
    }

    /// Resolve a hostname or literal IPv4 address, once
    pub fn resolve(host: &str) -> TraceResult<Self> {
        let resolved = resolve_ipv4(host)?;
        Ok(Self::new(host.to_string(), resolved))
    }
}

fn resolve_ipv4(host: &str) -> TraceResult<Ipv4Addr> {
    let host = host.trim();

    // Try parsing as IP address first
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(TraceError::NoIpv4Address {
                host: host.to_string(),
            }),
        };
    }

    if host.is_empty() {
        return Err(TraceError::Resolution {
            host: host.to_string(),
            reason: "empty hostname".into(),
        });
    }

    let addrs = (host, 0u16)
        .to_socket_addrs()
        .map_err(|e| TraceError::Resolution {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| TraceError::NoIpv4Address {
            host: host.to_string(),
        })
}

/// Immutable parameters of one trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSession {
    pub target: Target,
    pub config: Config,
}

impl TraceSession {
    pub fn new(target: Target, config: Config) -> Self {
        Self { target, config }
    }

    /// Resolve the destination and build the session
    pub fn resolve(host: &str, config: Config) -> TraceResult<Self> {
        Ok(Self::new(Target::resolve(host)?, config))
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.target.resolved
    }
}

/// How a trace that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceStatus {
    /// The destination answered at this TTL
    Reached { ttl: u8 },
    /// Every TTL up to max_hops was probed without reaching the destination
    Exhausted { max_hops: u8 },
}

impl TraceStatus {
    pub fn reached(&self) -> bool {
        matches!(self, Self::Reached { .. })
    }
}

/// Serializable record of a finished trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub config: Config,
    pub hops: Vec<HopRecord>,
    pub status: Option<TraceStatus>,
    /// Set when the trace was aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceRecord {
    pub fn new(session: &TraceSession) -> Self {
        Self {
            target: session.target.clone(),
            started_at: Utc::now(),
            config: session.config.clone(),
            hops: Vec::new(),
            status: None,
            error: None,
        }
    }
}

/// A reported hop together with its reverse DNS name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopRecord {
    #[serde(flatten)]
    pub outcome: HopOutcome,
    pub hostname: Option<String>,
}

/// Serde helper for optional Duration (microseconds, null for timeout)
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_micros() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = Option::<u64>::deserialize(deserializer)?;
        Ok(micros.map(Duration::from_micros))
    }
}
