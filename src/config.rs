//! Trace settings.
//!
//! Defaults can be overridden from ~/.config/hoptrace/config.toml, and the
//! command line overrides both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Args;

/// Upper bound on hops to keep a run bounded
pub const MAX_SAFE_HOPS: u8 = 64;
/// Upper bound on attempts per hop
pub const MAX_PINGS_PER_HOP: u8 = 10;
/// Longest accepted wait per attempt
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60);
/// Longest accepted pause between attempts
pub const MAX_PAUSE: Duration = Duration::from_secs(10);

/// Runtime configuration for one trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum TTL
    pub max_hops: u8,
    /// Wait budget per attempt
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Attempts per hop
    pub pings_per_hop: u8,
    /// Delay between attempts within a hop
    #[serde(with = "duration_serde")]
    pub pause: Duration,
    /// Reverse DNS lookup of responders
    pub resolve_hostnames: bool,
    /// Only accept replies carrying our identifier and sequence
    pub match_replies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_hops: 30,
            timeout: Duration::from_secs(3),
            pings_per_hop: 3,
            pause: Duration::from_secs(1),
            resolve_hostnames: false,
            match_replies: true,
        }
    }
}

impl Config {
    /// Default config file path: ~/.config/hoptrace/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hoptrace").join("config.toml"))
    }

    /// Parse a TOML config file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from an explicit path, or from the default path if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply command line overrides
    pub fn apply_args(&mut self, args: &Args) -> Result<(), String> {
        if let Some(max_hops) = args.max_hops {
            self.max_hops = max_hops;
        }
        if let Some(timeout) = args.timeout {
            self.timeout = seconds(timeout, "Timeout")?;
        }
        if let Some(queries) = args.queries {
            self.pings_per_hop = queries;
        }
        if let Some(pause) = args.pause {
            self.pause = seconds(pause, "Pause")?;
        }
        if args.resolve {
            self.resolve_hostnames = true;
        }
        if args.no_match {
            self.match_replies = false;
        }
        Ok(())
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), String> {
        if self.max_hops == 0 {
            return Err("Max hops must be at least 1".into());
        }
        if self.max_hops > MAX_SAFE_HOPS {
            return Err(format!("Max hops cannot exceed {}", MAX_SAFE_HOPS));
        }
        if self.pings_per_hop == 0 {
            return Err("Queries per hop must be at least 1".into());
        }
        if self.pings_per_hop > MAX_PINGS_PER_HOP {
            return Err(format!("Queries per hop cannot exceed {}", MAX_PINGS_PER_HOP));
        }
        if self.timeout.is_zero() {
            return Err("Timeout must be positive".into());
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(format!("Timeout cannot exceed {}s", MAX_TIMEOUT.as_secs()));
        }
        if self.pause > MAX_PAUSE {
            return Err(format!("Pause cannot exceed {}s", MAX_PAUSE.as_secs()));
        }
        Ok(())
    }
}

/// Convert a command line seconds value; range checks happen in `validate`
fn seconds(value: f64, what: &str) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|_| format!("{} out of range: {}", what, value))
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_hops, 30);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.pings_per_hop, 3);
        assert_eq!(config.pause, Duration::from_secs(1));
        assert!(!config.resolve_hostnames);
        assert!(config.match_replies);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("max_hops = 12\ntimeout = 0.5\n").unwrap();
        assert_eq!(config.max_hops, 12);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.pings_per_hop, 3);
        assert!(config.match_replies);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            resolve_hostnames: true,
            pause: Duration::ZERO,
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("resolve_hostnames = true"));
        let loaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(toml::from_str::<Config>("timeout = -1.0").is_err());
    }

    #[test]
    fn test_from_path_missing_file() {
        let path = std::env::temp_dir().join("hoptrace-no-such-dir").join("config.toml");
        let err = Config::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_from_path_reads_file() {
        let path = std::env::temp_dir().join(format!("hoptrace-config-{}.toml", std::process::id()));
        fs::write(&path, "pings_per_hop = 5\nresolve_hostnames = true\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.pings_per_hop, 5);
        assert!(config.resolve_hostnames);
    }

    #[test]
    fn test_args_override_file() {
        let args = Args::parse_from(["hoptrace", "-m", "5", "-q", "1", "-w", "0.25", "-r", "--no-match", "example.com"]);
        let mut config = Config {
            max_hops: 20,
            ..Config::default()
        };
        config.apply_args(&args).unwrap();

        assert_eq!(config.max_hops, 5);
        assert_eq!(config.pings_per_hop, 1);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.resolve_hostnames);
        assert!(!config.match_replies);
        // Untouched values keep their file setting
        assert_eq!(config.pause, Duration::from_secs(1));
    }

    #[test]
    fn test_huge_durations_rejected_not_panicking() {
        let args = Args::parse_from(["hoptrace", "-w", "1e20", "example.com"]);
        let err = Config::default().apply_args(&args).unwrap_err();
        assert!(err.contains("Timeout"));

        let args = Args::parse_from(["hoptrace", "--pause", "1e20", "example.com"]);
        assert!(Config::default().apply_args(&args).is_err());

        // In range for Duration but past the cap: validate rejects it
        let args = Args::parse_from(["hoptrace", "-w", "120", "example.com"]);
        let mut config = Config::default();
        config.apply_args(&args).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds() {
        let bad = [
            Config { max_hops: 0, ..Config::default() },
            Config { max_hops: 65, ..Config::default() },
            Config { pings_per_hop: 0, ..Config::default() },
            Config { pings_per_hop: 11, ..Config::default() },
            Config { timeout: Duration::ZERO, ..Config::default() },
            Config { timeout: Duration::from_secs(61), ..Config::default() },
            Config { pause: Duration::from_secs(11), ..Config::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }

        let edge = Config {
            max_hops: MAX_SAFE_HOPS,
            pings_per_hop: MAX_PINGS_PER_HOP,
            pause: Duration::ZERO,
            ..Config::default()
        };
        assert!(edge.validate().is_ok());
    }
}
