use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Trace the route to a host with TTL-stepped ICMP echo requests
#[derive(Parser, Debug, Clone)]
#[command(name = "hoptrace")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host (IPv4 address or hostname); read from stdin when omitted
    pub target: Option<String>,

    /// Maximum number of hops
    #[arg(short = 'm', long = "max-hops")]
    pub max_hops: Option<u8>,

    /// Seconds to wait for each reply
    #[arg(short = 'w', long = "timeout")]
    pub timeout: Option<f64>,

    /// Probes per hop
    #[arg(short = 'q', long = "queries")]
    pub queries: Option<u8>,

    /// Seconds to pause between probes of the same hop
    #[arg(long = "pause")]
    pub pause: Option<f64>,

    /// Resolve responder addresses to hostnames
    #[arg(short = 'r', long = "resolve")]
    pub resolve: bool,

    /// Accept any time-exceeded or echo reply, without matching identifier/sequence
    #[arg(long = "no-match")]
    pub no_match: bool,

    /// Print the finished trace as JSON instead of streaming lines
    #[arg(long = "json")]
    pub json: bool,

    /// Config file (default: ~/.config/hoptrace/config.toml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Log filter directive for the chosen verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Validate arguments that config validation cannot see
    pub fn validate(&self) -> Result<(), String> {
        if let Some(timeout) = self.timeout
            && !(timeout.is_finite() && timeout > 0.0)
        {
            return Err("Timeout must be positive".into());
        }

        if let Some(pause) = self.pause
            && !(pause.is_finite() && pause >= 0.0)
        {
            return Err("Pause cannot be negative".into());
        }

        if let Some(ref target) = self.target
            && target.trim().is_empty()
        {
            return Err("Target cannot be empty".into());
        }

        Ok(())
    }
}
