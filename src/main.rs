use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hoptrace::cli::Args;
use hoptrace::config::Config;
use hoptrace::export::{JsonReporter, Reporter, TextReporter};
use hoptrace::lookup::{DnsLookup, ReverseLookup};
use hoptrace::probe::IcmpProber;
use hoptrace::TraceError;
use hoptrace::trace::trace;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; RUST_LOG wins over -v
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_args(&args).map_err(anyhow::Error::msg)?;
    config.validate().map_err(anyhow::Error::msg)?;

    let target = match args.target.clone() {
        Some(target) => target,
        None => read_target(io::stdin().lock())?,
    };

    // Resolver only when names will be shown
    let dns = if config.resolve_hostnames {
        Some(DnsLookup::new()?)
    } else {
        None
    };
    let names = dns.as_ref().map(|d| d as &dyn ReverseLookup);

    let prober = IcmpProber::new(config.match_replies);
    let stdout = io::stdout().lock();
    let mut reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonReporter::new(stdout))
    } else {
        Box::new(TextReporter::new(stdout))
    };

    match trace(&target, config, prober, names, reporter.as_mut()) {
        Ok(_) => Ok(ExitCode::SUCCESS),
        // The report itself could not be written, so nothing was shown
        Err(e @ TraceError::Report(_)) => {
            Err(anyhow::Error::new(e).context(format!("Trace to {} failed", target.trim())))
        }
        Err(e) => {
            debug!(error = %e, "Trace aborted; already reported");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Read the destination from a single line of input
fn read_target<R: BufRead>(mut input: R) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read target from stdin")?;
    let target = line.trim();
    if target.is_empty() {
        anyhow::bail!("No target specified");
    }
    Ok(target.to_string())
}
