use std::io::{self, Write};
use std::time::Duration;

use crate::error::TraceError;
use crate::state::{HopOutcome, TraceSession, TraceStatus};

/// Marker for replies faster than one millisecond
pub const SUB_MILLISECOND: &str = "<1 ms";
/// Marker for a timed out attempt
pub const TIMEOUT_MARKER: &str = "*";

/// Format one attempt's latency: `*`, `<1 ms`, or whole milliseconds
///
/// Halves round to even, so 2.5 ms prints as "2 ms".
pub fn format_ping_time(elapsed: Option<Duration>) -> String {
    match elapsed {
        None => TIMEOUT_MARKER.to_string(),
        Some(d) if d < Duration::from_millis(1) => SUB_MILLISECOND.to_string(),
        Some(d) => {
            let millis = d.as_micros() as f64 / 1000.0;
            format!("{} ms", millis.round_ties_even() as u64)
        }
    }
}

/// Reverse DNS state of a hop's responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostName {
    /// Hostname resolution is off for this session
    NotRequested,
    Resolved(String),
    /// Lookup failed; show the raw address
    Unresolved,
}

impl HostName {
    pub fn as_resolved(&self) -> Option<&str> {
        match self {
            Self::Resolved(name) => Some(name),
            _ => None,
        }
    }
}

/// Everything the presentation side needs about one hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopReport {
    pub outcome: HopOutcome,
    /// Formatted latencies in attempt order
    pub latencies: Vec<String>,
    pub name: HostName,
}

impl HopReport {
    pub fn new(outcome: HopOutcome, name: HostName) -> Self {
        let latencies = outcome
            .attempts
            .iter()
            .map(|r| format_ping_time(r.elapsed))
            .collect();
        Self {
            outcome,
            latencies,
            name,
        }
    }

    /// Responder column: timeout notice, or address with optional hostname
    pub fn host_column(&self) -> String {
        match self.outcome.responder {
            Some(ip) if !self.outcome.all_timeouts() => match &self.name {
                HostName::Resolved(host) => format!("{} [{}]", host, ip),
                HostName::Unresolved => format!("{} (unresolved)", ip),
                HostName::NotRequested => ip.to_string(),
            },
            _ => "Request timed out.".to_string(),
        }
    }
}

/// Receives structured trace events and presents them
pub trait Reporter {
    fn start(&mut self, session: &TraceSession) -> io::Result<()>;

    fn hop(&mut self, report: &HopReport) -> io::Result<()>;

    fn finish(&mut self, status: TraceStatus) -> io::Result<()>;

    /// Called once when the trace aborts; the caller still gets the error
    fn fatal(&mut self, _error: &TraceError) -> io::Result<()> {
        Ok(())
    }
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn start(&mut self, session: &TraceSession) -> io::Result<()> {
        (**self).start(session)
    }

    fn hop(&mut self, report: &HopReport) -> io::Result<()> {
        (**self).hop(report)
    }

    fn finish(&mut self, status: TraceStatus) -> io::Result<()> {
        (**self).finish(status)
    }

    fn fatal(&mut self, error: &TraceError) -> io::Result<()> {
        (**self).fatal(error)
    }
}

/// Classic line-per-hop traceroute output
pub struct TextReporter<W: Write> {
    writer: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn start(&mut self, session: &TraceSession) -> io::Result<()> {
        writeln!(
            self.writer,
            "Tracing route to {} [{}] over a maximum of {} hops:",
            session.target.original, session.target.resolved, session.config.max_hops
        )?;
        self.writer.flush()
    }

    fn hop(&mut self, report: &HopReport) -> io::Result<()> {
        let mut line = format!("{:>2}  ", report.outcome.ttl);
        for latency in &report.latencies {
            line.push_str(latency);
            line.push_str("  ");
        }
        line.push_str(&report.host_column());

        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }

    fn finish(&mut self, status: TraceStatus) -> io::Result<()> {
        if status.reached() {
            writeln!(self.writer)?;
        }
        writeln!(self.writer, "Trace complete.")?;
        self.writer.flush()
    }

    fn fatal(&mut self, error: &TraceError) -> io::Result<()> {
        writeln!(self.writer, "{}", error)?;
        self.writer.flush()
    }
}
