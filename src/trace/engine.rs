use tracing::{debug, info};

use crate::config::Config;
use crate::error::{TraceError, TraceResult};
use crate::export::{HopReport, HostName, Reporter};
use crate::lookup::ReverseLookup;
use crate::probe::Prober;
use crate::state::{HopOutcome, TraceSession, TraceStatus};
use crate::trace::hop::probe_hop;

/// Drives the TTL loop for one session
///
/// Hops run one at a time from TTL 1. The trace stops after the hop whose
/// responder is the destination, after `max_hops`, or on the first
/// transport error.
pub struct Tracer<'a, P: Prober> {
    session: &'a TraceSession,
    prober: P,
    names: Option<&'a dyn ReverseLookup>,
}

impl<'a, P: Prober> Tracer<'a, P> {
    pub fn new(session: &'a TraceSession, prober: P) -> Self {
        Self {
            session,
            prober,
            names: None,
        }
    }

    /// Reverse lookup used when the session asks for hostnames
    pub fn with_names(mut self, names: &'a dyn ReverseLookup) -> Self {
        self.names = Some(names);
        self
    }

    /// Run the trace, feeding every hop to `reporter`
    pub fn run<R: Reporter + ?Sized>(&mut self, reporter: &mut R) -> TraceResult<TraceStatus> {
        let session = self.session;
        let destination = session.destination();
        let max_hops = session.config.max_hops;

        reporter.start(session).map_err(TraceError::Report)?;
        info!(host = %session.target.original, %destination, max_hops, "Starting trace");

        for ttl in 1..=max_hops {
            let outcome = match probe_hop(&mut self.prober, destination, ttl, &session.config) {
                Ok(outcome) => outcome,
                Err(e) => {
                    debug!(ttl, error = %e, "Fatal error, aborting trace");
                    reporter.fatal(&e).map_err(TraceError::Report)?;
                    return Err(e);
                }
            };

            let reached = outcome.responder == Some(destination);
            let name = self.host_name(&outcome);
            reporter
                .hop(&HopReport::new(outcome, name))
                .map_err(TraceError::Report)?;

            if reached {
                debug!(ttl, "Reached destination, stopping");
                let status = TraceStatus::Reached { ttl };
                reporter.finish(status).map_err(TraceError::Report)?;
                return Ok(status);
            }
        }

        debug!(max_hops, "Max hops exhausted without reaching destination");
        let status = TraceStatus::Exhausted { max_hops };
        reporter.finish(status).map_err(TraceError::Report)?;
        Ok(status)
    }

    fn host_name(&self, outcome: &HopOutcome) -> HostName {
        if !self.session.config.resolve_hostnames {
            return HostName::NotRequested;
        }
        let (Some(ip), Some(names)) = (outcome.responder, self.names) else {
            return HostName::NotRequested;
        };
        match names.reverse_lookup(ip) {
            Some(host) => HostName::Resolved(host),
            None => HostName::Unresolved,
        }
    }
}

/// Resolve `host` once, then trace it
///
/// A resolution failure is reported through `reporter.fatal` before any
/// probe is sent.
pub fn trace<P, R>(
    host: &str,
    config: Config,
    prober: P,
    names: Option<&dyn ReverseLookup>,
    reporter: &mut R,
) -> TraceResult<(TraceSession, TraceStatus)>
where
    P: Prober,
    R: Reporter + ?Sized,
{
    let session = match TraceSession::resolve(host, config) {
        Ok(session) => session,
        Err(e) => {
            debug!(host, error = %e, "Resolution failed");
            reporter.fatal(&e).map_err(TraceError::Report)?;
            return Err(e);
        }
    };

    let status = {
        let mut tracer = Tracer::new(&session, prober);
        if let Some(names) = names {
            tracer = tracer.with_names(names);
        }
        tracer.run(reporter)?
    };

    Ok((session, status))
}
