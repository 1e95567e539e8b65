use std::net::Ipv4Addr;
use std::thread;
use tracing::debug;

use crate::config::Config;
use crate::error::TraceResult;
use crate::probe::Prober;
use crate::state::HopOutcome;

/// Probe one TTL `config.pings_per_hop` times, strictly one after another
///
/// The hop's responder is taken from the first attempt that got any reply.
/// A transport error aborts the hop and is returned as is.
pub fn probe_hop<P: Prober + ?Sized>(
    prober: &mut P,
    destination: Ipv4Addr,
    ttl: u8,
    config: &Config,
) -> TraceResult<HopOutcome> {
    let mut outcome = HopOutcome::new(ttl);

    for attempt in 0..config.pings_per_hop {
        if attempt > 0 && !config.pause.is_zero() {
            thread::sleep(config.pause);
        }

        let result = prober.probe(destination, ttl, config.timeout)?;
        debug!(
            ttl,
            attempt,
            responder = ?result.responder,
            rtt_ms = result.elapsed.map(|d| d.as_secs_f64() * 1000.0),
            "Attempt finished"
        );
        outcome.record(result);
    }

    Ok(outcome)
}
