use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::{TraceError, TraceResult};
use crate::probe::correlate::{Reply, ReplyFilter, parse_reply};
use crate::probe::icmp::{build_echo_request, get_identifier};
use crate::state::ProbeResult;

/// Large enough for any reply we care about (IP header + ICMP + quoted datagram)
const RECV_BUFFER_SIZE: usize = 1500;

/// Create a raw IPv4 ICMP socket
///
/// Requires CAP_NET_RAW (or root); a refusal maps to `TraceError::PermissionDenied`.
pub fn create_raw_icmp_socket() -> TraceResult<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(TraceError::from_socket_creation)?;
    socket
        .set_nonblocking(false)
        .map_err(TraceError::SocketCreation)?;
    Ok(socket)
}

/// Set TTL on a socket
pub fn set_ttl(socket: &Socket, ttl: u8) -> TraceResult<()> {
    socket
        .set_ttl(ttl as u32)
        .map_err(|source| TraceError::SetTtl { ttl, source })
}

/// Send ICMP packet to target
pub fn send_icmp(socket: &Socket, packet: &[u8], target: Ipv4Addr, ttl: u8) -> TraceResult<usize> {
    let addr = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(target, 0)));
    socket
        .send_to(packet, &addr)
        .map_err(|source| TraceError::Send { ttl, source })
}

/// One in-flight echo request
///
/// Owns its socket; the socket is closed when the probe is dropped, whichever
/// way the attempt ends.
#[derive(Debug)]
pub struct Probe {
    socket: Socket,
    pub ttl: u8,
    pub identifier: u16,
    pub sequence: u16,
    pub sent_at: Instant,
}

/// Open a dedicated socket, set its TTL, and send one echo request
///
/// The sequence number is the TTL itself.
pub fn send_probe(destination: Ipv4Addr, ttl: u8) -> TraceResult<Probe> {
    let socket = create_raw_icmp_socket()?;
    set_ttl(&socket, ttl)?;

    let sequence = ttl as u16;
    let packet = build_echo_request(sequence);
    let sent_at = Instant::now();
    send_icmp(&socket, &packet, destination, ttl)?;

    trace!(ttl, %destination, bytes = packet.len(), "Sent echo request");

    Ok(Probe {
        socket,
        ttl,
        identifier: get_identifier(),
        sequence,
        sent_at,
    })
}

impl Probe {
    /// Filter that ties replies to this probe's identifier and sequence
    pub fn filter(&self, match_replies: bool) -> ReplyFilter {
        if match_replies {
            ReplyFilter::Matching {
                identifier: self.identifier,
                sequence: self.sequence,
            }
        } else {
            ReplyFilter::Permissive
        }
    }

    /// Wait up to `timeout` for a time-exceeded or echo reply
    pub fn receive_reply(&mut self, timeout: Duration, filter: &ReplyFilter) -> TraceResult<ProbeResult> {
        receive_within(&mut self.socket, self.ttl, self.sent_at, timeout, filter)
    }
}

/// Shortest wait a socket read timeout can express; a smaller budget is spent
///
/// The kernel takes a zero timeval as "block forever".
pub const MIN_READ_TIMEOUT: Duration = Duration::from_micros(1);

/// Something ICMP datagrams can be read from with a bounded wait
pub trait ReplySource {
    /// Read one datagram, waiting at most `timeout` (never below `MIN_READ_TIMEOUT`)
    fn recv_within(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

impl ReplySource for Socket {
    fn recv_within(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.set_read_timeout(Some(timeout))?;
        Read::read(self, buf)
    }
}

/// Read from `source` until a reply the filter accepts arrives or `timeout` runs out
///
/// A raw socket sees every ICMP datagram arriving at the host. Anything the
/// filter rejects is skipped and the wait resumes with whatever budget
/// remains, so unrelated traffic never extends the total wait beyond
/// `timeout` and never ends it early.
pub fn receive_within<S: ReplySource + ?Sized>(
    source: &mut S,
    ttl: u8,
    sent_at: Instant,
    timeout: Duration,
    filter: &ReplyFilter,
) -> TraceResult<ProbeResult> {
    let deadline = Instant::now() + timeout;
    let mut buffer = [0u8; RECV_BUFFER_SIZE];
    let mut skipped = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining < MIN_READ_TIMEOUT {
            debug!(ttl, skipped, "Probe timed out");
            return Ok(ProbeResult::timeout());
        }

        let len = match source.recv_within(&mut buffer, remaining) {
            Ok(len) => len,
            Err(e) if is_timeout(&e) => {
                debug!(ttl, skipped, "Probe timed out");
                return Ok(ProbeResult::timeout());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(TraceError::Receive { ttl, source }),
        };
        let received_at = Instant::now();

        match parse_reply(&buffer[..len], filter) {
            Reply::Unrelated => {
                skipped += 1;
                trace!(ttl, len, "Skipping unrelated ICMP packet");
            }
            reply => {
                let elapsed = received_at.duration_since(sent_at);
                debug!(ttl, ?reply, rtt_ms = elapsed.as_secs_f64() * 1000.0, "Received reply");
                return Ok(ProbeResult {
                    elapsed: Some(elapsed),
                    responder: reply.responder(),
                });
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Sends one probe and waits for its reply
///
/// The seam between hop orchestration and the network.
pub trait Prober {
    fn probe(&mut self, destination: Ipv4Addr, ttl: u8, timeout: Duration) -> TraceResult<ProbeResult>;
}

impl<P: Prober + ?Sized> Prober for &mut P {
    fn probe(&mut self, destination: Ipv4Addr, ttl: u8, timeout: Duration) -> TraceResult<ProbeResult> {
        (**self).probe(destination, ttl, timeout)
    }
}

/// Prober backed by a fresh raw ICMP socket per attempt
#[derive(Debug, Clone, Copy)]
pub struct IcmpProber {
    match_replies: bool,
}

impl IcmpProber {
    pub fn new(match_replies: bool) -> Self {
        Self { match_replies }
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Prober for IcmpProber {
    fn probe(&mut self, destination: Ipv4Addr, ttl: u8, timeout: Duration) -> TraceResult<ProbeResult> {
        let mut probe = send_probe(destination, ttl)?;
        let filter = probe.filter(self.match_replies);
        probe.receive_reply(timeout, &filter)
    }
}
