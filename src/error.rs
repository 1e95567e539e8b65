//! Error types for trace operations.
//!
//! Every variant ends the session. A probe that simply gets no answer is not
//! an error; it is reported as a timeout in the hop's results.

use std::io;
use thiserror::Error;

/// Fatal error raised while resolving, probing, or reporting a trace.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Unable to resolve target system name {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("No IPv4 address found for {host}")]
    NoIpv4Address { host: String },

    #[error(
        "Insufficient permissions for raw ICMP sockets: {0}\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo hoptrace <target>\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep $(which hoptrace)"
    )]
    PermissionDenied(#[source] io::Error),

    #[error("Failed to create raw ICMP socket: {0}")]
    SocketCreation(#[source] io::Error),

    #[error("Failed to set TTL {ttl}: {source}")]
    SetTtl {
        ttl: u8,
        #[source]
        source: io::Error,
    },

    #[error("Failed to send probe with TTL {ttl}: {source}")]
    Send {
        ttl: u8,
        #[source]
        source: io::Error,
    },

    #[error("Failed to receive reply for TTL {ttl}: {source}")]
    Receive {
        ttl: u8,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write report: {0}")]
    Report(#[source] io::Error),
}

impl TraceError {
    /// Map a socket creation failure, keeping privilege problems distinguishable.
    pub fn from_socket_creation(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(err)
        } else {
            Self::SocketCreation(err)
        }
    }

    /// True when the error happened before any probe could be sent.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. } | Self::NoIpv4Address { .. })
    }

    /// True for socket-level failures that abort a running session.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::SocketCreation(_)
                | Self::SetTtl { .. }
                | Self::Send { .. }
                | Self::Receive { .. }
        )
    }
}

/// Result type alias for trace operations.
pub type TraceResult<T> = Result<T, TraceError>;
