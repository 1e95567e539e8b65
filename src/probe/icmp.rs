use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::probe::checksum::checksum;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Payload carries the send time as a 64-bit float
pub const TIMESTAMP_PAYLOAD_SIZE: usize = 8;
/// Total echo request size
pub const ECHO_REQUEST_SIZE: usize = ICMP_HEADER_SIZE + TIMESTAMP_PAYLOAD_SIZE;

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    (std::process::id() & 0xFFFF) as u16
}

/// Build an ICMP Echo Request for this process with the current time as payload
pub fn build_echo_request(sequence: u16) -> Vec<u8> {
    build_echo_request_at(get_identifier(), sequence, SystemTime::now())
}

/// Build an ICMP Echo Request with an explicit identifier and timestamp
///
/// Layout: type 8, code 0, checksum, identifier, sequence (all big-endian),
/// followed by seconds since the Unix epoch as a big-endian `f64`.
pub fn build_echo_request_at(identifier: u16, sequence: u16, sent: SystemTime) -> Vec<u8> {
    let mut buffer = vec![0u8; ECHO_REQUEST_SIZE];

    let timestamp = sent
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    {
        // Buffer is exactly ECHO_REQUEST_SIZE, always large enough for the header
        let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) else {
            unreachable!("echo request buffer smaller than ICMP header");
        };
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_checksum(0);
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet
            .payload_mut()
            .copy_from_slice(&timestamp.to_be_bytes());
    }

    // Checksum over the provisional packet, then stored in network order
    let sum = checksum(&buffer);
    buffer[2..4].copy_from_slice(&sum.to_be_bytes());

    buffer
}
