use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use std::net::Ipv4Addr;

use crate::probe::checksum::is_valid;
use crate::probe::icmp::ICMP_HEADER_SIZE;

/// IP protocol number for ICMP
const IPPROTO_ICMP: u8 = 1;

/// Minimum IPv4 header length (IHL = 5)
const MIN_IPV4_HEADER: usize = 20;

/// Decoded reply read from the raw socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// A router dropped the probe (type 11); carries the router's address
    TimeExceeded(Ipv4Addr),
    /// The destination answered (type 0)
    EchoReply(Ipv4Addr),
    /// Anything else the raw socket delivered: other ICMP types, other
    /// processes' traffic, truncated or malformed datagrams
    Unrelated,
}

impl Reply {
    /// Address of the host that sent a classifiable reply
    pub fn responder(&self) -> Option<Ipv4Addr> {
        match self {
            Self::TimeExceeded(ip) | Self::EchoReply(ip) => Some(*ip),
            Self::Unrelated => None,
        }
    }
}

/// Decides which replies belong to the outstanding probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFilter {
    /// Accept by ICMP type only
    Permissive,
    /// Require our identifier and the probe's sequence, either in the echo
    /// reply header or in the echo request quoted by a time-exceeded message
    Matching { identifier: u16, sequence: u16 },
}

impl ReplyFilter {
    fn accepts(&self, identifier: u16, sequence: u16) -> bool {
        match *self {
            Self::Permissive => true,
            Self::Matching {
                identifier: id,
                sequence: seq,
            } => identifier == id && sequence == seq,
        }
    }
}

/// Parse a datagram read from a raw IPv4 ICMP socket (IP header included)
pub fn parse_reply(data: &[u8], filter: &ReplyFilter) -> Reply {
    parse_reply_v4(data, filter).unwrap_or(Reply::Unrelated)
}

fn parse_reply_v4(data: &[u8], filter: &ReplyFilter) -> Option<Reply> {
    let ip_packet = Ipv4Packet::new(data)?;
    if ip_packet.get_version() != 4 || ip_packet.get_next_level_protocol().0 != IPPROTO_ICMP {
        return None;
    }

    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    if ip_header_len < MIN_IPV4_HEADER || data.len() < ip_header_len + ICMP_HEADER_SIZE {
        return None;
    }

    // Outer source is the host that generated this ICMP message
    let source = ip_packet.get_source();
    let icmp_data = &data[ip_header_len..];
    let icmp_packet = IcmpPacket::new(icmp_data)?;

    match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => {
            if let ReplyFilter::Matching { .. } = filter
                && !is_valid(icmp_data)
            {
                return None;
            }
            let identifier = u16::from_be_bytes([icmp_data[4], icmp_data[5]]);
            let sequence = u16::from_be_bytes([icmp_data[6], icmp_data[7]]);
            filter
                .accepts(identifier, sequence)
                .then_some(Reply::EchoReply(source))
        }
        IcmpTypes::TimeExceeded => {
            if let ReplyFilter::Matching { .. } = filter {
                let (identifier, sequence) = quoted_echo_request(&icmp_data[ICMP_HEADER_SIZE..])?;
                if !filter.accepts(identifier, sequence) {
                    return None;
                }
            }
            Some(Reply::TimeExceeded(source))
        }
        _ => None,
    }
}

/// Extract identifier and sequence from the echo request quoted in an ICMP error
fn quoted_echo_request(original: &[u8]) -> Option<(u16, u16)> {
    let quoted_ip = Ipv4Packet::new(original)?;
    if quoted_ip.get_next_level_protocol().0 != IPPROTO_ICMP {
        return None;
    }
    let quoted_len = (quoted_ip.get_header_length() as usize) * 4;
    if quoted_len < MIN_IPV4_HEADER {
        return None;
    }

    let quoted_icmp = original.get(quoted_len..quoted_len + ICMP_HEADER_SIZE)?;
    if quoted_icmp[0] != IcmpTypes::EchoRequest.0 {
        return None;
    }

    let identifier = u16::from_be_bytes([quoted_icmp[4], quoted_icmp[5]]);
    let sequence = u16::from_be_bytes([quoted_icmp[6], quoted_icmp[7]]);
    Some((identifier, sequence))
}


#[cfg(test)]
mod tests {
    use super::fixtures::{echo_reply, ipv4, time_exceeded};
    use super::*;
    use crate::probe::icmp::build_echo_request_at;
    use std::time::SystemTime;

    const OUR_ID: u16 = 0x4242;

    fn matching(sequence: u16) -> ReplyFilter {
        ReplyFilter::Matching {
            identifier: OUR_ID,
            sequence,
        }
    }

    #[test]
    fn test_parse_echo_reply() {
        let dest = Ipv4Addr::new(8, 8, 8, 8);
        let packet = ipv4(dest, Ipv4Addr::new(192, 168, 1, 10), &echo_reply(OUR_ID, 9));

        assert_eq!(parse_reply(&packet, &matching(9)), Reply::EchoReply(dest));
        assert_eq!(parse_reply(&packet, &ReplyFilter::Permissive), Reply::EchoReply(dest));
    }

    #[test]
    fn test_time_exceeded_uses_outer_source() {
        let router = Ipv4Addr::new(10, 0, 0, 1);
        let packet = ipv4(router, Ipv4Addr::new(192, 168, 1, 10), &time_exceeded(OUR_ID, 3));

        let reply = parse_reply(&packet, &matching(3));
        assert_eq!(reply, Reply::TimeExceeded(router));
        assert_eq!(reply.responder(), Some(router));
    }

    #[test]
    fn test_other_types_are_unrelated() {
        // Destination unreachable (type 3) and an echo request (type 8)
        let unreachable = ipv4(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(192, 168, 1, 10),
            &[3, 1, 0, 0, 0, 0, 0, 0],
        );
        let request = ipv4(
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(127, 0, 0, 1),
            &build_echo_request_at(OUR_ID, 1, SystemTime::now()),
        );

        for packet in [unreachable, request] {
            assert_eq!(parse_reply(&packet, &ReplyFilter::Permissive), Reply::Unrelated);
            assert_eq!(parse_reply(&packet, &matching(1)), Reply::Unrelated);
        }
    }

    #[test]
    fn test_identifier_mismatch() {
        let dest = Ipv4Addr::new(1, 1, 1, 1);
        let packet = ipv4(dest, Ipv4Addr::new(192, 168, 1, 10), &echo_reply(0x9999, 4));

        assert_eq!(parse_reply(&packet, &matching(4)), Reply::Unrelated);
        assert_eq!(parse_reply(&packet, &ReplyFilter::Permissive), Reply::EchoReply(dest));
    }

    #[test]
    fn test_sequence_mismatch_in_quoted_request() {
        let router = Ipv4Addr::new(10, 0, 0, 1);
        let packet = ipv4(router, Ipv4Addr::new(192, 168, 1, 10), &time_exceeded(OUR_ID, 5));

        assert_eq!(parse_reply(&packet, &matching(6)), Reply::Unrelated);
        assert_eq!(parse_reply(&packet, &ReplyFilter::Permissive), Reply::TimeExceeded(router));
    }

    #[test]
    fn test_truncated_quote_rejected_when_matching() {
        let router = Ipv4Addr::new(10, 0, 0, 1);
        let mut icmp = time_exceeded(OUR_ID, 2);
        icmp.truncate(ICMP_HEADER_SIZE + MIN_IPV4_HEADER + 4);
        let packet = ipv4(router, Ipv4Addr::new(192, 168, 1, 10), &icmp);

        assert_eq!(parse_reply(&packet, &matching(2)), Reply::Unrelated);
        assert_eq!(parse_reply(&packet, &ReplyFilter::Permissive), Reply::TimeExceeded(router));
    }

    #[test]
    fn test_corrupt_echo_reply_checksum() {
        let dest = Ipv4Addr::new(8, 8, 8, 8);
        let mut icmp = echo_reply(OUR_ID, 1);
        icmp[12] ^= 0xFF;
        let packet = ipv4(dest, Ipv4Addr::new(192, 168, 1, 10), &icmp);

        assert_eq!(parse_reply(&packet, &matching(1)), Reply::Unrelated);
    }

    #[test]
    fn test_empty_and_short_packets() {
        assert_eq!(parse_reply(&[], &ReplyFilter::Permissive), Reply::Unrelated);
        assert_eq!(parse_reply(&[0x45; 19], &ReplyFilter::Permissive), Reply::Unrelated);
        // Valid IP header, ICMP header cut short
        let packet = ipv4(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), &[11, 0, 0]);
        assert_eq!(parse_reply(&packet, &ReplyFilter::Permissive), Reply::Unrelated);
    }

    #[test]
    fn test_ip_options_shift_icmp_header() {
        let router = Ipv4Addr::new(172, 16, 0, 1);
        let mut packet = ipv4(router, Ipv4Addr::new(192, 168, 1, 10), &[]);
        packet[0] = 0x46; // IHL = 6, one word of options
        packet.extend_from_slice(&[1, 1, 1, 0]); // NOP padding
        packet.extend_from_slice(&time_exceeded(OUR_ID, 8));

        assert_eq!(parse_reply(&packet, &matching(8)), Reply::TimeExceeded(router));
    }

    use proptest::prelude::*;

    proptest! {
        /// Random bytes should not panic when parsed
        #[test]
        fn proptest_parse_reply_no_panic(data in prop::collection::vec(0u8..=255, 0..1500)) {
            let _ = parse_reply(&data, &ReplyFilter::Permissive);
            let _ = parse_reply(&data, &matching(1));
        }

        /// IPv4 packets with various IHL values should not panic
        #[test]
        fn proptest_parse_variable_ihl(
            ihl in 0u8..=15,
            payload in prop::collection::vec(0u8..=255, 0..200)
        ) {
            let mut data = ipv4(Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 2, 2, 2), &payload);
            data[0] = 0x40 | ihl;
            let _ = parse_reply(&data, &matching(3));
        }
    }
}
