use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes, checksum};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::{MutablePacket, Packet};

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Fixed payload carried by every echo request
pub const ECHO_PAYLOAD: &[u8] = b"pingmon probe";

/// Get process identifier for the ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build an ICMP Echo Request with the fixed payload
pub fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + ECHO_PAYLOAD.len()];

    let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);
    packet.payload_mut().copy_from_slice(ECHO_PAYLOAD);

    let cksum = checksum(&IcmpPacket::new(&buffer).unwrap());
    let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
    packet.set_checksum(cksum);

    buffer
}

/// How a received ICMP packet relates to the probe we are waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMatch {
    /// Echo reply matching the probe's identifier and sequence
    Reply,
    /// An ICMP error quoting the probe (e.g. destination unreachable)
    Unexpected(String),
    /// Traffic unrelated to the probe - keep waiting
    NotOurs,
}

/// Parse a received packet and correlate it against the probe we sent.
///
/// RAW sockets deliver the IPv4 header and see every inbound ICMP packet on
/// the host, so anything that does not match the probe must be skipped, not
/// misclassified. When `is_dgram` is true the buffer starts at the ICMP
/// header and the kernel rewrites the identifier on its own, so only the
/// sequence number is matched.
pub fn parse_reply(data: &[u8], identifier: u16, sequence: u16, is_dgram: bool) -> ReplyMatch {
    if data.is_empty() {
        return ReplyMatch::NotOurs;
    }

    if is_dgram {
        return parse_icmp(data, identifier, sequence, true);
    }

    let Some(ip_packet) = Ipv4Packet::new(data) else {
        return ReplyMatch::NotOurs;
    };
    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    if ip_header_len < 20 || data.len() <= ip_header_len {
        return ReplyMatch::NotOurs;
    }
    parse_icmp(&data[ip_header_len..], identifier, sequence, false)
}

fn parse_icmp(data: &[u8], identifier: u16, sequence: u16, is_dgram: bool) -> ReplyMatch {
    let Some(icmp) = IcmpPacket::new(data) else {
        return ReplyMatch::NotOurs;
    };

    match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => {
            let Some(reply) = EchoReplyPacket::new(data) else {
                return ReplyMatch::NotOurs;
            };
            let identifier_ok = is_dgram || reply.get_identifier() == identifier;
            if identifier_ok && reply.get_sequence_number() == sequence {
                ReplyMatch::Reply
            } else {
                ReplyMatch::NotOurs
            }
        }
        IcmpTypes::DestinationUnreachable | IcmpTypes::TimeExceeded => {
            // ICMP errors quote the original IPv4 header plus the leading
            // bytes of the datagram that triggered them
            if !quoted_probe_matches(icmp.payload(), identifier, sequence) {
                return ReplyMatch::NotOurs;
            }
            let desc = match icmp.get_icmp_type() {
                IcmpTypes::DestinationUnreachable => {
                    format!("destination unreachable (code {})", icmp.get_icmp_code().0)
                }
                _ => "time to live exceeded".to_string(),
            };
            ReplyMatch::Unexpected(desc)
        }
        _ => ReplyMatch::NotOurs,
    }
}

/// Check whether an ICMP error payload quotes our echo request.
///
/// Payload layout: 4 unused bytes, quoted IPv4 header, then at least the
/// first 8 bytes of the original ICMP message.
fn quoted_probe_matches(payload: &[u8], identifier: u16, sequence: u16) -> bool {
    let Some(quoted) = payload.get(4..) else {
        return false;
    };
    let Some(ip_packet) = Ipv4Packet::new(quoted) else {
        return false;
    };
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return false;
    }
    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    let Some(inner) = quoted.get(ip_header_len..) else {
        return false;
    };
    if inner.len() < ICMP_HEADER_SIZE {
        return false;
    }

    // Original echo request: type 8, identifier at bytes 4-5, sequence at 6-7
    inner[0] == IcmpTypes::EchoRequest.0
        && u16::from_be_bytes([inner[4], inner[5]]) == identifier
        && u16::from_be_bytes([inner[6], inner[7]]) == sequence
}
