//! Header parser used by every network function
//!
//! Extracts the transport protocol and destination port from an
//! Ethernet/IPv4/TCP-or-UDP frame. Anything that cannot be classified yields
//! `None`, which callers treat as "allow".

use super::packet::PacketRef;
use crate::protocol::ethernet::{self, Frame};
use crate::protocol::ipv4::{self, Ipv4Header, Protocol};

/// Shortest frame that can carry an IPv4 header
pub const MIN_CLASSIFIABLE_LEN: usize = ethernet::HEADER_SIZE + ipv4::MIN_HEADER_SIZE;

/// TCP and UDP both carry the destination port in bytes 2..4
const DST_PORT: std::ops::Range<usize> = 2..4;

/// Transport protocols the filter classifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp => write!(f, "tcp"),
            Transport::Udp => write!(f, "udp"),
        }
    }
}

/// Extract `(protocol, destination port)` from a packet
///
/// Returns `None` for short frames, non-IPv4 ethertypes (VLAN-tagged
/// included), non-TCP/UDP protocols and non-first fragments. The transport
/// header is only required to reach the destination port: its data offset,
/// length and checksum are not checked. Reads are confined to `pkt.data()`.
pub fn parse_l4(pkt: &PacketRef<'_>) -> Option<(Transport, u16)> {
    let data = pkt.data();
    if data.len() < MIN_CLASSIFIABLE_LEN {
        return None;
    }

    let frame = Frame::parse(data).ok()?;
    if !frame.is_ipv4() {
        return None;
    }

    let ip = Ipv4Header::parse(frame.payload()).ok()?;
    let transport = match Protocol::from_u8(ip.protocol()) {
        Some(Protocol::Tcp) => Transport::Tcp,
        Some(Protocol::Udp) => Transport::Udp,
        _ => return None,
    };
    if !ip.is_first_fragment() {
        return None;
    }

    let port = match ip.payload().get(DST_PORT)? {
        &[hi, lo] => u16::from_be_bytes([hi, lo]),
        _ => return None,
    };

    Some((transport, port))
}

/// TCP traffic addressed to the control port bypasses the chain
///
/// A parse failure is "not a control packet".
pub fn is_control_packet(pkt: &PacketRef<'_>, control_port: u16) -> bool {
    matches!(parse_l4(pkt), Some((Transport::Tcp, port)) if port == control_port)
}
