//! IPv4 header view, checksums and a datagram builder

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Header size without options
pub const MIN_HEADER_SIZE: usize = 20;
/// Header size at IHL = 15
pub const MAX_HEADER_SIZE: usize = 60;

const DEFAULT_TTL: u8 = 64;
const FLAG_DF: u16 = 0x4000;

/// Protocol numbers the filter cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

impl Protocol {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Protocol::Icmp),
            6 => Some(Protocol::Tcp),
            17 => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// Borrowed view of an IPv4 header
///
/// `parse` guarantees the whole header, options included, lies inside the
/// buffer, so every accessor below is in bounds.
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }
        if buffer[0] >> 4 != 4 {
            return Err(Error::Parse("not an IPv4 packet".into()));
        }

        let header_len = usize::from(buffer[0] & 0x0F) * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse(format!("invalid IHL {}", header_len / 4)));
        }
        if buffer.len() < header_len {
            return Err(Error::Parse("IPv4 header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Bytes after the header, options skipped
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }

    /// Only the fragment at offset zero carries the transport header
    pub fn is_first_fragment(&self) -> bool {
        u16::from_be_bytes([self.buffer[6] & 0x1F, self.buffer[7]]) == 0
    }
}

/// Internet checksum of `data`, odd trailing byte padded with zero
pub fn checksum(data: &[u8]) -> u16 {
    fold(sum_words(data))
}

/// Transport checksum over the IPv4 pseudo-header and `segment`
///
/// `segment` must have its checksum field zeroed when computing. Over an
/// intact segment the result is 0.
pub fn pseudo_header_checksum(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: u8,
    segment: &[u8],
) -> u16 {
    let pseudo = sum_words(&src_ip.octets())
        + sum_words(&dst_ip.octets())
        + u32::from(protocol)
        + segment.len() as u32;
    fold(pseudo + sum_words(segment))
}

fn sum_words(data: &[u8]) -> u32 {
    data.chunks(2)
        .map(|chunk| match chunk {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .fold(0u32, u32::wrapping_add)
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Builds an IPv4 datagram with a valid header checksum
#[derive(Debug)]
pub struct Ipv4Builder {
    dont_fragment: bool,
    fragment_offset: u16,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    options: Vec<u8>,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            dont_fragment: true,
            fragment_offset: 0,
            protocol: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn dont_fragment(mut self, df: bool) -> Self {
        self.dont_fragment = df;
        self
    }

    /// Offset in 8-byte units
    pub fn fragment_offset(mut self, offset: u16) -> Self {
        self.fragment_offset = offset & 0x1FFF;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    /// Header options, zero-padded to a 4-byte boundary and capped at 40 bytes
    pub fn options(mut self, options: &[u8]) -> Self {
        let len = options.len().min(MAX_HEADER_SIZE - MIN_HEADER_SIZE);
        self.options = options[..len].to_vec();
        self.options.resize(len.next_multiple_of(4), 0);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header_len = MIN_HEADER_SIZE + self.options.len();
        let total_len = header_len + self.payload.len();
        let mut buffer = vec![0u8; total_len];

        buffer[0] = 0x40 | (header_len / 4) as u8;
        buffer[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());

        let mut flags_frag = self.fragment_offset;
        if self.dont_fragment {
            flags_frag |= FLAG_DF;
        }
        buffer[6..8].copy_from_slice(&flags_frag.to_be_bytes());

        buffer[8] = DEFAULT_TTL;
        buffer[9] = self.protocol;
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[MIN_HEADER_SIZE..header_len].copy_from_slice(&self.options);
        buffer[header_len..].copy_from_slice(&self.payload);

        let sum = checksum(&buffer[..header_len]);
        buffer[10..12].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}
