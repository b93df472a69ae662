//! TCP segment builder
//!
//! The filter never parses TCP: it reads the destination port at bytes
//! 2..4 and nothing else.

use super::ipv4::pseudo_header_checksum;
use std::net::Ipv4Addr;

/// Header size without options
pub const MIN_HEADER_SIZE: usize = 20;

/// Protocol number for the pseudo-header
pub const PROTOCOL_NUMBER: u8 = 6;

const FLAG_SYN: u8 = 0x02;

/// Builds a SYN segment, the first packet a filtered connection shows
#[derive(Debug, Default)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build the segment with a checksum over the given addresses
    pub fn build(self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let mut buffer = vec![0u8; MIN_HEADER_SIZE + self.payload.len()];

        buffer[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buffer[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        // Data offset of 5 words, no options
        buffer[12] = 5 << 4;
        buffer[13] = FLAG_SYN;
        buffer[14..16].copy_from_slice(&u16::MAX.to_be_bytes());
        buffer[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = pseudo_header_checksum(src_ip, dst_ip, PROTOCOL_NUMBER, &buffer);
        buffer[16..18].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    #[test]
    fn test_syn_layout() {
        let segment = TcpBuilder::new()
            .src_port(40000)
            .dst_port(443)
            .build(SRC, DST);

        assert_eq!(segment.len(), MIN_HEADER_SIZE);
        assert_eq!(&segment[0..2], &40000u16.to_be_bytes());
        assert_eq!(&segment[2..4], &443u16.to_be_bytes());
        assert_eq!(segment[12] >> 4, 5);
        assert_eq!(segment[13], FLAG_SYN);
    }

    #[test]
    fn test_checksum_covers_pseudo_header() {
        let segment = TcpBuilder::new()
            .src_port(1234)
            .dst_port(80)
            .payload(b"GET /")
            .build(SRC, DST);

        assert_eq!(&segment[MIN_HEADER_SIZE..], b"GET /");
        assert_eq!(pseudo_header_checksum(SRC, DST, PROTOCOL_NUMBER, &segment), 0);
        let elsewhere = Ipv4Addr::new(10, 0, 0, 2);
        assert_ne!(pseudo_header_checksum(SRC, elsewhere, PROTOCOL_NUMBER, &segment), 0);
    }
}
