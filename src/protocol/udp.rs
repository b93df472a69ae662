//! UDP datagram builder

use super::ipv4::pseudo_header_checksum;
use std::net::Ipv4Addr;

/// Fixed header size
pub const HEADER_SIZE: usize = 8;

/// Protocol number for the pseudo-header
pub const PROTOCOL_NUMBER: u8 = 17;

#[derive(Debug, Default)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl UdpBuilder {
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

    pub fn build(self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let length = (HEADER_SIZE + self.payload.len()) as u16;
        let mut buffer = vec![0u8; usize::from(length)];

        buffer[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buffer[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buffer[4..6].copy_from_slice(&length.to_be_bytes());
        buffer[HEADER_SIZE..].copy_from_slice(&self.payload);

        // A computed 0 goes out as 0xFFFF; 0 on the wire means "no checksum"
        let sum = match pseudo_header_checksum(src_ip, dst_ip, PROTOCOL_NUMBER, &buffer) {
            0 => 0xFFFF,
            sum => sum,
        };
        buffer[6..8].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}
