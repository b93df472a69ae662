//! Data plane components
//!
//! The packet path: capture hook, NF chain and the built-in network
//! functions, plus the engine context that ties them together.

mod allowlist;
mod chain;
mod engine;
mod header;
mod hook;
mod nf;
mod packet;
mod rate_limiter;

pub use allowlist::{Allowlist, MAX_ALLOWED_PORTS};
pub use chain::{ChainEntry, NfChain};
pub use engine::NfEngine;
pub use header::{is_control_packet, parse_l4, Transport, MIN_CLASSIFIABLE_LEN};
pub use hook::{CaptureHook, InputHandler, Netif};
pub use nf::{NetworkFunction, NfKind, Verdict};
pub use packet::{Packet, PacketRef};
pub use rate_limiter::{
    Clock, ManualClock, RateLimitEntry, RateLimiter, SystemClock, MAX_RATE_LIMITS,
};

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Read-lock a shared table, recovering from poisoning
///
/// A control session that panicked mid-update must not stop the packet path.
pub(crate) fn read_table<'a, T>(lock: &'a RwLock<T>, table: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(table, "Recovering poisoned lock");
        poisoned.into_inner()
    })
}

/// Write-lock a shared table, recovering from poisoning
pub(crate) fn write_table<'a, T>(lock: &'a RwLock<T>, table: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(table, "Recovering poisoned lock");
        poisoned.into_inner()
    })
}

/// Frame builders shared by the unit tests
#[cfg(test)]
pub(crate) mod test_frames {
    use crate::protocol::ethernet::FrameBuilder;
    use crate::protocol::ipv4::{Ipv4Builder, Protocol};
    use crate::protocol::tcp::TcpBuilder;
    use crate::protocol::udp::UdpBuilder;
    use crate::protocol::{EtherType, MacAddr};
    use std::net::Ipv4Addr;

    pub const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    pub const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    fn ethernet(ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(MacAddr([0x02, 0, 0, 0, 0, 1]))
            .src_mac(MacAddr([0x02, 0, 0, 0, 0, 2]))
            .ethertype(ethertype as u16)
            .payload(payload)
            .build()
    }

    fn ipv4(protocol: Protocol, l4: &[u8]) -> Vec<u8> {
        Ipv4Builder::new()
            .protocol(protocol as u8)
            .src_addr(SRC)
            .dst_addr(DST)
            .payload(l4)
            .build()
    }

    pub fn tcp(port: u16) -> Vec<u8> {
        let l4 = TcpBuilder::new().src_port(40000).dst_port(port).build(SRC, DST);
        ethernet(EtherType::Ipv4, &ipv4(Protocol::Tcp, &l4))
    }

    pub fn udp(port: u16) -> Vec<u8> {
        let l4 = UdpBuilder::new().src_port(40000).dst_port(port).build(SRC, DST);
        ethernet(EtherType::Ipv4, &ipv4(Protocol::Udp, &l4))
    }

    pub fn icmp() -> Vec<u8> {
        ethernet(
            EtherType::Ipv4,
            &ipv4(Protocol::Icmp, &[8, 0, 0xf7, 0xfe, 0, 1, 0, 0]),
        )
    }

    pub fn arp() -> Vec<u8> {
        ethernet(EtherType::Arp, &[0u8; 28])
    }
}
