//! Wire formats the filter looks at
//!
//! Only Ethernet II and IPv4 headers are parsed. TCP and UDP have builders
//! for constructing traffic; classification reads their port field directly.

pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod udp;

pub use ethernet::{EtherType, MacAddr};
