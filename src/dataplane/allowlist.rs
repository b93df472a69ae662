//! Destination-port allowlist
//!
//! An empty set allows everything. Once a port is added, TCP/UDP traffic
//! to any other port is denied; traffic that cannot be classified always
//! passes.

use super::header::parse_l4;
use super::nf::{NetworkFunction, Verdict};
use super::packet::PacketRef;
use super::{read_table, write_table};
use crate::error::NfTarget;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::RwLock;
use tracing::{debug, info};

/// Maximum number of allowed ports
pub const MAX_ALLOWED_PORTS: usize = 64;

/// Allowlist NF
#[derive(Debug, Default)]
pub struct Allowlist {
    ports: RwLock<BTreeSet<u16>>,
}

impl Allowlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `port`; adding a present port is a no-op
    pub fn add(&self, port: u16) -> Result<()> {
        let mut ports = write_table(&self.ports, "allowlist");
        if ports.contains(&port) {
            return Ok(());
        }
        if ports.len() >= MAX_ALLOWED_PORTS {
            return Err(Error::CapacityExceeded {
                table: "allowlist",
                max: MAX_ALLOWED_PORTS,
            });
        }
        ports.insert(port);
        info!(port, "Port allowed");
        Ok(())
    }

    pub fn remove(&self, port: u16) -> Result<()> {
        if write_table(&self.ports, "allowlist").remove(&port) {
            info!(port, "Port removed from allowlist");
            Ok(())
        } else {
            Err(Error::not_found(NfTarget::AllowedPort(port)))
        }
    }

    /// Empty the set, reverting to allow-all
    pub fn clear(&self) {
        write_table(&self.ports, "allowlist").clear();
        info!("Allowlist cleared");
    }

    /// Allowed ports, ascending
    pub fn list(&self) -> Vec<u16> {
        read_table(&self.ports, "allowlist").iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        read_table(&self.ports, "allowlist").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NetworkFunction for Allowlist {
    fn classify(&self, pkt: &PacketRef<'_>) -> Verdict {
        let ports = read_table(&self.ports, "allowlist");
        if ports.is_empty() {
            return Verdict::Allow;
        }

        let Some((proto, port)) = parse_l4(pkt) else {
            return Verdict::Allow;
        };

        if ports.contains(&port) {
            Verdict::Allow
        } else {
            drop(ports);
            debug!(nf = "allowlist", %proto, port, "Port not in allowlist");
            Verdict::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::test_frames;

    fn verdict(list: &Allowlist, frame: &[u8]) -> Verdict {
        list.classify(&PacketRef::from_bytes(frame))
    }

    #[test]
    fn test_empty_allows_all() {
        let list = Allowlist::new();
        assert_eq!(verdict(&list, &test_frames::tcp(1)), Verdict::Allow);
        assert_eq!(verdict(&list, &test_frames::udp(65535)), Verdict::Allow);
    }

    #[test]
    fn test_only_listed_ports_pass() {
        let list = Allowlist::new();
        list.add(443).unwrap();

        assert_eq!(verdict(&list, &test_frames::tcp(443)), Verdict::Allow);
        assert_eq!(verdict(&list, &test_frames::udp(443)), Verdict::Allow);
        assert_eq!(verdict(&list, &test_frames::tcp(80)), Verdict::Deny);
        assert_eq!(verdict(&list, &test_frames::udp(53)), Verdict::Deny);
    }

    #[test]
    fn test_unclassifiable_always_passes() {
        let list = Allowlist::new();
        list.add(443).unwrap();

        assert_eq!(verdict(&list, &test_frames::icmp()), Verdict::Allow);
        assert_eq!(verdict(&list, &test_frames::arp()), Verdict::Allow);
        assert_eq!(verdict(&list, &[0u8; 5]), Verdict::Allow);
    }

    #[test]
    fn test_add_is_idempotent() {
        let list = Allowlist::new();
        list.add(22).unwrap();
        list.add(22).unwrap();
        assert_eq!(list.list(), vec![22]);
    }

    #[test]
    fn test_remove_and_clear() {
        let list = Allowlist::new();
        list.add(22).unwrap();
        list.add(80).unwrap();

        list.remove(22).unwrap();
        assert_eq!(list.list(), vec![80]);
        assert!(matches!(
            list.remove(22),
            Err(Error::NotFound {
                what: NfTarget::AllowedPort(22)
            })
        ));

        list.clear();
        assert!(list.is_empty());
        assert_eq!(verdict(&list, &test_frames::tcp(1234)), Verdict::Allow);
    }

    #[test]
    fn test_capacity_exceeded() {
        let list = Allowlist::new();
        for port in 1..=MAX_ALLOWED_PORTS as u16 {
            list.add(port).unwrap();
        }

        assert!(matches!(
            list.add(5000),
            Err(Error::CapacityExceeded { max: 64, .. })
        ));
        assert_eq!(list.len(), MAX_ALLOWED_PORTS);
        assert!(!list.list().contains(&5000));

        // Re-adding a present port at capacity is still a no-op success
        list.add(1).unwrap();
    }

    #[test]
    fn test_list_is_sorted() {
        let list = Allowlist::new();
        for port in [8080, 22, 443] {
            list.add(port).unwrap();
        }
        assert_eq!(list.list(), vec![22, 443, 8080]);
    }
}
