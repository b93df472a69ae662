//! Capture pump: received frames into the hooked interface

use super::Capture;
use crate::dataplane::{Netif, Packet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, trace};

/// Receive buffer size; larger than any Ethernet frame including a VLAN tag
pub const RECV_BUFFER_SIZE: usize = 2048;

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Feed every frame received on `link` to `netif`
pub async fn run_pump<C: Capture>(mut link: C, netif: Arc<Netif>) {
    info!(interface = netif.name(), "Capture pump started");
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        match link.recv(&mut buf).await {
            Ok(len) => {
                // The hook has already counted and logged forward failures
                if let Err(e) = netif.deliver(Packet::new(buf[..len].to_vec())) {
                    trace!(error = %e, "Frame not forwarded");
                }
            }
            Err(e) => {
                error!(interface = netif.name(), error = %e, "Receive error");
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{mock, run_writer, EgressQueue};
    use crate::dataplane::{test_frames, CaptureHook, NfEngine};

    #[tokio::test]
    async fn test_bump_in_the_wire() {
        let engine = Arc::new(NfEngine::new());
        engine.allowlist().add(22).unwrap();

        let (queue, queue_rx) = EgressQueue::new(16);
        let netif = Arc::new(Netif::with_input("eth0", Arc::new(queue)));
        CaptureHook::install(&netif, engine.clone()).unwrap();

        let (rx_link, wire_in, _) = mock::link();
        let (tx_link, _, mut wire_out) = mock::link();
        let pump = tokio::spawn(run_pump(rx_link, netif));
        let writer = tokio::spawn(run_writer(queue_rx, tx_link));

        let ssh = test_frames::tcp(22);
        wire_in.send(test_frames::tcp(80)).unwrap();
        wire_in.send(ssh.clone()).unwrap();
        wire_in.send(test_frames::tcp(9000)).unwrap();

        assert_eq!(wire_out.recv().await.unwrap(), ssh);
        assert_eq!(wire_out.recv().await.unwrap(), test_frames::tcp(9000));

        let stats = engine.stats();
        assert_eq!(stats.total_packets, 3);
        assert_eq!(stats.dropped_packets, 1);
        assert_eq!(stats.bypassed_packets, 1);

        pump.abort();
        writer.abort();
    }
}
