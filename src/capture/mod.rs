//! Packet capture backends
//!
//! The daemon intercepts frames on one interface with AF_PACKET and writes
//! the frames the chain lets through to a second interface. Between the two,
//! the hooked `Netif` sees a single interface whose original input handler
//! is the egress queue.

mod af_packet;
mod egress;
mod pump;

pub use af_packet::AfPacketSocket;
pub use egress::{run_writer, EgressQueue, DEFAULT_QUEUE_DEPTH};
pub use pump::{run_pump, RECV_BUFFER_SIZE};

use crate::Result;
use std::future::Future;

/// Packet I/O backend
pub trait Capture: Send {
    /// Receive one frame into `buf`, returning its length
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Transmit one frame
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = Result<usize>> + Send;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::Capture;
    use crate::{Error, Result};
    use tokio::sync::mpsc;

    /// In-memory link: frames pushed into `rx` are received, frames sent
    /// come out of `tx`
    pub struct MockLink {
        pub rx: mpsc::UnboundedReceiver<Vec<u8>>,
        pub tx: mpsc::UnboundedSender<Vec<u8>>,
    }

    impl Capture for MockLink {
        async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.rx.recv().await {
                Some(frame) => {
                    let len = frame.len().min(buf.len());
                    buf[..len].copy_from_slice(&frame[..len]);
                    Ok(len)
                }
                None => std::future::pending().await,
            }
        }

        async fn send(&mut self, frame: &[u8]) -> Result<usize> {
            self.tx
                .send(frame.to_vec())
                .map_err(|_| Error::Forward("link down".into()))?;
            Ok(frame.len())
        }
    }

    /// Link plus the far ends of its two channels
    pub fn link() -> (
        MockLink,
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MockLink {
                rx: in_rx,
                tx: out_tx,
            },
            in_tx,
            out_rx,
        )
    }
}
