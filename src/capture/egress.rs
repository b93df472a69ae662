//! Egress queue: the input handler the capture hook forwards into

use super::Capture;
use crate::dataplane::{InputHandler, Netif, Packet};
use crate::{Error, Result};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

/// Frames buffered between the packet path and the writer task
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Bounded hand-off to the forward interface
///
/// `input` never blocks: when the writer falls behind the packet is released
/// and the forward fails.
#[derive(Debug, Clone)]
pub struct EgressQueue {
    tx: mpsc::Sender<Vec<u8>>,
}

impl EgressQueue {
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }
}

impl InputHandler for EgressQueue {
    fn input(&self, pkt: Packet, _netif: &Netif) -> Result<()> {
        match self.tx.try_send(pkt.into_bytes()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::Forward("egress queue full".into())),
            Err(TrySendError::Closed(_)) => Err(Error::Forward("egress writer stopped".into())),
        }
    }
}

/// Drain the egress queue onto the forward link
///
/// Returns once every `EgressQueue` handle is gone.
pub async fn run_writer<C: Capture>(mut rx: mpsc::Receiver<Vec<u8>>, mut link: C) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = link.send(&frame).await {
            warn!(len = frame.len(), error = %e, "Failed to transmit frame");
        }
    }
    info!("Egress writer stopped");
}
