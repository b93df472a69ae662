//! Capture hook
//!
//! Sits in place of an interface's input handler. Each packet goes through
//! `Received -> ControlCheck -> {Bypass | ChainDispatch} -> {Forward | Drop}`.
//! Forwarding hands the packet to the handler that was installed before the
//! hook; dropping releases it.

use super::engine::NfEngine;
use super::header::is_control_packet;
use super::nf::Verdict;
use super::packet::Packet;
use super::{read_table, write_table};
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Consumer of packets delivered by an interface
///
/// Taking `Packet` by value is the ownership transfer: the handler either
/// passes it on or drops it.
pub trait InputHandler: Send + Sync {
    fn input(&self, pkt: Packet, netif: &Netif) -> Result<()>;
}

/// A network interface with a replaceable input handler
pub struct Netif {
    name: String,
    input: RwLock<InputSlot>,
}

#[derive(Default)]
struct InputSlot {
    handler: Option<Arc<dyn InputHandler>>,
    hooked: bool,
}

impl Netif {
    /// Interface with no input handler; a hook cannot be installed on it
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: RwLock::new(InputSlot::default()),
        }
    }

    pub fn with_input(name: impl Into<String>, handler: Arc<dyn InputHandler>) -> Self {
        Self {
            name: name.into(),
            input: RwLock::new(InputSlot {
                handler: Some(handler),
                hooked: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the input handler
    ///
    /// Refused once a capture hook is installed: the hook would be unlinked
    /// and traffic would skip the chain.
    pub fn set_input(&self, handler: Arc<dyn InputHandler>) -> Result<()> {
        let mut slot = write_table(&self.input, "netif");
        if slot.hooked {
            return Err(Error::AlreadyHooked {
                name: self.name.clone(),
            });
        }
        slot.handler = Some(handler);
        Ok(())
    }

    pub fn is_hooked(&self) -> bool {
        read_table(&self.input, "netif").hooked
    }

    /// Hand a received packet to the current input handler
    pub fn deliver(&self, pkt: Packet) -> Result<()> {
        let handler = read_table(&self.input, "netif").handler.clone();
        match handler {
            Some(handler) => handler.input(pkt, self),
            None => Err(Error::InvalidInterface {
                name: self.name.clone(),
            }),
        }
    }
}

impl fmt::Debug for Netif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = read_table(&self.input, "netif");
        f.debug_struct("Netif")
            .field("name", &self.name)
            .field("has_input", &slot.handler.is_some())
            .field("hooked", &slot.hooked)
            .finish()
    }
}

/// Input handler that filters packets through the NF engine
pub struct CaptureHook {
    engine: Arc<NfEngine>,
    delegate: Arc<dyn InputHandler>,
}

impl CaptureHook {
    /// Wrap `netif`'s current input handler
    ///
    /// The prior handler is captured once here and used for every forward.
    /// Fails if the interface is already hooked or has nothing to wrap.
    pub fn install(netif: &Netif, engine: Arc<NfEngine>) -> Result<Arc<CaptureHook>> {
        let mut slot = write_table(&netif.input, "netif");
        if slot.hooked {
            return Err(Error::AlreadyHooked {
                name: netif.name.clone(),
            });
        }
        let Some(delegate) = slot.handler.clone() else {
            return Err(Error::InvalidInterface {
                name: netif.name.clone(),
            });
        };

        let control_port = engine.control_port();
        let hook = Arc::new(CaptureHook { engine, delegate });
        slot.handler = Some(hook.clone());
        slot.hooked = true;

        info!(interface = %netif.name, control_port, "Capture hook installed");
        Ok(hook)
    }

    fn forward(&self, pkt: Packet, netif: &Netif) -> Result<()> {
        self.delegate.input(pkt, netif).inspect_err(|e| {
            self.engine.capture_stats().record_forward_error();
            warn!(interface = %netif.name, error = %e, "Forward failed");
        })
    }
}

impl InputHandler for CaptureHook {
    fn input(&self, pkt: Packet, netif: &Netif) -> Result<()> {
        let stats = self.engine.capture_stats();
        stats.record_received(pkt.len());

        let view = pkt.view();
        if is_control_packet(&view, self.engine.control_port()) {
            stats.record_bypassed();
            debug!(port = self.engine.control_port(), "Control packet bypassed chain");
            return self.forward(pkt, netif);
        }

        match self.engine.process(&view) {
            Verdict::Allow => {
                stats.record_passed();
                self.forward(pkt, netif)
            }
            Verdict::Deny => {
                stats.record_dropped();
                drop(pkt);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for CaptureHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHook")
            .field("control_port", &self.engine.control_port())
            .finish_non_exhaustive()
    }
}
