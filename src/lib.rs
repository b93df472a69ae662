//! Loom - in-path NFV packet filter
//!
//! Intercepts frames on a network interface and runs each IPv4 packet
//! through an ordered, runtime-reconfigurable chain of network functions
//! (a per-port rate limiter and a destination-port allowlist). Packets the
//! chain allows are forwarded to the interface's original input handler;
//! denied packets are dropped. A line-oriented TCP control plane manages
//! the chain while traffic flows.

pub mod capture;
pub mod config;
pub mod control;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
