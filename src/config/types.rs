//! Configuration types

use crate::dataplane::NfKind;
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// TCP port whose traffic bypasses the chain unless configured otherwise
pub const DEFAULT_CONTROL_PORT: u16 = 9000;

/// User-defined configuration (loom.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub logging: Option<LogConfig>,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub rate_limits: Vec<RateLimitConfig>,
    #[serde(default)]
    pub allowlist: AllowlistConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureConfig {
    /// Interface whose inbound traffic is intercepted
    pub interface: Option<String>,
    /// Interface that forwarded frames are written to
    pub forward_interface: Option<String>,
    pub control_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlConfig {
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainConfig {
    /// Initial chain, by built-in NF name
    pub order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub port: u16,
    pub pps: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowlistConfig {
    #[serde(default)]
    pub ports: Vec<u16>,
}

impl Config {
    pub fn control_port(&self) -> u16 {
        self.capture.control_port.unwrap_or(DEFAULT_CONTROL_PORT)
    }

    /// Control server address; defaults to all interfaces on the control port
    pub fn control_listen(&self) -> SocketAddr {
        self.control.listen.unwrap_or_else(|| {
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.control_port()))
        })
    }

    pub fn chain_order(&self) -> Vec<String> {
        self.chain
            .order
            .clone()
            .unwrap_or_else(|| vec![NfKind::RATE_LIMITER.into(), NfKind::ALLOWLIST.into()])
    }
}

// ============================================================================
// Effective configuration (all defaults filled in, printed by `config show`)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub capture: CaptureEffective,
    pub control: ControlEffective,
    pub logging: LogConfig,
    pub chain: ChainEffective,
    pub allowlist: AllowlistConfig,
    pub rate_limits: Vec<RateLimitConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureEffective {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_interface: Option<String>,
    pub control_port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlEffective {
    pub listen: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainEffective {
    pub order: Vec<String>,
}

impl EffectiveConfig {
    pub fn from_config(config: &Config) -> Self {
        let mut rate_limits = config.rate_limits.clone();
        rate_limits.sort_by_key(|r| r.port);
        let mut ports = config.allowlist.ports.clone();
        ports.sort_unstable();
        ports.dedup();

        EffectiveConfig {
            capture: CaptureEffective {
                interface: config.capture.interface.clone(),
                forward_interface: config.capture.forward_interface.clone(),
                control_port: config.control_port(),
            },
            control: ControlEffective {
                listen: config.control_listen().to_string(),
            },
            logging: config.logging.clone().unwrap_or_default(),
            chain: ChainEffective {
                order: config.chain_order(),
            },
            allowlist: AllowlistConfig { ports },
            rate_limits,
        }
    }
}
