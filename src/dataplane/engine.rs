//! NF engine: the single context object shared by the packet path and the
//! control plane

use super::allowlist::Allowlist;
use super::chain::NfChain;
use super::nf::{NetworkFunction, NfKind, Verdict};
use super::packet::PacketRef;
use super::rate_limiter::{Clock, RateLimiter, SystemClock};
use crate::config::{Config, DEFAULT_CONTROL_PORT};
use crate::error::NfTarget;
use crate::telemetry::{CaptureStats, CaptureStatsSnapshot};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Chain, built-in NFs and capture statistics
#[derive(Debug)]
pub struct NfEngine {
    chain: NfChain,
    rate_limiter: Arc<RateLimiter>,
    allowlist: Arc<Allowlist>,
    stats: CaptureStats,
    control_port: u16,
}

impl NfEngine {
    /// Engine with the default chain: rate limiter then allowlist, both
    /// enabled and empty
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mut engine = Self::empty(clock, DEFAULT_CONTROL_PORT);
        let rate_limiter: Arc<dyn NetworkFunction> = engine.rate_limiter.clone();
        let allowlist: Arc<dyn NetworkFunction> = engine.allowlist.clone();
        engine.chain = NfChain::with_builtins([
            (NfKind::RateLimiter, rate_limiter),
            (NfKind::Allowlist, allowlist),
        ]);
        engine
    }

    fn empty(clock: Arc<dyn Clock>, control_port: u16) -> Self {
        Self {
            chain: NfChain::new(),
            rate_limiter: Arc::new(RateLimiter::with_clock(clock)),
            allowlist: Arc::new(Allowlist::new()),
            stats: CaptureStats::new(),
            control_port,
        }
    }

    /// Build the engine described by a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let engine = Self::empty(clock, config.control_port());

        for name in config.chain_order() {
            engine.add_builtin(&name)?;
        }
        for rule in &config.rate_limits {
            engine.rate_limiter.set_limit(rule.port, rule.pps)?;
        }
        for &port in &config.allowlist.ports {
            engine.allowlist.add(port)?;
        }

        info!(
            chain = engine.chain.len(),
            rate_limits = engine.rate_limiter.len(),
            allowed_ports = engine.allowlist.len(),
            control_port = engine.control_port,
            "NF engine configured"
        );
        Ok(engine)
    }

    pub fn chain(&self) -> &NfChain {
        &self.chain
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn capture_stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn stats(&self) -> CaptureStatsSnapshot {
        self.stats.snapshot()
    }

    /// Append a built-in NF to the chain under its canonical name
    pub fn add_builtin(&self, name: &str) -> Result<()> {
        let kind = NfKind::builtin(name)
            .ok_or_else(|| Error::not_found(NfTarget::Function(name.to_string())))?;
        self.add_kind(kind)
    }

    fn add_kind(&self, kind: NfKind) -> Result<()> {
        let nf: Arc<dyn NetworkFunction> = match kind {
            NfKind::RateLimiter => self.rate_limiter.clone(),
            NfKind::Allowlist => self.allowlist.clone(),
            NfKind::Custom => {
                return Err(Error::not_found(NfTarget::Function(kind.to_string())));
            }
        };
        self.chain.add_with_kind(kind.to_string(), kind, nf)
    }

    /// Run a packet through the chain
    pub fn process(&self, pkt: &PacketRef<'_>) -> Verdict {
        self.chain.process(pkt)
    }
}

impl Default for NfEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::dataplane::{test_frames, ManualClock};

    #[test]
    fn test_default_chain() {
        let engine = NfEngine::new();
        let chain = engine.chain().list();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name, "rate_limiter");
        assert_eq!(chain[0].kind, NfKind::RateLimiter);
        assert_eq!(chain[1].name, "allowlist");
        assert!(chain.iter().all(|e| e.enabled));
        assert!(engine.rate_limiter().is_empty());
        assert!(engine.allowlist().is_empty());
        assert_eq!(engine.control_port(), DEFAULT_CONTROL_PORT);

        let data = test_frames::tcp(80);
        assert_eq!(engine.process(&PacketRef::from_bytes(&data)), Verdict::Allow);
    }

    #[test]
    fn test_chain_shares_builtin_state() {
        let engine = NfEngine::new();
        engine.allowlist().add(443).unwrap();

        let data = test_frames::tcp(80);
        assert_eq!(engine.process(&PacketRef::from_bytes(&data)), Verdict::Deny);
        assert_eq!(engine.chain().list()[1].dropped, 1);

        engine.rate_limiter().set_limit(443, 0).unwrap();
        let data = test_frames::tcp(443);
        assert_eq!(engine.process(&PacketRef::from_bytes(&data)), Verdict::Deny);
        assert_eq!(engine.chain().list()[0].dropped, 1);
    }

    #[test]
    fn test_readd_removed_builtin() {
        let engine = NfEngine::new();
        engine.chain().remove("rate_limiter").unwrap();
        engine.add_builtin("rate_limiter").unwrap();

        let names: Vec<_> = engine.chain().list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["allowlist", "rate_limiter"]);

        assert!(matches!(
            engine.add_builtin("allowlist"),
            Err(Error::DuplicateName { .. })
        ));
        assert!(matches!(
            engine.add_builtin("firewall"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_from_config() {
        let config = config::parse(
            r#"
[capture]
control_port = 2222

[chain]
order = ["allowlist"]

[[rate_limits]]
port = 80
pps = 1

[allowlist]
ports = [22, 80]
"#,
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new(10));
        let engine = NfEngine::from_config_with_clock(&config, clock).unwrap();

        assert_eq!(engine.control_port(), 2222);
        assert_eq!(engine.chain().len(), 1);
        assert_eq!(engine.rate_limiter().list()[0].pps, 1);
        assert_eq!(engine.allowlist().list(), vec![22, 80]);

        // Rate limiter is configured but not in the chain
        let data = test_frames::tcp(80);
        let pkt = PacketRef::from_bytes(&data);
        assert_eq!(engine.process(&pkt), Verdict::Allow);
        assert_eq!(engine.process(&pkt), Verdict::Allow);
    }

    #[test]
    fn test_from_config_rejects_unknown_nf() {
        let config = config::parse("[chain]\norder = [\"dpi\"]").unwrap();
        assert!(NfEngine::from_config(&config).is_err());
    }
}
