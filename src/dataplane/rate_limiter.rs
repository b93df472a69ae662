//! Per-destination-port rate limiter
//!
//! Fixed one-second windows aligned to wall-clock seconds. A window resets
//! as soon as the clock's second moves past the rule's window start, so a
//! burst straddling a boundary may see up to twice the configured rate.
//! That is an accepted approximation, not a sliding window.

use super::header::parse_l4;
use super::nf::{NetworkFunction, Verdict};
use super::packet::PacketRef;
use super::{read_table, write_table};
use crate::error::NfTarget;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Maximum number of concurrently configured rules
pub const MAX_RATE_LIMITS: usize = 32;

/// Source of whole wall-clock seconds
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_secs(&self) -> u64;
}

/// Seconds since the UNIX epoch
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Window key for the current second; wraps in 2106
fn window_secs(clock: &dyn Clock) -> u32 {
    clock.now_secs() as u32
}

/// Clock driven by hand, for tests and replay
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(secs: u64) -> Self {
        Self(AtomicU64::new(secs))
    }

    pub fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct RateLimitRule {
    limit: u32,
    /// Window start second in the high half, admitted count in the low half
    state: AtomicU64,
}

fn pack(window_start: u32, count: u32) -> u64 {
    (u64::from(window_start) << 32) | u64::from(count)
}

fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, state as u32)
}

impl RateLimitRule {
    fn new(limit: u32, window_start: u32) -> Self {
        Self {
            limit,
            state: AtomicU64::new(pack(window_start, 0)),
        }
    }

    fn window_start(&self) -> u32 {
        unpack(self.state.load(Ordering::Acquire)).0
    }

    fn count(&self) -> u32 {
        unpack(self.state.load(Ordering::Relaxed)).1
    }

    /// Count one packet against the rule; false when the window is full
    ///
    /// Rolling the window and counting the packet are one update, so a
    /// reset can never erase packets already admitted in the new window.
    fn admit(&self, now: u32) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let (start, count) = match unpack(state) {
                    (start, _) if now > start => (now, 0),
                    current => current,
                };
                (count < self.limit).then(|| pack(start, count + 1))
            })
            .is_ok()
    }
}

/// Snapshot of one configured rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RateLimitEntry {
    pub port: u16,
    pub pps: u32,
    /// Packets admitted in the current window
    pub count: u32,
}

/// Rate limiter NF
#[derive(Debug)]
pub struct RateLimiter {
    rules: RwLock<HashMap<u16, Arc<RateLimitRule>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Insert or update the limit for `port`
    ///
    /// Updating an existing rule resets its count and keeps its window start.
    pub fn set_limit(&self, port: u16, pps: u32) -> Result<()> {
        let mut rules = write_table(&self.rules, "rate_limits");

        let window_start = match rules.get(&port) {
            Some(rule) => rule.window_start(),
            None if rules.len() >= MAX_RATE_LIMITS => {
                return Err(Error::CapacityExceeded {
                    table: "rate limit table",
                    max: MAX_RATE_LIMITS,
                });
            }
            None => window_secs(self.clock.as_ref()),
        };
        rules.insert(port, Arc::new(RateLimitRule::new(pps, window_start)));

        info!(port, pps, "Rate limit set");
        Ok(())
    }

    /// Delete the rule for `port`
    pub fn remove_limit(&self, port: u16) -> Result<()> {
        let removed = write_table(&self.rules, "rate_limits").remove(&port);
        match removed {
            Some(_) => {
                info!(port, "Rate limit removed");
                Ok(())
            }
            None => Err(Error::not_found(NfTarget::RateLimit(port))),
        }
    }

    /// Snapshot of every rule, ascending by port
    pub fn list(&self) -> Vec<RateLimitEntry> {
        let rules = read_table(&self.rules, "rate_limits");
        let mut entries: Vec<_> = rules
            .iter()
            .map(|(&port, rule)| RateLimitEntry {
                port,
                pps: rule.limit,
                count: rule.count(),
            })
            .collect();
        entries.sort_unstable_by_key(|e| e.port);
        entries
    }

    pub fn len(&self) -> usize {
        read_table(&self.rules, "rate_limits").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkFunction for RateLimiter {
    fn classify(&self, pkt: &PacketRef<'_>) -> Verdict {
        let Some((proto, port)) = parse_l4(pkt) else {
            return Verdict::Allow;
        };

        let rule = read_table(&self.rules, "rate_limits").get(&port).cloned();
        let Some(rule) = rule else {
            return Verdict::Allow;
        };

        if rule.admit(window_secs(self.clock.as_ref())) {
            Verdict::Allow
        } else {
            debug!(nf = "rate_limiter", %proto, port, pps = rule.limit, "Rate limit exceeded");
            Verdict::Deny
        }
    }
}
