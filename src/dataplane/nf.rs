//! Network function abstraction

use super::packet::PacketRef;
use std::fmt;

/// Outcome of classifying one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// Let the packet continue
    #[default]
    Allow,
    /// Drop the packet
    Deny,
}

impl Verdict {
    pub fn is_allow(self) -> bool {
        self == Verdict::Allow
    }
}

impl From<bool> for Verdict {
    fn from(allow: bool) -> Self {
        if allow { Verdict::Allow } else { Verdict::Deny }
    }
}

/// A packet classifier that can sit in the chain
///
/// Implementations run on the packet path: they must not block and must
/// treat unparseable input as `Allow`.
pub trait NetworkFunction: Send + Sync {
    fn classify(&self, pkt: &PacketRef<'_>) -> Verdict;
}

impl<F> NetworkFunction for F
where
    F: Fn(&PacketRef<'_>) -> Verdict + Send + Sync,
{
    fn classify(&self, pkt: &PacketRef<'_>) -> Verdict {
        self(pkt)
    }
}

/// Variant tag carried by each chain entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NfKind {
    RateLimiter,
    Allowlist,
    Custom,
}

impl NfKind {
    pub const RATE_LIMITER: &'static str = "rate_limiter";
    pub const ALLOWLIST: &'static str = "allowlist";

    /// Resolve a built-in NF by its canonical name
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            Self::RATE_LIMITER => Some(NfKind::RateLimiter),
            Self::ALLOWLIST => Some(NfKind::Allowlist),
            _ => None,
        }
    }
}

impl fmt::Display for NfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NfKind::RateLimiter => write!(f, "{}", Self::RATE_LIMITER),
            NfKind::Allowlist => write!(f, "{}", Self::ALLOWLIST),
            NfKind::Custom => write!(f, "custom"),
        }
    }
}
