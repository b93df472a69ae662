use std::fmt;
use std::io;

/// What a control operation failed to find
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfTarget {
    /// Named entry in the NF chain
    Function(String),
    /// Rate-limit rule keyed by destination port
    RateLimit(u16),
    /// Port in the allowlist
    AllowedPort(u16),
}

impl fmt::Display for NfTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NfTarget::Function(name) => write!(f, "NF '{}'", name),
            NfTarget::RateLimit(port) => write!(f, "rate limit for port {}", port),
            NfTarget::AllowedPort(port) => write!(f, "port {} in allowlist", port),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("interface {name} has no input handler to wrap")]
    InvalidInterface { name: String },

    #[error("interface {name} is already hooked")]
    AlreadyHooked { name: String },

    #[error("{what} not found")]
    NotFound { what: NfTarget },

    #[error("NF '{name}' already exists in the chain")]
    DuplicateName { name: String },

    #[error("{table} is full (max {max} entries)")]
    CapacityExceeded { table: &'static str, max: usize },

    #[error("forward failed: {0}")]
    Forward(String),
}

impl Error {
    pub(crate) fn not_found(what: NfTarget) -> Self {
        Error::NotFound { what }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::not_found(NfTarget::Function("firewall".into()));
        assert_eq!(err.to_string(), "NF 'firewall' not found");

        let err = Error::not_found(NfTarget::RateLimit(80));
        assert_eq!(err.to_string(), "rate limit for port 80 not found");

        let err = Error::CapacityExceeded {
            table: "allowlist",
            max: 64,
        };
        assert_eq!(err.to_string(), "allowlist is full (max 64 entries)");
    }
}
