//! Control protocol commands
//!
//! One command per line. Keywords are case-insensitive; NF names are not.
//! Every command maps onto a single engine operation.

use crate::dataplane::{NfEngine, MAX_ALLOWED_PORTS, MAX_RATE_LIMITS};
use std::fmt::Write;

/// Banner sent on connect and in reply to `HELP`
pub const HELP: &str = "\
================================
  NFV Control Server
================================
Commands:
  STATS                      - Show packet statistics
  LIST                       - Show the NF chain
  ENABLE <name>              - Enable an NF
  DISABLE <name>             - Disable an NF
  REMOVE <name>              - Remove an NF from the chain
  ADD <rate_limiter|allowlist> - Append a built-in NF
  CLEAR                      - Remove every NF
  RATELIMIT SET <port> <pps> - Limit a destination port
  RATELIMIT REMOVE <port>    - Remove a port limit
  RATELIMIT LIST             - Show port limits
  ALLOW ADD <port>           - Allow a destination port
  ALLOW REMOVE <port>        - Stop allowing a port
  ALLOW LIST                 - Show allowed ports
  ALLOW CLEAR                - Allow all ports
  HELP                       - Show this message
  EXIT                       - Close connection
================================
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stats,
    List,
    Enable(String),
    Disable(String),
    Remove(String),
    Add(String),
    Clear,
    RateLimitSet { port: u16, pps: u32 },
    RateLimitRemove(u16),
    RateLimitList,
    AllowAdd(u16),
    AllowRemove(u16),
    AllowList,
    AllowClear,
    Help,
    Exit,
}

/// Why a line did not parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command")]
    Unknown,

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid port '{0}' (expected 1-65535)")]
    InvalidPort(String),

    #[error("invalid rate '{0}' (expected packets per second)")]
    InvalidRate(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Err(CommandError::Unknown);
        };
        let args: Vec<&str> = words.collect();
        let keyword = keyword.to_ascii_uppercase();

        let cmd = match (keyword.as_str(), args.as_slice()) {
            ("STATS", []) => Command::Stats,
            ("LIST", []) => Command::List,
            ("CLEAR", []) => Command::Clear,
            ("HELP", []) => Command::Help,
            ("EXIT", []) => Command::Exit,
            ("ENABLE", [name]) => Command::Enable(name.to_string()),
            ("ENABLE", _) => return Err(CommandError::Usage("ENABLE <name>")),
            ("DISABLE", [name]) => Command::Disable(name.to_string()),
            ("DISABLE", _) => return Err(CommandError::Usage("DISABLE <name>")),
            ("REMOVE", [name]) => Command::Remove(name.to_string()),
            ("REMOVE", _) => return Err(CommandError::Usage("REMOVE <name>")),
            ("ADD", [name]) => Command::Add(name.to_string()),
            ("ADD", _) => return Err(CommandError::Usage("ADD <rate_limiter|allowlist>")),
            ("RATELIMIT", [sub, rest @ ..]) => parse_ratelimit(sub, rest)?,
            ("RATELIMIT", []) => {
                return Err(CommandError::Usage("RATELIMIT <SET|REMOVE|LIST> ..."));
            }
            ("ALLOW", [sub, rest @ ..]) => parse_allow(sub, rest)?,
            ("ALLOW", []) => return Err(CommandError::Usage("ALLOW <ADD|REMOVE|LIST|CLEAR> ...")),
            _ => return Err(CommandError::Unknown),
        };
        Ok(cmd)
    }
}

fn parse_ratelimit(sub: &str, args: &[&str]) -> Result<Command, CommandError> {
    match (sub.to_ascii_uppercase().as_str(), args) {
        ("SET", [port, pps]) => Ok(Command::RateLimitSet {
            port: parse_port(port)?,
            pps: pps
                .parse()
                .map_err(|_| CommandError::InvalidRate(pps.to_string()))?,
        }),
        ("SET", _) => Err(CommandError::Usage("RATELIMIT SET <port> <pps>")),
        ("REMOVE", [port]) => Ok(Command::RateLimitRemove(parse_port(port)?)),
        ("REMOVE", _) => Err(CommandError::Usage("RATELIMIT REMOVE <port>")),
        ("LIST", []) => Ok(Command::RateLimitList),
        _ => Err(CommandError::Unknown),
    }
}

fn parse_allow(sub: &str, args: &[&str]) -> Result<Command, CommandError> {
    match (sub.to_ascii_uppercase().as_str(), args) {
        ("ADD", [port]) => Ok(Command::AllowAdd(parse_port(port)?)),
        ("ADD", _) => Err(CommandError::Usage("ALLOW ADD <port>")),
        ("REMOVE", [port]) => Ok(Command::AllowRemove(parse_port(port)?)),
        ("REMOVE", _) => Err(CommandError::Usage("ALLOW REMOVE <port>")),
        ("LIST", []) => Ok(Command::AllowList),
        ("CLEAR", []) => Ok(Command::AllowClear),
        _ => Err(CommandError::Unknown),
    }
}

fn parse_port(s: &str) -> Result<u16, CommandError> {
    match s.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(CommandError::InvalidPort(s.to_string())),
    }
}

/// Reply to one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Session should end after sending `text`
    pub close: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            close: false,
        }
    }

    fn ok(msg: impl std::fmt::Display) -> Self {
        Self::text(format!("OK {}\n", msg))
    }

    fn err(err: impl std::fmt::Display) -> Self {
        Self::text(format!("ERR {}\n", err))
    }
}

/// Parse and run one line against the engine
pub fn respond(line: &str, engine: &NfEngine) -> Reply {
    match Command::parse(line) {
        Ok(cmd) => execute(&cmd, engine),
        Err(e) => Reply::err(e),
    }
}

pub fn execute(cmd: &Command, engine: &NfEngine) -> Reply {
    let result = match cmd {
        Command::Stats => return Reply::text(format_stats(engine)),
        Command::List => return Reply::text(format_chain(engine)),
        Command::RateLimitList => return Reply::text(format_rate_limits(engine)),
        Command::AllowList => return Reply::text(format_allowlist(engine)),
        Command::Help => return Reply::text(HELP),
        Command::Exit => {
            return Reply {
                text: "Goodbye!\n".to_string(),
                close: true,
            };
        }
        Command::Enable(name) => engine
            .chain()
            .set_enabled(name, true)
            .map(|()| format!("NF '{}' enabled", name)),
        Command::Disable(name) => engine
            .chain()
            .set_enabled(name, false)
            .map(|()| format!("NF '{}' disabled", name)),
        Command::Remove(name) => engine
            .chain()
            .remove(name)
            .map(|()| format!("NF '{}' removed", name)),
        Command::Add(name) => engine
            .add_builtin(name)
            .map(|()| format!("NF '{}' added", name)),
        Command::Clear => {
            engine.chain().clear();
            Ok("chain cleared".to_string())
        }
        Command::RateLimitSet { port, pps } => engine
            .rate_limiter()
            .set_limit(*port, *pps)
            .map(|()| format!("port {} limited to {} pps", port, pps)),
        Command::RateLimitRemove(port) => engine
            .rate_limiter()
            .remove_limit(*port)
            .map(|()| format!("limit for port {} removed", port)),
        Command::AllowAdd(port) => engine
            .allowlist()
            .add(*port)
            .map(|()| format!("port {} allowed", port)),
        Command::AllowRemove(port) => engine
            .allowlist()
            .remove(*port)
            .map(|()| format!("port {} removed from allowlist", port)),
        Command::AllowClear => {
            engine.allowlist().clear();
            Ok("allowlist cleared, all ports allowed".to_string())
        }
    };

    match result {
        Ok(msg) => Reply::ok(msg),
        Err(e) => Reply::err(e),
    }
}

fn format_stats(engine: &NfEngine) -> String {
    let stats = engine.stats();
    let mut out = String::from("=== Capture Statistics ===\n");
    let _ = writeln!(out, "Total Packets:    {}", stats.total_packets);
    let _ = writeln!(out, "Total Bytes:      {}", stats.total_bytes);
    let _ = writeln!(out, "Passed Packets:   {}", stats.passed_packets);
    let _ = writeln!(out, "Dropped Packets:  {}", stats.dropped_packets);
    let _ = writeln!(out, "Bypassed Packets: {}", stats.bypassed_packets);
    let _ = writeln!(out, "Forward Errors:   {}", stats.forward_errors);
    out.push_str("==========================\n");
    out
}

fn format_chain(engine: &NfEngine) -> String {
    let entries = engine.chain().list();
    let mut out = String::from("=== NF Chain ===\n");
    if entries.is_empty() {
        out.push_str("(empty)\n");
    }
    for e in &entries {
        let _ = writeln!(
            out,
            "[{}] {} - {} (evaluated {}, dropped {})",
            e.position,
            e.name,
            if e.enabled { "enabled" } else { "disabled" },
            e.evaluated,
            e.dropped
        );
    }
    out.push_str("================\n");
    out
}

fn format_rate_limits(engine: &NfEngine) -> String {
    let rules = engine.rate_limiter().list();
    let mut out = String::from("=== Rate Limiter ===\n");
    if rules.is_empty() {
        out.push_str("(no limits configured)\n");
    }
    for r in &rules {
        let _ = writeln!(out, "Port {}: {} pps (current: {})", r.port, r.pps, r.count);
    }
    let _ = writeln!(out, "({}/{} rules)", rules.len(), MAX_RATE_LIMITS);
    out.push_str("====================\n");
    out
}

fn format_allowlist(engine: &NfEngine) -> String {
    let ports = engine.allowlist().list();
    let mut out = String::from("=== Allowlist ===\n");
    if ports.is_empty() {
        out.push_str("(empty - all ports allowed)\n");
    }
    for port in &ports {
        let _ = writeln!(out, "Port {}", port);
    }
    let _ = writeln!(out, "({}/{} ports)", ports.len(), MAX_ALLOWED_PORTS);
    out.push_str("=================\n");
    out
}
