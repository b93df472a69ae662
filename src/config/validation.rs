//! Configuration validation

use super::Config;
use crate::dataplane::{NfKind, MAX_ALLOWED_PORTS, MAX_RATE_LIMITS};
use crate::telemetry::{is_valid_format, is_valid_level};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_capture(config, &mut result);
    validate_logging(config, &mut result);
    validate_chain(config, &mut result);
    validate_rate_limits(config, &mut result);
    validate_allowlist(config, &mut result);

    result
}

/// Checks that only apply when starting the daemon
pub fn validate_for_run(config: &Config) -> ValidationResult {
    let mut result = validate(config);

    if config.capture.interface.is_none() {
        result.error("capture.interface: required to run");
    }
    if config.capture.forward_interface.is_none() {
        result.error("capture.forward_interface: required to run");
    }

    result
}

fn validate_capture(config: &Config, result: &mut ValidationResult) {
    let capture = &config.capture;

    if let (Some(rx), Some(tx)) = (&capture.interface, &capture.forward_interface) {
        if rx == tx {
            result.error(format!(
                "capture: interface and forward_interface are both {}",
                rx
            ));
        }
    }

    if capture.control_port == Some(0) {
        result.error("capture.control_port: port 0 is not valid");
    }

    if let Some(listen) = config.control.listen {
        if listen.port() != config.control_port() {
            result.warn(format!(
                "control.listen: port {} differs from capture.control_port {}, control traffic will go through the chain",
                listen.port(),
                config.control_port()
            ));
        }
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let Some(logging) = &config.logging else {
        return;
    };

    if !is_valid_level(&logging.level) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            logging.level
        ));
    }
    if !is_valid_format(&logging.format) {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            logging.format
        ));
    }
}

fn validate_chain(config: &Config, result: &mut ValidationResult) {
    let order = config.chain_order();
    if order.is_empty() {
        result.warn("chain.order: chain is empty, all traffic will pass");
    }

    let mut seen = HashSet::new();
    for name in &order {
        if NfKind::builtin(name).is_none() {
            result.error(format!(
                "chain.order: unknown NF '{}' (expected {} or {})",
                name,
                NfKind::RATE_LIMITER,
                NfKind::ALLOWLIST
            ));
        }
        if !seen.insert(name.as_str()) {
            result.error(format!("chain.order: NF '{}' listed twice", name));
        }
    }
}

fn validate_rate_limits(config: &Config, result: &mut ValidationResult) {
    let control_port = config.control_port();

    if config.rate_limits.len() > MAX_RATE_LIMITS {
        result.error(format!(
            "rate_limits: {} rules configured, at most {} allowed",
            config.rate_limits.len(),
            MAX_RATE_LIMITS
        ));
    }

    let mut seen = HashSet::new();
    for rule in &config.rate_limits {
        if rule.port == 0 {
            result.error("rate_limits: port 0 is not valid");
        }
        if !seen.insert(rule.port) {
            result.error(format!("rate_limits: port {} configured twice", rule.port));
        }
        if rule.pps == 0 {
            result.warn(format!(
                "rate_limits: port {} has pps = 0, all its traffic will be dropped",
                rule.port
            ));
        }
        if rule.port == control_port {
            result.warn(format!(
                "rate_limits: port {} is the control port and bypasses the chain",
                rule.port
            ));
        }
    }
}

fn validate_allowlist(config: &Config, result: &mut ValidationResult) {
    let ports = &config.allowlist.ports;
    let unique: HashSet<u16> = ports.iter().copied().collect();

    if unique.len() > MAX_ALLOWED_PORTS {
        result.error(format!(
            "allowlist.ports: {} ports configured, at most {} allowed",
            unique.len(),
            MAX_ALLOWED_PORTS
        ));
    }
    if unique.contains(&0) {
        result.error("allowlist.ports: port 0 is not valid");
    }
    if unique.contains(&config.control_port()) {
        result.warn(format!(
            "allowlist.ports: port {} is the control port and bypasses the chain",
            config.control_port()
        ));
    }
    if !ports.is_empty() && !config.chain_order().iter().any(|n| n == NfKind::ALLOWLIST) {
        result.warn("allowlist.ports: allowlist is not in chain.order, ports have no effect");
    }
}
