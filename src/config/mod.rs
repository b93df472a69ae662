//! Configuration management
//!
//! Handles loom.toml (user-defined) and the effective configuration with all
//! defaults filled in. Configuration is read once at startup; runtime
//! changes made over the control plane are never written back.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, validate_for_run, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Render the effective configuration as TOML
pub fn render_effective(config: &Config) -> Result<String> {
    toml::to_string_pretty(&EffectiveConfig::from_config(config))
        .map_err(|e| Error::Config(e.to_string()))
}
