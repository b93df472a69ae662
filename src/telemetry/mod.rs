//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Capture statistics counters

mod logging;
mod metrics;

pub use logging::{init_logging, is_valid_format, is_valid_level, LogConfig};
pub use metrics::{CaptureStats, CaptureStatsSnapshot, Counter};
