//! Common Infrastructure Module
//!
//! This module contains:
//! - Configuration loading from a JSON file with env overrides
//! - Structured logging setup and audit events
//! - The tagged payout error type

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, FeeSplit, PayoutConfig};
pub use error::{PayoutError, Result, ResultExt, Stage};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_block_event, log_credit_event,
    log_payment_event, log_reconcile_event, log_system_event, EventCategory, LogEvent, LogLevel,
    LoggingError,
};
