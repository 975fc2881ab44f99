//! Structured Logging for payoutd
//!
//! Every state transition and every money-moving action is logged as a
//! structured audit event carrying the identifiers an operator needs to
//! reconcile the ledger by hand (block height, block id, miner uid,
//! payment id, txid).
//!
//! ```rust,ignore
//! use payoutd::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?; // JSON mode for log shipping
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for audit logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Block status transitions
    Block,
    /// Credit creation and status changes
    Credit,
    /// Transfers and payment debits
    Payment,
    /// Payment reconciliation against the chain
    Reconcile,
    /// Startup, shutdown, cycles
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (RFC 3339)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    /// Correlation ID of the payout cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Audit Events
// ============================================================================

/// Log a block status transition
pub fn log_block_event(event_type: &str, block_id: i64, height: u64, status: &str) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Block, event_type).with_data(
        serde_json::json!({
            "block_id": block_id,
            "height": height,
            "status": status
        }),
    );

    tracing::info!(target: "payoutd::block", "{}", event.to_json());
}

/// Log a credit written or changed for a miner
pub fn log_credit_event(
    event_type: &str,
    block_id: i64,
    miner_uid: Option<i64>,
    amount_reward: Option<u64>,
    amount_dev: Option<u64>,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Credit, event_type).with_data(
        serde_json::json!({
            "block_id": block_id,
            "miner_uid": miner_uid,
            "amount_reward": amount_reward,
            "amount_dev": amount_dev,
            "success": success
        }),
    );

    if let Some(err) = error {
        event = event.with_error("CREDIT_ERROR", err);
    }

    if success {
        tracing::info!(target: "payoutd::credit", "{}", event.to_json());
    } else {
        tracing::error!(target: "payoutd::credit", "{}", event.to_json());
    }
}

/// Log a money-moving action (transfer or recorded debit)
pub fn log_payment_event(
    event_type: &str,
    miner_uid: i64,
    amount_paid: u64,
    amount_fee: u64,
    txid: Option<&str>,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Payment, event_type).with_data(
        serde_json::json!({
            "miner_uid": miner_uid,
            "amount_paid": amount_paid,
            "amount_fee": amount_fee,
            "txid": txid,
            "success": success
        }),
    );

    if let Some(err) = error {
        event = event.with_error("PAYMENT_ERROR", err);
    }

    if success {
        tracing::info!(target: "payoutd::payment", "{}", event.to_json());
    } else {
        tracing::error!(target: "payoutd::payment", "{}", event.to_json());
    }
}

/// Log a reconciliation outcome for a recorded payment
pub fn log_reconcile_event(
    event_type: &str,
    payment_id: i64,
    txid: Option<&str>,
    txhash: Option<&str>,
    status: &str,
) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Reconcile, event_type).with_data(
        serde_json::json!({
            "payment_id": payment_id,
            "txid": txid,
            "txhash": txhash,
            "status": status
        }),
    );

    tracing::info!(target: "payoutd::reconcile", "{}", event.to_json());
}

/// Log a system event tied to a payout cycle
pub fn log_system_event(event_type: &str, correlation_id: &str, data: serde_json::Value) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::System, event_type)
        .with_correlation_id(correlation_id)
        .with_data(data);

    tracing::info!(target: "payoutd::system", "{}", event.to_json());
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("payoutd={}", format!("{:?}", level).to_lowercase()))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from PayoutConfig
pub fn init_from_config(config: &super::config::PayoutConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.logging.level.as_str());
    init_logging(level, config.logging.json)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a correlation ID for one payout cycle
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
