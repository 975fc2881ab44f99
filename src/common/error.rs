//! Error Types for the Payout Daemon
//!
//! Every stage of a payout cycle reports failures through [`PayoutError`],
//! which has exactly three kinds:
//!
//! - **Recoverable**: a dependency (RPC, store) is unavailable or a self test
//!   failed. The driver abandons the current cycle and retries from scratch.
//! - **Critical**: payment integrity is at risk (solvency gate, unrecorded
//!   debit). The driver stops attempting payments until an operator steps in.
//! - **Skipped**: a single block/payment/address could not be handled. It is
//!   logged and deferred, and never aborts the surrounding pass.

use std::fmt;

use thiserror::Error;

/// Pipeline stage that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SelfTest,
    ScanHeight,
    BlockTracker,
    CreditCalculation,
    CreditMaturity,
    PaymentBatching,
    PaymentReconciliation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::SelfTest => write!(f, "self_test"),
            Stage::ScanHeight => write!(f, "scan_height"),
            Stage::BlockTracker => write!(f, "block_tracker"),
            Stage::CreditCalculation => write!(f, "credit_calculation"),
            Stage::CreditMaturity => write!(f, "credit_maturity"),
            Stage::PaymentBatching => write!(f, "payment_batching"),
            Stage::PaymentReconciliation => write!(f, "payment_reconciliation"),
        }
    }
}

/// Root error type for payout stages
#[derive(Debug, Error)]
pub enum PayoutError {
    /// Transient dependency failure, retry next cycle
    #[error("recoverable error in {stage}: {reason}")]
    Recoverable { stage: Stage, reason: String },

    /// Payment-integrity failure, halt all payment work
    #[error("critical payment error in {stage}: {reason}")]
    Critical { stage: Stage, reason: String },

    /// Single item deferred to the next cycle
    #[error("skipped {entity} in {stage}: {reason}")]
    Skipped {
        stage: Stage,
        entity: String,
        reason: String,
    },
}

impl PayoutError {
    /// Create a recoverable error
    pub fn recoverable(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Recoverable {
            stage,
            reason: reason.into(),
        }
    }

    /// Create a critical error
    pub fn critical(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Critical {
            stage,
            reason: reason.into(),
        }
    }

    /// Create a skipped-item error
    pub fn skipped(stage: Stage, entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Skipped {
            stage,
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Stage that raised this error
    pub fn stage(&self) -> Stage {
        match self {
            PayoutError::Recoverable { stage, .. }
            | PayoutError::Critical { stage, .. }
            | PayoutError::Skipped { stage, .. } => *stage,
        }
    }

    /// Whether this error must halt all further payment work
    pub fn is_critical(&self) -> bool {
        matches!(self, PayoutError::Critical { .. })
    }

    /// Get error code for structured logs
    pub fn error_code(&self) -> &'static str {
        match self {
            PayoutError::Recoverable { .. } => "RECOVERABLE_ERROR",
            PayoutError::Critical { .. } => "CRITICAL_PAYMENT_ERROR",
            PayoutError::Skipped { .. } => "SKIPPED",
        }
    }
}

/// Result type alias using PayoutError
pub type Result<T> = std::result::Result<T, PayoutError>;

/// Tag a component error with the kind and stage it represents
pub trait ResultExt<T> {
    fn recoverable(self, stage: Stage) -> Result<T>;
    fn critical(self, stage: Stage) -> Result<T>;
}

impl<T, E: fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn recoverable(self, stage: Stage) -> Result<T> {
        self.map_err(|e| PayoutError::recoverable(stage, e.to_string()))
    }

    fn critical(self, stage: Stage) -> Result<T> {
        self.map_err(|e| PayoutError::critical(stage, e.to_string()))
    }
}
