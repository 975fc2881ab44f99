//! Storage Layer Module
//!
//! Persistence for the payout ledger.
//!
//! This module contains:
//! - The `LedgerStore` trait the payout stages are written against
//! - SQLite implementation for production and tests

pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use sqlite::SqliteLedger;
pub use traits::{LedgerStore, StorageError, StorageResult};
