//! payoutd - Mining Pool Payout Daemon
//!
//! Settles a pool's mined blocks into miner payments:
//!
//! 1. **Block tracker** - follows each mined block's reward in the wallet
//!    until it matures or is orphaned
//! 2. **Credit engine** - splits a block's reward over the PPLNS share
//!    window and releases the credits once the block matures
//! 3. **Payment batcher** - pays confirmed balances in batched transfers,
//!    behind a solvency gate
//! 4. **Payment reconciler** - follows payments on chain by a
//!    malleability-stable hash until they mature or are orphaned
//!
//! [`service::PayoutService`] drives the stages in that order once per new
//! wallet height. All state lives in the SQLite ledger ([`storage`]); the
//! wallet and daemon are reached over JSON-RPC ([`gateway`]).

pub mod address;
pub mod block_tracker;
pub mod common;
pub mod context;
pub mod credit;
pub mod fee;
pub mod gateway;
pub mod payments;
pub mod pidfile;
pub mod service;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-exports: infrastructure
pub use common::{ConfigError, PayoutConfig, PayoutError, Result, Stage};
pub use context::{PayoutContext, SetupError};
pub use pidfile::{PidFile, PidFileError};

// Re-exports: stages
pub use block_tracker::{BlockTracker, TrackerReport};
pub use credit::CreditEngine;
pub use payments::{accounting_report, AccountingReport, PaymentBatcher, PaymentReconciler};
pub use service::{CycleOutcome, CycleReport, PayoutService, RunOutcome, HALT_DURATION};

// Re-exports: storage
pub use storage::{LedgerStore, SqliteLedger, StorageError};
