//! Miner and Share Types
//!
//! Users and shares are written by the mining backend; payoutd only reads
//! them.

use serde::{Deserialize, Serialize};

/// A pool user (miner or fee recipient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uid: i64,
    pub wallet_address: String,
    /// Minimum confirmed balance before a payout is made
    pub payment_threshold: u64,
}

/// Submitted work, weighted by difficulty-equivalent `count`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Share {
    pub miner_uid: i64,
    /// Ledger time the share was accepted
    pub time: i64,
    pub count: u64,
}

/// A user's ledger position as seen by the payment batcher
#[derive(Debug, Clone, PartialEq)]
pub struct UserBalance {
    pub uid: i64,
    pub wallet_address: String,
    pub payment_threshold: u64,
    /// Credits whose block has not matured yet
    pub credits_pending: u64,
    /// Credits whose block has matured
    pub credits_matured: u64,
    /// Paid amount plus fee of every payment that is not orphaned
    pub debits: u64,
}

impl UserBalance {
    /// Matured credits minus debits; negative when over-paid
    pub fn confirmed_balance(&self) -> i64 {
        self.credits_matured as i64 - self.debits as i64
    }
}
