//! Credit Types
//!
//! One credit row exists per (block, miner). Amounts never change after
//! the row is written; only the status follows the parent block.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Orphaned,
    Pending,
    Matured,
}

impl CreditStatus {
    pub fn code(self) -> i64 {
        match self {
            CreditStatus::Orphaned => -1,
            CreditStatus::Pending => 0,
            CreditStatus::Matured => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(CreditStatus::Orphaned),
            0 => Some(CreditStatus::Pending),
            1 => Some(CreditStatus::Matured),
            _ => None,
        }
    }
}

impl std::fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Orphaned => write!(f, "orphaned"),
            Self::Pending => write!(f, "pending"),
            Self::Matured => write!(f, "matured"),
        }
    }
}

/// Credit owed to a miner for one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub block_id: i64,
    pub miner_uid: i64,
    /// Ledger time the credit was calculated
    pub time: i64,
    /// PPLNS share of the discounted reward
    pub amount_reward: Option<u64>,
    pub amount_bonus: Option<u64>,
    /// Dev/operator fee split
    pub amount_dev: Option<u64>,
    pub status: CreditStatus,
}

impl Credit {
    /// Sum of all amount columns, treating missing ones as zero
    pub fn total(&self) -> u64 {
        self.amount_reward.unwrap_or(0) + self.amount_bonus.unwrap_or(0) + self.amount_dev.unwrap_or(0)
    }
}
