//! Payment Types
//!
//! A payment row is the ledger debit for one recipient of one transfer.
//! `txid` is missing when the transfer RPC failed and the outcome is
//! unknown; the reconciler later backfills it or leaves it for the next
//! cycle. `txhash` is the malleability-stable identity of the transaction.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Orphaned,
    Pending,
    Matured,
}

impl PaymentStatus {
    pub fn code(self) -> i64 {
        match self {
            PaymentStatus::Orphaned => -1,
            PaymentStatus::Pending => 0,
            PaymentStatus::Matured => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(PaymentStatus::Orphaned),
            0 => Some(PaymentStatus::Pending),
            1 => Some(PaymentStatus::Matured),
            _ => None,
        }
    }

    /// Terminal statuses never change again
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Orphaned => write!(f, "orphaned"),
            Self::Pending => write!(f, "pending"),
            Self::Matured => write!(f, "matured"),
        }
    }
}

/// A recorded payment debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub miner_uid: i64,
    pub txid: Option<String>,
    pub txhash: Option<String>,
    pub time: i64,
    pub amount_paid: u64,
    pub amount_fee: u64,
    pub status: PaymentStatus,
}

/// Debit to record for one recipient of a transfer
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub miner_uid: i64,
    pub txid: Option<String>,
    pub time: i64,
    pub amount_paid: u64,
    pub amount_fee: u64,
}
