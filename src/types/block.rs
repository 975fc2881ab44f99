//! Mined Block Types
//!
//! A mined block moves through:
//!
//! ```text
//! OK → TX_SEEN → CREDITED → MATURED → CLOSED
//!  └──────┴──→ ORPHANED
//! ```
//!
//! ORPHANED is reachable only before the block has been credited. Once
//! credits exist the block can only move forward.

use serde::{Deserialize, Serialize};

/// Status of a mined block, stored as its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Orphaned,
    Failed,
    Ok,
    TxSeen,
    Credited,
    Matured,
    Closed,
}

impl BlockStatus {
    /// Integer code used by the ledger
    pub fn code(self) -> i64 {
        match self {
            BlockStatus::Orphaned => -1,
            BlockStatus::Failed => 0,
            BlockStatus::Ok => 1,
            BlockStatus::TxSeen => 2,
            BlockStatus::Credited => 3,
            BlockStatus::Matured => 4,
            BlockStatus::Closed => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(BlockStatus::Orphaned),
            0 => Some(BlockStatus::Failed),
            1 => Some(BlockStatus::Ok),
            2 => Some(BlockStatus::TxSeen),
            3 => Some(BlockStatus::Credited),
            4 => Some(BlockStatus::Matured),
            5 => Some(BlockStatus::Closed),
            _ => None,
        }
    }

    /// Whether `self -> next` is a permitted lifecycle edge
    pub fn can_advance_to(self, next: BlockStatus) -> bool {
        matches!(
            (self, next),
            (BlockStatus::Ok, BlockStatus::TxSeen)
                | (BlockStatus::Ok, BlockStatus::Orphaned)
                | (BlockStatus::TxSeen, BlockStatus::Credited)
                | (BlockStatus::TxSeen, BlockStatus::Orphaned)
                | (BlockStatus::Credited, BlockStatus::Matured)
                | (BlockStatus::Matured, BlockStatus::Closed)
        )
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Orphaned => write!(f, "orphaned"),
            Self::Failed => write!(f, "failed"),
            Self::Ok => write!(f, "ok"),
            Self::TxSeen => write!(f, "tx_seen"),
            Self::Credited => write!(f, "credited"),
            Self::Matured => write!(f, "matured"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A block mined by the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub height: u64,
    /// Txid of the pool's reward (coinbase) transaction
    pub txid: String,
    pub difficulty: u64,
    /// Ledger time the block was found
    pub time: i64,
    /// Miner who found the block
    pub miner_uid: i64,
    /// Reward observed by the wallet, set at TX_SEEN
    pub reward: Option<u64>,
    /// Total block reward reported by the daemon, set at TX_SEEN
    pub reward_total: Option<u64>,
    pub status: BlockStatus,
}

impl Block {
    /// New block as recorded by the mining backend
    pub fn new(height: u64, txid: impl Into<String>, difficulty: u64, time: i64, miner_uid: i64) -> Self {
        Self {
            id: 0,
            height,
            txid: txid.into(),
            difficulty,
            time,
            miner_uid,
            reward: None,
            reward_total: None,
            status: BlockStatus::Ok,
        }
    }
}
