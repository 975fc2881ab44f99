//! Ledger Store Interface
//!
//! The payout stages touch the ledger only through these typed operations.
//! Each call is atomic on its own; no operation spans several statements
//! in a transaction, so every multi-step sequence in the stages must be
//! safe to interrupt between calls.

use thiserror::Error;

use crate::types::{
    Block, BlockStatus, Credit, CreditStatus, NewPayment, Payment, PaymentStatus, Share, User,
    UserBalance,
};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Payout ledger: blocks, shares, credits, users, payments, scan height
///
/// Implementations:
/// - `SqliteLedger` - SQLite with r2d2 pooling (file-backed or in-memory)
pub trait LedgerStore: Send + Sync {
    /// Cheap liveness probe used by the self test
    fn ping(&self) -> StorageResult<()>;

    // --- blocks -----------------------------------------------------------

    /// Record a mined block, returning its id
    fn insert_block(&self, block: &Block) -> StorageResult<i64>;

    fn get_block(&self, id: i64) -> StorageResult<Option<Block>>;

    fn blocks_by_status(&self, status: BlockStatus) -> StorageResult<Vec<Block>>;

    /// ORPHANED blocks that still have credits not yet voided
    fn orphaned_blocks_with_live_credits(&self) -> StorageResult<Vec<Block>>;

    /// Blocks with status in OK..=CREDITED, ordered by height
    fn unfinalized_blocks(&self) -> StorageResult<Vec<Block>>;

    fn set_block_reward(&self, id: i64, reward: u64, reward_total: u64) -> StorageResult<()>;

    fn set_block_status(&self, id: i64, status: BlockStatus) -> StorageResult<()>;

    // --- shares -----------------------------------------------------------

    fn insert_share(&self, share: &Share) -> StorageResult<()>;

    /// Latest share time at or before `end_time` at which the running share
    /// count, accumulated newest first, reaches `threshold`
    fn pplns_window_start(&self, end_time: i64, threshold: u64) -> StorageResult<Option<i64>>;

    /// Share count per miner within `[start_time, end_time]`, ordered by uid
    fn share_totals(&self, start_time: i64, end_time: i64) -> StorageResult<Vec<(i64, u64)>>;

    // --- credits ----------------------------------------------------------

    /// Insert a credit; a second credit for the same (block, miner) is a duplicate
    fn insert_credit(&self, credit: &Credit) -> StorageResult<()>;

    fn credits_for_block(&self, block_id: i64) -> StorageResult<Vec<Credit>>;

    /// Set the status of every credit of a block, returning rows changed
    fn set_credit_status(&self, block_id: i64, status: CreditStatus) -> StorageResult<usize>;

    // --- users ------------------------------------------------------------

    fn insert_user(&self, user: &User) -> StorageResult<()>;

    /// Every user with pending credits, matured credits and non-orphaned debits
    fn user_balances(&self) -> StorageResult<Vec<UserBalance>>;

    // --- payments ---------------------------------------------------------

    /// Record a payment debit with status PENDING, returning its id
    fn insert_payment(&self, payment: &NewPayment) -> StorageResult<i64>;

    fn get_payment(&self, id: i64) -> StorageResult<Option<Payment>>;

    /// Payments with status PENDING, ordered by id
    fn pending_payments(&self) -> StorageResult<Vec<Payment>>;

    fn update_payment(
        &self,
        id: i64,
        txid: Option<&str>,
        txhash: Option<&str>,
        status: PaymentStatus,
    ) -> StorageResult<()>;

    /// Fill in txid, txhash and the actual fee of a payment recorded without txid
    fn backfill_payment(&self, id: i64, txid: &str, txhash: &str, amount_fee: u64) -> StorageResult<()>;

    // --- scan height ------------------------------------------------------

    /// Last fully processed wallet height
    fn scan_height(&self) -> StorageResult<u64>;

    fn set_scan_height(&self, height: u64, time: i64) -> StorageResult<()>;
}
