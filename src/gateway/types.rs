//! Typed RPC Records
//!
//! One record per wallet/daemon method result. Fields the services may
//! omit carry `#[serde(default)]`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Wallet
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WalletHeight {
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WalletBalance {
    pub balance: u64,
    pub unlocked_balance: u64,
}

impl WalletBalance {
    pub fn locked(&self) -> u64 {
        self.balance.saturating_sub(self.unlocked_balance)
    }
}

/// A payment destination, both sent and reported back by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub amount: u64,
}

/// One entry of `get_transfers`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transfer {
    pub txid: String,
    #[serde(default)]
    pub height: u64,
    /// "block", "in", "out", "pending", ...
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransfersResult {
    #[serde(rename = "in", default)]
    pub incoming: Vec<Transfer>,
    #[serde(default)]
    pub out: Vec<Transfer>,
    #[serde(default)]
    pub pending: Vec<Transfer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferParams<'a> {
    pub destinations: &'a [Destination],
    pub priority: u32,
    pub ring_size: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferResult {
    pub tx_hash: String,
    pub fee: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletVersion {
    pub version: u64,
}

// =============================================================================
// Daemon
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockHeader {
    pub reward: u64,
    #[serde(default)]
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockResult {
    pub block_header: BlockHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FeeEstimate {
    /// Fee per byte in atomic units
    pub fee: u64,
    pub quantization_mask: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonInfo {
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub status: String,
}

/// One entry of `/get_transactions`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DaemonTransaction {
    pub tx_hash: String,
    /// 0 while the transaction is still in the pool
    #[serde(default)]
    pub block_height: u64,
    /// Transaction body as a JSON string (requested with `decode_as_json`)
    #[serde(default)]
    pub as_json: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionsResult {
    #[serde(default)]
    pub txs: Vec<DaemonTransaction>,
    #[serde(default)]
    pub status: String,
}

/// Decoded transaction body; only the outputs are of interest
#[derive(Debug, Clone, Deserialize)]
pub struct TxBody {
    #[serde(default)]
    pub vout: Vec<TxOut>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOut {
    pub target: TxOutTarget,
}

/// Output target; older transactions use `key`, view-tagged ones `tagged_key`
#[derive(Debug, Clone, Deserialize)]
pub struct TxOutTarget {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub tagged_key: Option<TaggedKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggedKey {
    pub key: String,
}

impl TxOutTarget {
    pub fn output_key(&self) -> Option<&str> {
        self.key
            .as_deref()
            .or_else(|| self.tagged_key.as_ref().map(|t| t.key.as_str()))
    }
}
