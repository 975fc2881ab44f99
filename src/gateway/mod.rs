//! Chain Gateway Module
//!
//! JSON-RPC access to the full-node daemon and the pool wallet.
//!
//! This module contains:
//! - `JsonRpcClient`, the shared HTTP transport and its uniform `RpcError`
//! - `WalletRpc` / `DaemonRpc` traits the payout stages depend on
//! - `HttpWallet` / `HttpDaemon`, the production implementations

pub mod daemon;
pub mod jsonrpc;
pub mod types;
pub mod wallet;

// Re-exports for convenience
pub use daemon::{DaemonRpc, HttpDaemon};
pub use jsonrpc::{JsonRpcClient, RpcError, RpcService};
pub use types::{
    BlockHeader, DaemonInfo, DaemonTransaction, Destination, FeeEstimate, Transfer,
    TransferResult, TxBody, WalletBalance,
};
pub use wallet::{HttpWallet, WalletRpc};

#[cfg(test)]
pub use daemon::MockDaemonRpc;
#[cfg(test)]
pub use wallet::MockWalletRpc;
