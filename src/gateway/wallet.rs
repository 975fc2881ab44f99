//! Wallet RPC Gateway

use async_trait::async_trait;
use serde_json::json;

use super::jsonrpc::{JsonRpcClient, RpcError, RpcService};
use super::types::{
    Destination, Transfer, TransferParams, TransferResult, TransfersResult, WalletBalance,
    WalletHeight, WalletVersion,
};

/// Wallet operations used by the payout stages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletRpc: Send + Sync {
    /// Current wallet height
    async fn height(&self) -> Result<u64, RpcError>;

    async fn balance(&self) -> Result<WalletBalance, RpcError>;

    /// Incoming transfers with height in `[min_height, max_height]`
    async fn incoming_transfers(&self, min_height: u64, max_height: u64) -> Result<Vec<Transfer>, RpcError>;

    /// Pending and outgoing transfers from `min_height` on (pending first)
    async fn outgoing_transfers(&self, min_height: u64) -> Result<Vec<Transfer>, RpcError>;

    /// Send one transaction paying every destination
    async fn transfer(
        &self,
        destinations: &[Destination],
        priority: u32,
        ring_size: u64,
    ) -> Result<TransferResult, RpcError>;

    async fn rescan(&self) -> Result<(), RpcError>;

    async fn version(&self) -> Result<u64, RpcError>;
}

/// `wallet-rpc` over HTTP
pub struct HttpWallet {
    rpc: JsonRpcClient,
}

impl HttpWallet {
    pub fn new(url: &str, username: String, password: String) -> Result<Self, RpcError> {
        let rpc = JsonRpcClient::new(url, RpcService::Wallet)?.with_credentials(username, password);
        Ok(Self { rpc })
    }
}

#[async_trait]
impl WalletRpc for HttpWallet {
    async fn height(&self) -> Result<u64, RpcError> {
        let result: WalletHeight = self.rpc.call("get_height", None).await?;
        Ok(result.height)
    }

    async fn balance(&self) -> Result<WalletBalance, RpcError> {
        self.rpc.call("get_balance", None).await
    }

    async fn incoming_transfers(&self, min_height: u64, max_height: u64) -> Result<Vec<Transfer>, RpcError> {
        let params = json!({
            "in": true,
            "filter_by_height": true,
            "min_height": min_height,
            "max_height": max_height,
        });
        let result: TransfersResult = self.rpc.call("get_transfers", Some(params)).await?;
        Ok(result.incoming)
    }

    async fn outgoing_transfers(&self, min_height: u64) -> Result<Vec<Transfer>, RpcError> {
        let params = json!({
            "out": true,
            "pending": true,
            "filter_by_height": true,
            "min_height": min_height,
        });
        let result: TransfersResult = self.rpc.call("get_transfers", Some(params)).await?;

        let mut transfers = result.pending;
        transfers.extend(result.out);
        Ok(transfers)
    }

    async fn transfer(
        &self,
        destinations: &[Destination],
        priority: u32,
        ring_size: u64,
    ) -> Result<TransferResult, RpcError> {
        let params = TransferParams {
            destinations,
            priority,
            ring_size,
        };
        let params = serde_json::to_value(&params).map_err(|e| RpcError::Decode(e.to_string()))?;
        self.rpc.call("transfer", Some(params)).await
    }

    async fn rescan(&self) -> Result<(), RpcError> {
        let _: serde_json::Value = self.rpc.call("rescan_blockchain", None).await?;
        Ok(())
    }

    async fn version(&self) -> Result<u64, RpcError> {
        let result: WalletVersion = self.rpc.call("get_version", None).await?;
        Ok(result.version)
    }
}
