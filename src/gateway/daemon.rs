//! Daemon RPC Gateway

use async_trait::async_trait;
use serde_json::json;

use super::jsonrpc::{JsonRpcClient, RpcError, RpcService};
use super::types::{BlockHeader, BlockResult, DaemonInfo, DaemonTransaction, FeeEstimate, TransactionsResult};

/// Daemon operations used by the payout stages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DaemonRpc: Send + Sync {
    async fn block_header(&self, height: u64) -> Result<BlockHeader, RpcError>;

    async fn fee_estimate(&self) -> Result<FeeEstimate, RpcError>;

    /// Transactions by txid, decoded as JSON
    async fn transactions(&self, txids: &[String]) -> Result<Vec<DaemonTransaction>, RpcError>;

    async fn info(&self) -> Result<DaemonInfo, RpcError>;
}

/// `monerod`-style daemon over HTTP
pub struct HttpDaemon {
    rpc: JsonRpcClient,
}

impl HttpDaemon {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url, RpcService::Daemon)?,
        })
    }
}

#[async_trait]
impl DaemonRpc for HttpDaemon {
    async fn block_header(&self, height: u64) -> Result<BlockHeader, RpcError> {
        let result: BlockResult = self.rpc.call("get_block", Some(json!({ "height": height }))).await?;
        Ok(result.block_header)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, RpcError> {
        self.rpc.call("get_fee_estimate", None).await
    }

    async fn transactions(&self, txids: &[String]) -> Result<Vec<DaemonTransaction>, RpcError> {
        if txids.is_empty() {
            return Ok(Vec::new());
        }

        let params = json!({
            "txs_hashes": txids,
            "decode_as_json": true,
        });
        let result: TransactionsResult = self.rpc.call_other("get_transactions", &params).await?;
        Ok(result.txs)
    }

    async fn info(&self) -> Result<DaemonInfo, RpcError> {
        self.rpc.call("get_info", None).await
    }
}
