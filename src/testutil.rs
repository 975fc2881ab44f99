//! In-memory wallet and daemon used by the stage tests
//!
//! The fakes keep just enough chain state for the stages to observe:
//! incoming block rewards, outgoing transfers, balances and decoded
//! transaction bodies.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::common::config::PayoutConfig;
use crate::context::PayoutContext;
use crate::gateway::types::TransferResult;
use crate::gateway::{
    BlockHeader, DaemonInfo, DaemonRpc, DaemonTransaction, Destination, FeeEstimate, RpcError,
    Transfer, WalletBalance, WalletRpc,
};
use crate::storage::SqliteLedger;

fn down(what: &str) -> RpcError {
    RpcError::Transport(format!("{} unavailable", what))
}

#[derive(Debug, Default)]
pub struct WalletState {
    pub height: u64,
    pub balance: u64,
    pub unlocked: u64,
    pub incoming: Vec<Transfer>,
    pub outgoing: Vec<Transfer>,
    /// Destinations of every transfer call, including failed ones
    pub sent: Vec<Vec<Destination>>,
    /// Fee charged by each successful transfer
    pub transfer_fee: u64,
    /// Scripted transfer failures, consumed one per call
    pub transfer_failures: VecDeque<bool>,
    pub rescans: usize,
    pub offline: bool,
    pub fail_incoming: bool,
    pub fail_rescan: bool,
}

#[derive(Default)]
pub struct FakeWallet {
    pub state: Mutex<WalletState>,
}

impl FakeWallet {
    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    pub fn set_balance(&self, balance: u64, unlocked: u64) {
        let mut state = self.state.lock().unwrap();
        state.balance = balance;
        state.unlocked = unlocked;
    }

    /// Reward transfer the wallet sees for a mined block
    pub fn add_block_reward(&self, height: u64, txid: &str, amount: u64) {
        self.state.lock().unwrap().incoming.push(Transfer {
            txid: txid.to_string(),
            height,
            kind: "block".to_string(),
            amount,
            fee: 0,
            destinations: Vec::new(),
        });
    }

    pub fn add_outgoing(&self, txid: &str, height: u64, fee: u64, destinations: Vec<Destination>) {
        self.state.lock().unwrap().outgoing.push(Transfer {
            txid: txid.to_string(),
            height,
            kind: "out".to_string(),
            amount: destinations.iter().map(|d| d.amount).sum(),
            fee,
            destinations,
        });
    }

    pub fn sent(&self) -> Vec<Vec<Destination>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn rescans(&self) -> usize {
        self.state.lock().unwrap().rescans
    }
}

#[async_trait]
impl WalletRpc for FakeWallet {
    async fn height(&self) -> Result<u64, RpcError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(down("wallet"));
        }
        Ok(state.height)
    }

    async fn balance(&self) -> Result<WalletBalance, RpcError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(down("wallet"));
        }
        Ok(WalletBalance {
            balance: state.balance,
            unlocked_balance: state.unlocked,
        })
    }

    async fn incoming_transfers(&self, min_height: u64, max_height: u64) -> Result<Vec<Transfer>, RpcError> {
        let state = self.state.lock().unwrap();
        if state.offline || state.fail_incoming {
            return Err(down("wallet"));
        }
        Ok(state
            .incoming
            .iter()
            .filter(|t| t.height >= min_height && t.height <= max_height)
            .cloned()
            .collect())
    }

    async fn outgoing_transfers(&self, min_height: u64) -> Result<Vec<Transfer>, RpcError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(down("wallet"));
        }
        Ok(state
            .outgoing
            .iter()
            .filter(|t| t.height == 0 || t.height >= min_height)
            .cloned()
            .collect())
    }

    async fn transfer(
        &self,
        destinations: &[Destination],
        _priority: u32,
        _ring_size: u64,
    ) -> Result<TransferResult, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(destinations.to_vec());

        if state.offline || state.transfer_failures.pop_front().unwrap_or(false) {
            return Err(down("wallet"));
        }

        let total: u64 = destinations.iter().map(|d| d.amount).sum::<u64>() + state.transfer_fee;
        state.balance -= total;
        state.unlocked -= total;

        let txid = format!("tx{}", state.sent.len());
        let fee = state.transfer_fee;
        state.outgoing.push(Transfer {
            txid: txid.clone(),
            height: 0,
            kind: "pending".to_string(),
            amount: total - fee,
            fee,
            destinations: destinations.to_vec(),
        });

        Ok(TransferResult { tx_hash: txid, fee })
    }

    async fn rescan(&self) -> Result<(), RpcError> {
        let mut state = self.state.lock().unwrap();
        if state.offline || state.fail_rescan {
            return Err(down("wallet"));
        }
        state.rescans += 1;
        Ok(())
    }

    async fn version(&self) -> Result<u64, RpcError> {
        if self.state.lock().unwrap().offline {
            return Err(down("wallet"));
        }
        Ok(65562)
    }
}

#[derive(Debug, Default)]
pub struct DaemonState {
    /// Block header reward by height
    pub rewards: HashMap<u64, u64>,
    pub fee_estimate: Option<FeeEstimate>,
    pub transactions: Vec<DaemonTransaction>,
    pub offline: bool,
}

#[derive(Default)]
pub struct FakeDaemon {
    pub state: Mutex<DaemonState>,
}

impl FakeDaemon {
    pub fn set_reward(&self, height: u64, reward: u64) {
        self.state.lock().unwrap().rewards.insert(height, reward);
    }

    /// Transaction known to the daemon with the given output keys
    pub fn add_transaction(&self, txid: &str, block_height: u64, output_keys: &[&str]) {
        self.state.lock().unwrap().transactions.push(DaemonTransaction {
            tx_hash: txid.to_string(),
            block_height,
            as_json: tx_body(output_keys),
        });
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }
}

#[async_trait]
impl DaemonRpc for FakeDaemon {
    async fn block_header(&self, height: u64) -> Result<BlockHeader, RpcError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(down("daemon"));
        }
        let reward = state
            .rewards
            .get(&height)
            .copied()
            .ok_or_else(|| RpcError::Remote {
                code: -2,
                message: format!("no block at height {}", height),
            })?;
        Ok(BlockHeader { reward, height })
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, RpcError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(down("daemon"));
        }
        Ok(state.fee_estimate.unwrap_or(FeeEstimate {
            fee: 0,
            quantization_mask: 1,
        }))
    }

    async fn transactions(&self, txids: &[String]) -> Result<Vec<DaemonTransaction>, RpcError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(down("daemon"));
        }
        Ok(state
            .transactions
            .iter()
            .filter(|t| txids.contains(&t.tx_hash))
            .cloned()
            .collect())
    }

    async fn info(&self) -> Result<DaemonInfo, RpcError> {
        if self.state.lock().unwrap().offline {
            return Err(down("daemon"));
        }
        Ok(DaemonInfo {
            height: 0,
            status: "OK".to_string(),
        })
    }
}

/// Decoded transaction body with one output per key
pub fn tx_body(output_keys: &[&str]) -> String {
    let vout: Vec<_> = output_keys
        .iter()
        .map(|key| serde_json::json!({ "amount": 0, "target": { "key": key } }))
        .collect();
    serde_json::json!({ "version": 2, "vout": vout }).to_string()
}

/// Config with small depths and a single 100% dev split to uid 1
pub fn test_config() -> PayoutConfig {
    let mut config = PayoutConfig::default();
    config.general.block_mature_depth = 10;
    config.general.block_orphan_depth = 5;
    config.general.at_risk_margin = 10;
    config.payments.max_recipients = 5;
    config.payments.warning_threshold = 10_000;
    config.payments.network_block_interval = 1;
    config
}

pub struct Harness {
    pub ctx: PayoutContext,
    pub store: Arc<SqliteLedger>,
    pub wallet: Arc<FakeWallet>,
    pub daemon: Arc<FakeDaemon>,
}

pub fn harness(config: PayoutConfig) -> Harness {
    let store = Arc::new(SqliteLedger::in_memory().unwrap());
    let wallet = Arc::new(FakeWallet::default());
    let daemon = Arc::new(FakeDaemon::default());
    let ctx = PayoutContext::new(config, store.clone(), wallet.clone(), daemon.clone());

    Harness {
        ctx,
        store,
        wallet,
        daemon,
    }
}
