//! Payout Context
//!
//! The handles every stage works with: configuration, the ledger and the
//! two RPC gateways. Built once by the driver and cloned into each stage.

use std::sync::Arc;

use crate::common::config::{ConfigError, PayoutConfig};
use crate::gateway::{DaemonRpc, HttpDaemon, HttpWallet, RpcError, WalletRpc};
use crate::storage::{LedgerStore, SqliteLedger, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("RPC client error: {0}")]
    Rpc(#[from] RpcError),
}

#[derive(Clone)]
pub struct PayoutContext {
    pub config: Arc<PayoutConfig>,
    pub store: Arc<dyn LedgerStore>,
    pub wallet: Arc<dyn WalletRpc>,
    pub daemon: Arc<dyn DaemonRpc>,
}

impl PayoutContext {
    pub fn new(
        config: PayoutConfig,
        store: Arc<dyn LedgerStore>,
        wallet: Arc<dyn WalletRpc>,
        daemon: Arc<dyn DaemonRpc>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            wallet,
            daemon,
        }
    }

    /// Open the SQLite ledger and the HTTP gateways described by `config`
    pub fn connect(config: PayoutConfig) -> Result<Self, SetupError> {
        let store = SqliteLedger::new(&config.database.path)?;

        let (username, password) = config.wallet.credentials()?;
        let wallet = HttpWallet::new(&config.wallet.url(), username, password)?;
        let daemon = HttpDaemon::new(&config.daemon.url())?;

        Ok(Self::new(config, Arc::new(store), Arc::new(wallet), Arc::new(daemon)))
    }
}
