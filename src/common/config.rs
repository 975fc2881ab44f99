//! Payout Daemon Configuration
//!
//! Configuration is a JSON document (default `config.json`) loaded once at
//! startup and consumed as constants by every stage. A handful of values,
//! mostly secrets, can be overridden from the environment:
//!
//! - `PAYOUTD_DB_PATH` - SQLite ledger path
//! - `PAYOUTD_WALLET_RPC_USERNAME` - wallet RPC username
//! - `PAYOUTD_WALLET_RPC_PASSWORD` - wallet RPC password
//! - `PAYOUTD_LOG_LEVEL` - logging level (debug, info, warn, error)

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("fee split does not add up to 100 (got {0})")]
    FeeSplit(u32),
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayoutConfig {
    pub general: GeneralConfig,
    pub database: DatabaseConfig,
    pub daemon: DaemonConfig,
    pub wallet: WalletConfig,
    pub coin: CoinConfig,
    pub payments: PaymentsConfig,
    pub fee: FeeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Pid file used as the single-instance lock
    pub pidfile: String,
    /// Seconds between polling iterations
    pub interval: u64,
    /// Seconds to wait after a failed self test
    pub self_test_timeout: u64,
    /// Confirmations before a block or payment is final
    pub block_mature_depth: u64,
    /// Confirmations after which an unseen block reward is orphaned
    pub block_orphan_depth: u64,
    /// Extra heights below the maturity depth still treated as at risk
    #[serde(default = "default_at_risk_margin")]
    pub at_risk_margin: u64,
}

fn default_at_risk_margin() -> u64 {
    10
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            pidfile: "payoutd.pid".to_string(),
            interval: 60,
            self_test_timeout: 30,
            block_mature_depth: 60,
            block_orphan_depth: 10,
            at_risk_margin: default_at_risk_margin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite ledger file
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/payoutd.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub hostname: String,
    pub port: u16,
}

impl DaemonConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 18081,
        }
    }
}

/// Where the wallet RPC credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcAuthMethod {
    /// Username and password from this config (or env)
    #[default]
    Plain,
    /// First line of `rpc_auth_file`, formatted `username:password`
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub rpc_auth_method: RpcAuthMethod,
    #[serde(default)]
    pub rpc_auth_file: Option<String>,
    #[serde(default)]
    pub rpc_username: String,
    #[serde(default)]
    pub rpc_password: String,
}

impl WalletConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }

    /// Resolve the wallet RPC credentials
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        match self.rpc_auth_method {
            RpcAuthMethod::Plain => Ok((self.rpc_username.clone(), self.rpc_password.clone())),
            RpcAuthMethod::File => {
                let path = self.rpc_auth_file.as_deref().ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "wallet.rpc_auth_file".to_string(),
                        "required when rpc_auth_method is \"file\"".to_string(),
                    )
                })?;
                let contents = fs::read_to_string(path)
                    .map_err(|e| ConfigError::Read(path.to_string(), e.to_string()))?;
                let line = contents.lines().next().unwrap_or_default();
                let (username, password) = line.trim().split_once(':').ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "wallet.rpc_auth_file".to_string(),
                        "expected username:password".to_string(),
                    )
                })?;
                Ok((username.to_string(), password.to_string()))
            }
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 18082,
            rpc_auth_method: RpcAuthMethod::Plain,
            rpc_auth_file: None,
            rpc_username: String::new(),
            rpc_password: String::new(),
        }
    }
}

/// Network prefixes of the coin's three address kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AddressPrefixes {
    pub standard: u64,
    pub integrated: u64,
    pub subaddress: u64,
}

impl Default for AddressPrefixes {
    /// Monero mainnet
    fn default() -> Self {
        Self {
            standard: 18,
            integrated: 19,
            subaddress: 42,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoinConfig {
    pub address_prefixes: AddressPrefixes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Wallet transfer priority
    pub priority: u32,
    /// Maximum recipients in one transaction
    pub max_recipients: usize,
    /// Ring size passed to the wallet and used for fee estimation
    pub ring_size: u64,
    /// Tolerated shortfall of wallet balance against owed credits
    pub warning_threshold: u64,
    /// Safety multiplier applied to the estimated network fee
    pub fee_adjustment_factor: f64,
    /// Cap on a single recipient's amount in one payout
    pub max_payment_amount: u64,
    /// Pay out only when the wallet height is a multiple of this
    pub network_block_interval: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            priority: 1,
            max_recipients: 15,
            ring_size: 11,
            warning_threshold: 1_000_000_000,
            fee_adjustment_factor: 1.0,
            max_payment_amount: 100_000_000_000_000,
            network_block_interval: 10,
        }
    }
}

/// One recipient of the dev/operator fee split
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeeSplit {
    pub uid: i64,
    pub name: String,
    pub percent: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Pool fee percentage withheld from each block reward
    pub percent: f64,
    /// Dev/operator recipients of the remainder, percentages summing to 100
    pub split: Vec<FeeSplit>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            percent: 1.0,
            split: vec![FeeSplit {
                uid: 1,
                name: "operator".to_string(),
                percent: 100,
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl PayoutConfig {
    /// Load configuration from a JSON file, apply env overrides and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;

        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a JSON string (no env overrides, no validation)
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override selected values from environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("PAYOUTD_DB_PATH") {
            self.database.path = path;
        }
        if let Ok(username) = env::var("PAYOUTD_WALLET_RPC_USERNAME") {
            self.wallet.rpc_username = username;
        }
        if let Ok(password) = env::var("PAYOUTD_WALLET_RPC_PASSWORD") {
            self.wallet.rpc_password = password;
        }
        if let Ok(level) = env::var("PAYOUTD_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Reject configurations the payout stages cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let total_split: u32 = self.fee.split.iter().map(|s| s.percent).sum();
        if total_split != 100 {
            return Err(ConfigError::FeeSplit(total_split));
        }

        if !(0.0..=100.0).contains(&self.fee.percent) {
            return Err(ConfigError::InvalidValue(
                "fee.percent".to_string(),
                format!("{} is outside 0..=100", self.fee.percent),
            ));
        }

        if self.general.interval == 0 {
            return Err(ConfigError::InvalidValue(
                "general.interval".to_string(),
                "must be at least 1 second".to_string(),
            ));
        }

        if self.payments.max_recipients == 0 {
            return Err(ConfigError::InvalidValue(
                "payments.max_recipients".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        if self.payments.ring_size == 0 {
            return Err(ConfigError::InvalidValue(
                "payments.ring_size".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        if self.payments.network_block_interval == 0 {
            return Err(ConfigError::InvalidValue(
                "payments.network_block_interval".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let factor = self.payments.fee_adjustment_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "payments.fee_adjustment_factor".to_string(),
                format!("{} is not a positive number", factor),
            ));
        }

        Ok(())
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== payoutd Configuration ===");
        println!("Ledger: {}", self.database.path);
        println!("Daemon RPC: {}", self.daemon.url());
        println!("Wallet RPC: {}", self.wallet.url());
        println!("Poll Interval: {} seconds", self.general.interval);
        println!(
            "Maturity / Orphan Depth: {} / {}",
            self.general.block_mature_depth, self.general.block_orphan_depth
        );
        println!("Pool Fee: {}%", self.fee.percent);
        for split in &self.fee.split {
            println!("  Fee Split: {} (uid {}) {}%", split.name, split.uid, split.percent);
        }
        println!(
            "Payments: every {} blocks, max {} recipients, ring size {}",
            self.payments.network_block_interval,
            self.payments.max_recipients,
            self.payments.ring_size
        );
        println!("=============================");
    }
}
