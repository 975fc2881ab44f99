//! Accounting check
//!
//! Compares what the wallet holds with what the ledger says is owed. The
//! batcher logs it before every payout and refuses to pay when the wallet
//! is short by more than the configured warning threshold.

use crate::common::error::{Result, ResultExt, Stage};
use crate::context::PayoutContext;
use crate::gateway::WalletBalance;
use crate::types::UserBalance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountingReport {
    pub balance: u64,
    pub unlocked: u64,
    /// Matured credits minus debits, summed over every user
    pub owed_confirmed: i128,
    /// Credits of blocks that have not matured yet
    pub owed_pending: u128,
}

impl AccountingReport {
    pub fn new(wallet: WalletBalance, balances: &[UserBalance]) -> Self {
        let owed_confirmed = balances
            .iter()
            .map(|b| b.credits_matured as i128 - b.debits as i128)
            .sum();
        let owed_pending = balances.iter().map(|b| b.credits_pending as u128).sum();

        Self {
            balance: wallet.balance,
            unlocked: wallet.unlocked_balance,
            owed_confirmed,
            owed_pending,
        }
    }

    pub fn locked(&self) -> u64 {
        self.balance.saturating_sub(self.unlocked)
    }

    pub fn owed_total(&self) -> i128 {
        self.owed_confirmed + self.owed_pending as i128
    }

    /// Wallet balance minus everything owed
    pub fn net(&self) -> i128 {
        self.balance as i128 - self.owed_total()
    }

    /// Whether the shortfall, if any, stays within `warning_threshold`
    pub fn is_solvent(&self, warning_threshold: u64) -> bool {
        self.net() >= -(warning_threshold as i128)
    }

    /// Wallet and owed tables as printed by the `accounting` command
    pub fn render(&self) -> String {
        let rule = "=".repeat(58);
        let mut lines = Vec::new();

        lines.push("Wallet:".to_string());
        lines.push(rule.clone());
        lines.push("|     balance      |     unlocked     |      locked      |".to_string());
        lines.push(rule.clone());
        lines.push(format!(
            "|{:>18}|{:>18}|{:>18}|",
            self.balance,
            self.unlocked,
            self.locked()
        ));
        lines.push(rule.clone());
        lines.push(String::new());
        lines.push("Owed to users:".to_string());
        lines.push(rule.clone());
        lines.push("|      total       |    confirmed     |   unconfirmed    |".to_string());
        lines.push(rule.clone());
        lines.push(format!(
            "|{:>18}|{:>18}|{:>18}|",
            self.owed_total(),
            self.owed_confirmed,
            self.owed_pending
        ));
        lines.push(rule);
        lines.push(String::new());
        lines.push(format!("Net (balance - owed): {}", self.net()));

        lines.join("\n")
    }

    pub fn log(&self) {
        tracing::info!(
            target: "payoutd::payment",
            balance = self.balance,
            unlocked = self.unlocked,
            locked = self.locked(),
            owed_total = %self.owed_total(),
            owed_confirmed = %self.owed_confirmed,
            owed_pending = %self.owed_pending,
            net = %self.net(),
            "accounting check"
        );
        for line in self.render().lines() {
            tracing::debug!(target: "payoutd::payment", "{}", line);
        }
    }
}

/// Current accounting position from the ledger and the wallet
pub async fn accounting_report(ctx: &PayoutContext) -> Result<AccountingReport> {
    let balances = ctx
        .store
        .user_balances()
        .recoverable(Stage::PaymentBatching)?;
    let wallet = ctx.wallet.balance().await.recoverable(Stage::PaymentBatching)?;

    Ok(AccountingReport::new(wallet, &balances))
}
