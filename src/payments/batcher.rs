//! Payment Batcher
//!
//! Pays every user whose confirmed balance crossed their threshold. Users
//! are paid smallest amount first, grouped into transactions bounded by the
//! wallet's unlocked balance and the recipient limit. Integrated addresses
//! always get a transaction of their own. A recipient whose amount does not
//! exceed its share of the estimated fee waits for a later pass.
//!
//! A debit row is written for every recipient of every transfer attempt,
//! including failed ones: a failed RPC does not prove the transfer did not
//! happen, and a missing debit would pay the user twice.

use super::accounting::AccountingReport;
use crate::address::{self, AddressKind};
use crate::common::error::{PayoutError, Result, ResultExt, Stage};
use crate::common::logging::log_payment_event;
use crate::context::PayoutContext;
use crate::fee::{estimate_fee, split_fee};
use crate::gateway::Destination;
use crate::types::{atomic_to_display, ledger_time_now, NewPayment, UserBalance};

/// A user eligible for payment in this pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCandidate {
    pub uid: i64,
    pub address: String,
    pub kind: AddressKind,
    /// Amount owed, before the network fee share is taken off
    pub amount: u64,
}

/// Recipients chosen for one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Positions in the candidate slice, ascending
    pub indices: Vec<usize>,
    pub total: u64,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Transfers the wallet accepted
    pub transactions: usize,
    /// Transfers that failed with an unknown outcome
    pub failed_transfers: usize,
    /// Payment rows written
    pub recipients: usize,
    pub amount_paid: u64,
    /// Eligible users left for a later pass
    pub deferred: usize,
}

/// Pick the next transaction's recipients from `candidates` (sorted by
/// ascending amount)
///
/// An integrated address at the head of the list is paid alone. Otherwise
/// integrated addresses are passed over and recipients are added until the
/// recipient limit is reached or the next amount would exceed `unlocked`.
pub fn select_batch(candidates: &[PaymentCandidate], unlocked: u64, max_recipients: usize) -> Selection {
    let mut selection = Selection::default();

    let Some(first) = candidates.first() else {
        return selection;
    };

    if first.kind == AddressKind::Integrated {
        if first.amount <= unlocked {
            selection.indices.push(0);
            selection.total = first.amount;
        }
        return selection;
    }

    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.kind == AddressKind::Integrated {
            continue;
        }
        let total = match selection.total.checked_add(candidate.amount) {
            Some(total) if total <= unlocked => total,
            _ => break,
        };
        selection.indices.push(i);
        selection.total = total;
        if selection.indices.len() >= max_recipients {
            break;
        }
    }

    selection
}

/// Split `candidates` into the selected recipients and the rest
fn take_selection(candidates: Vec<PaymentCandidate>, selection: &Selection) -> (Vec<PaymentCandidate>, Vec<PaymentCandidate>) {
    let mut batch = Vec::with_capacity(selection.indices.len());
    let mut rest = Vec::with_capacity(candidates.len() - selection.indices.len());

    for (i, candidate) in candidates.into_iter().enumerate() {
        if selection.indices.binary_search(&i).is_ok() {
            batch.push(candidate);
        } else {
            rest.push(candidate);
        }
    }

    (batch, rest)
}

pub struct PaymentBatcher {
    ctx: PayoutContext,
}

impl PaymentBatcher {
    pub fn new(ctx: PayoutContext) -> Self {
        Self { ctx }
    }

    /// Users owed at least their threshold, with a valid address
    pub fn candidates(&self, balances: &[UserBalance]) -> Vec<PaymentCandidate> {
        let config = &self.ctx.config;
        let mut candidates = Vec::new();

        for user in balances {
            let confirmed = user.confirmed_balance();
            if confirmed <= 0 || (confirmed as u64) < user.payment_threshold {
                continue;
            }

            let info = match address::validate(&user.wallet_address, &config.coin.address_prefixes) {
                Ok(info) => info,
                Err(e) => {
                    let err = PayoutError::skipped(
                        Stage::PaymentBatching,
                        format!("uid {}", user.uid),
                        format!("invalid address {}: {}", user.wallet_address, e),
                    );
                    tracing::error!(target: "payoutd::payment", uid = user.uid, error = %err, "payment skipped");
                    continue;
                }
            };

            let amount = (confirmed as u64).min(config.payments.max_payment_amount);
            tracing::debug!(
                target: "payoutd::payment",
                uid = user.uid,
                confirmed,
                amount,
                kind = %info.kind,
                "payment candidate"
            );

            candidates.push(PaymentCandidate {
                uid: user.uid,
                address: user.wallet_address.clone(),
                kind: info.kind,
                amount,
            });
        }

        candidates
    }

    /// Pay every eligible user the unlocked balance allows
    ///
    /// Fails critically when the wallet cannot cover what is owed, or when
    /// a debit could not be recorded after a transfer attempt.
    pub async fn make_payments(&self) -> Result<BatchReport> {
        let payments = &self.ctx.config.payments;
        let now = ledger_time_now();
        let mut report = BatchReport::default();

        let balances = self
            .ctx
            .store
            .user_balances()
            .recoverable(Stage::PaymentBatching)?;
        let mut remaining = self.candidates(&balances);

        let wallet_balance = self
            .ctx
            .wallet
            .balance()
            .await
            .recoverable(Stage::PaymentBatching)?;
        let accounting = AccountingReport::new(wallet_balance, &balances);
        accounting.log();

        if !accounting.is_solvent(payments.warning_threshold) {
            tracing::error!(
                target: "payoutd::payment",
                balance = accounting.balance,
                owed = %accounting.owed_total(),
                warning_threshold = payments.warning_threshold,
                "wallet balance is short of what is owed"
            );
            return Err(PayoutError::critical(
                Stage::PaymentBatching,
                format!(
                    "owed {} exceeds wallet balance {} by more than {}",
                    accounting.owed_total(),
                    accounting.balance,
                    payments.warning_threshold
                ),
            ));
        }

        if remaining.is_empty() {
            tracing::info!(target: "payoutd::payment", "no payments need to be made now");
            return Ok(report);
        }

        remaining.sort_by_key(|c| c.amount);
        let mut unlocked = wallet_balance.unlocked_balance;

        loop {
            let selection = select_batch(&remaining, unlocked, payments.max_recipients);
            if selection.is_empty() {
                tracing::info!(
                    target: "payoutd::payment",
                    unlocked,
                    waiting = remaining.len(),
                    "not enough unlocked funds for the next payment"
                );
                report.deferred += remaining.len();
                break;
            }

            let (batch, rest) = take_selection(remaining, &selection);
            let fee_estimate = self.fee_estimate(batch.len()).await;
            let fee_share = split_fee(fee_estimate, batch.len());

            let (batch, uncovered): (Vec<_>, Vec<_>) = batch.into_iter().partition(|c| c.amount > fee_share);
            if !uncovered.is_empty() {
                for candidate in &uncovered {
                    tracing::warn!(
                        target: "payoutd::payment",
                        uid = candidate.uid,
                        amount = candidate.amount,
                        fee_share,
                        "amount does not cover its fee share, payment deferred"
                    );
                }
                report.deferred += uncovered.len();

                remaining = rest;
                remaining.extend(batch);
                remaining.sort_by_key(|c| c.amount);
                if remaining.is_empty() {
                    break;
                }
                continue;
            }

            self.pay_batch(&batch, fee_estimate, fee_share, now, &mut report).await?;
            remaining = rest;

            if remaining.is_empty() {
                break;
            }

            unlocked = self
                .ctx
                .wallet
                .balance()
                .await
                .recoverable(Stage::PaymentBatching)?
                .unlocked_balance;
        }

        tracing::info!(
            target: "payoutd::payment",
            transactions = report.transactions,
            failed = report.failed_transfers,
            recipients = report.recipients,
            amount_paid = report.amount_paid,
            deferred = report.deferred,
            "payment pass finished"
        );

        Ok(report)
    }

    /// Adjusted network fee estimate for a transaction paying `recipients`
    async fn fee_estimate(&self, recipients: usize) -> u64 {
        let payments = &self.ctx.config.payments;
        let estimate = estimate_fee(self.ctx.daemon.as_ref(), recipients, payments.ring_size).await;
        (estimate as f64 * payments.fee_adjustment_factor) as u64
    }

    /// Send one transfer; every amount in `batch` must exceed `fee_share`
    async fn pay_batch(
        &self,
        batch: &[PaymentCandidate],
        fee_estimate: u64,
        fee_share: u64,
        now: i64,
        report: &mut BatchReport,
    ) -> Result<()> {
        let payments = &self.ctx.config.payments;

        let destinations: Vec<Destination> = batch
            .iter()
            .map(|c| Destination {
                address: c.address.clone(),
                amount: c.amount - fee_share,
            })
            .collect();

        tracing::info!(
            target: "payoutd::payment",
            recipients = batch.len(),
            amount = %atomic_to_display(destinations.iter().map(|d| d.amount).sum()),
            fee_estimate,
            fee_share,
            "sending transfer"
        );

        let (txid, fee_each) = match self
            .ctx
            .wallet
            .transfer(&destinations, payments.priority, payments.ring_size)
            .await
        {
            Ok(result) => {
                report.transactions += 1;
                (Some(result.tx_hash), split_fee(result.fee, batch.len()))
            }
            Err(e) => {
                tracing::error!(
                    target: "payoutd::payment",
                    error = %e,
                    recipients = batch.len(),
                    "transfer failed, recording debits without txid"
                );
                report.failed_transfers += 1;
                (None, fee_share)
            }
        };

        for (candidate, destination) in batch.iter().zip(&destinations) {
            let payment = NewPayment {
                miner_uid: candidate.uid,
                txid: txid.clone(),
                time: now,
                amount_paid: destination.amount,
                amount_fee: fee_each,
            };

            if let Err(e) = self.ctx.store.insert_payment(&payment) {
                log_payment_event(
                    "payment_record_failed",
                    candidate.uid,
                    destination.amount,
                    fee_each,
                    txid.as_deref(),
                    false,
                    Some(&e.to_string()),
                );
                return Err(PayoutError::critical(
                    Stage::PaymentBatching,
                    format!("could not record payment for uid {}: {}", candidate.uid, e),
                ));
            }

            log_payment_event(
                "payment_recorded",
                candidate.uid,
                destination.amount,
                fee_each,
                txid.as_deref(),
                txid.is_some(),
                txid.is_none().then_some("transfer outcome unknown"),
            );
            report.recipients += 1;
            report.amount_paid += destination.amount;
        }

        Ok(())
    }
}
