//! Payment Reconciler
//!
//! Follows PENDING payments on chain until they mature or disappear.
//!
//! Transactions are identified by the SHA-256 of their concatenated output
//! keys rather than by txid, which can change under malleability. Rows
//! left without a txid by a failed transfer are matched by amount against
//! transactions no other payment accounts for.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::common::error::{PayoutError, Result, ResultExt, Stage};
use crate::common::logging::log_reconcile_event;
use crate::context::PayoutContext;
use crate::fee::split_fee;
use crate::gateway::{Destination, TxBody};
use crate::types::{Payment, PaymentStatus};

#[derive(Debug, Error)]
pub enum KeyImageError {
    #[error("undecodable transaction body: {0}")]
    Body(String),

    #[error("output {0} has no key")]
    MissingKey(usize),

    #[error("output key is not hex: {0}")]
    Hex(String),
}

/// Malleability-stable identity of a decoded transaction body
pub fn key_image_hash(as_json: &str) -> std::result::Result<String, KeyImageError> {
    let body: TxBody = serde_json::from_str(as_json).map_err(|e| KeyImageError::Body(e.to_string()))?;

    let mut hasher = Sha256::new();
    for (i, out) in body.vout.iter().enumerate() {
        let key = out.target.output_key().ok_or(KeyImageError::MissingKey(i))?;
        let bytes = hex::decode(key).map_err(|e| KeyImageError::Hex(e.to_string()))?;
        hasher.update(bytes);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rows that learned their txhash this pass
    pub resolved: usize,
    /// Rows whose txid changed under malleability
    pub malleated: usize,
    pub matured: usize,
    pub orphaned: usize,
    /// Null-txid rows matched to a transaction
    pub backfilled: usize,
    /// Null-txid rows still unmatched
    pub unresolved: usize,
    pub rescanned: bool,
}

/// An outgoing transfer as the wallet reports it
struct Outgoing {
    destinations: Vec<Destination>,
    fee_per_user: u64,
}

/// A transaction as the daemon reports it
struct ChainTx {
    txid: String,
    block_height: u64,
}

pub struct PaymentReconciler {
    ctx: PayoutContext,
}

impl PaymentReconciler {
    pub fn new(ctx: PayoutContext) -> Self {
        Self { ctx }
    }

    /// Lowest height at which an outgoing transfer may still change
    pub fn at_risk_start(&self, wallet_height: u64, last_scan: u64) -> u64 {
        let general = &self.ctx.config.general;
        wallet_height
            .min(last_scan)
            .saturating_sub(general.block_mature_depth + general.at_risk_margin)
    }

    pub async fn unlock(&self, wallet_height: u64) -> Result<ReconcileReport> {
        let store = &self.ctx.store;
        let mature_depth = self.ctx.config.general.block_mature_depth;
        let mut report = ReconcileReport::default();

        let payments = store
            .pending_payments()
            .recoverable(Stage::PaymentReconciliation)?;
        if payments.is_empty() {
            return Ok(report);
        }

        let last_scan = store.scan_height().recoverable(Stage::PaymentReconciliation)?;
        let start = self.at_risk_start(wallet_height, last_scan);
        tracing::info!(
            target: "payoutd::reconcile",
            wallet_height,
            at_risk_start = start,
            pending = payments.len(),
            "reconciling payments"
        );

        let transfers = self
            .ctx
            .wallet
            .outgoing_transfers(start)
            .await
            .recoverable(Stage::PaymentReconciliation)?;

        // Transfers not yet accounted for by a payment row, in wallet order
        let mut unaccounted: Vec<(String, Outgoing)> = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            if unaccounted.iter().any(|(txid, _)| *txid == transfer.txid) {
                continue;
            }
            let fee_per_user = split_fee(transfer.fee, transfer.destinations.len());
            unaccounted.push((
                transfer.txid,
                Outgoing {
                    destinations: transfer.destinations,
                    fee_per_user,
                },
            ));
        }

        let txids: Vec<String> = unaccounted.iter().map(|(txid, _)| txid.clone()).collect();
        let transactions = self
            .ctx
            .daemon
            .transactions(&txids)
            .await
            .recoverable(Stage::PaymentReconciliation)?;

        let mut by_hash: HashMap<String, ChainTx> = HashMap::with_capacity(transactions.len());
        for tx in transactions {
            // An unreadable body must not get its payments orphaned
            let hash = key_image_hash(&tx.as_json).map_err(|e| {
                PayoutError::recoverable(
                    Stage::PaymentReconciliation,
                    format!("transaction {}: {}", tx.tx_hash, e),
                )
            })?;
            by_hash.insert(
                hash,
                ChainTx {
                    txid: tx.tx_hash,
                    block_height: tx.block_height,
                },
            );
        }

        let hash_of = |txid: &str| -> Option<String> {
            by_hash
                .iter()
                .find(|(_, tx)| tx.txid == txid)
                .map(|(hash, _)| hash.clone())
        };

        let mut needs_rescan = false;

        for payment in payments.iter().filter(|p| p.txid.is_some()) {
            let Some(txid) = payment.txid.as_deref() else {
                continue;
            };

            let txhash = match payment.txhash.clone() {
                Some(hash) => hash,
                None => match hash_of(txid) {
                    Some(hash) => {
                        self.update(payment, Some(txid), &hash, PaymentStatus::Pending)?;
                        report.resolved += 1;
                        hash
                    }
                    None => {
                        let err = PayoutError::skipped(
                            Stage::PaymentReconciliation,
                            format!("payment {}", payment.id),
                            format!("txid {} not known to the daemon yet", txid),
                        );
                        tracing::warn!(target: "payoutd::reconcile", error = %err, "payment deferred");
                        continue;
                    }
                },
            };

            match by_hash.get(&txhash) {
                Some(tx) => {
                    unaccounted.retain(|(id, _)| *id != tx.txid);

                    let mut current_txid = txid;
                    if tx.txid != txid {
                        tracing::warn!(
                            target: "payoutd::reconcile",
                            payment_id = payment.id,
                            old_txid = txid,
                            new_txid = %tx.txid,
                            "transaction malleability detected"
                        );
                        self.update(payment, Some(&tx.txid), &txhash, PaymentStatus::Pending)?;
                        report.malleated += 1;
                        current_txid = tx.txid.as_str();
                    }

                    if tx.block_height != 0 && wallet_height > tx.block_height + mature_depth {
                        self.update(payment, Some(current_txid), &txhash, PaymentStatus::Matured)?;
                        report.matured += 1;
                    }
                }
                None => {
                    tracing::warn!(
                        target: "payoutd::reconcile",
                        payment_id = payment.id,
                        txid,
                        txhash = %txhash,
                        "transaction no longer visible, orphaning payment"
                    );
                    self.update(payment, Some(txid), &txhash, PaymentStatus::Orphaned)?;
                    report.orphaned += 1;
                    needs_rescan = true;
                }
            }
        }

        for payment in payments.iter().filter(|p| p.txid.is_none()) {
            if self.backfill(payment, &unaccounted, &hash_of)? {
                report.backfilled += 1;
            } else {
                report.unresolved += 1;
            }
        }

        if needs_rescan {
            tracing::info!(target: "payoutd::reconcile", "rescanning wallet");
            match self.ctx.wallet.rescan().await {
                Ok(()) => {
                    tracing::info!(target: "payoutd::reconcile", "rescan complete");
                    report.rescanned = true;
                }
                Err(e) => {
                    tracing::error!(target: "payoutd::reconcile", error = %e, "rescan failed");
                }
            }
        }

        Ok(report)
    }

    /// Match a null-txid payment by amount; first matching transfer wins
    fn backfill(
        &self,
        payment: &Payment,
        unaccounted: &[(String, Outgoing)],
        hash_of: &impl Fn(&str) -> Option<String>,
    ) -> Result<bool> {
        tracing::info!(
            target: "payoutd::reconcile",
            payment_id = payment.id,
            amount = payment.amount_paid,
            "payment has no txid, matching by amount"
        );

        let found = unaccounted.iter().find(|(_, out)| {
            out.destinations
                .iter()
                .any(|d| d.amount == payment.amount_paid)
        });

        let Some((txid, outgoing)) = found else {
            tracing::error!(
                target: "payoutd::reconcile",
                payment_id = payment.id,
                "no transfer matches null-txid payment, it may have failed completely"
            );
            return Ok(false);
        };

        let Some(txhash) = hash_of(txid) else {
            tracing::warn!(
                target: "payoutd::reconcile",
                payment_id = payment.id,
                txid = %txid,
                "matched transfer not known to the daemon yet"
            );
            return Ok(false);
        };

        self.ctx
            .store
            .backfill_payment(payment.id, txid, &txhash, outgoing.fee_per_user)
            .recoverable(Stage::PaymentReconciliation)?;
        log_reconcile_event(
            "payment_backfilled",
            payment.id,
            Some(txid),
            Some(&txhash),
            &PaymentStatus::Pending.to_string(),
        );

        Ok(true)
    }

    fn update(&self, payment: &Payment, txid: Option<&str>, txhash: &str, status: PaymentStatus) -> Result<()> {
        self.ctx
            .store
            .update_payment(payment.id, txid, Some(txhash), status)
            .recoverable(Stage::PaymentReconciliation)?;
        log_reconcile_event("payment_updated", payment.id, txid, Some(txhash), &status.to_string());
        Ok(())
    }
}
