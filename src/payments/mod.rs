//! Payments
//!
//! - `batcher`: turns confirmed balances into wallet transfers and debits
//! - `reconciler`: follows pending debits until they mature or are orphaned
//! - `accounting`: wallet balance against what the ledger owes

mod accounting;
mod batcher;
mod reconciler;

pub use accounting::{accounting_report, AccountingReport};
pub use batcher::{select_batch, BatchReport, PaymentBatcher, PaymentCandidate, Selection};
pub use reconciler::{key_image_hash, KeyImageError, PaymentReconciler, ReconcileReport};
