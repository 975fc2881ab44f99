//! Shared Types Module
//!
//! Ledger records shared across the payout stages.

pub mod block;
pub mod credit;
pub mod payment;
pub mod units;
pub mod user;

// Re-exports for convenience
pub use block::{Block, BlockStatus};
pub use credit::{Credit, CreditStatus};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use units::{atomic_to_coin_string, atomic_to_display, ledger_time_now, ATOMIC_UNITS_PER_COIN};
pub use user::{Share, User, UserBalance};
