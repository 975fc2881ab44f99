//! Credit Engine
//!
//! Turns TX_SEEN blocks into per-miner credits (`calculate`) and lets the
//! credits follow their block once it matures or is orphaned (`unlock`).
//! Both passes only touch the ledger.

mod calculate;
mod maturity;

pub use calculate::{discount, split_dev_fee, split_reward, CalculationReport};
pub use maturity::MaturityReport;

use crate::context::PayoutContext;

pub struct CreditEngine {
    ctx: PayoutContext,
}

impl CreditEngine {
    pub fn new(ctx: PayoutContext) -> Self {
        Self { ctx }
    }
}
