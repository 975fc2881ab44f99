//! Credit maturity
//!
//! Credits follow their block: MATURED blocks release their credits and
//! close, ORPHANED blocks void theirs.

use super::CreditEngine;
use crate::common::error::{Result, ResultExt, Stage};
use crate::common::logging::{log_block_event, log_credit_event};
use crate::types::{BlockStatus, CreditStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaturityReport {
    pub closed: usize,
    pub orphaned: usize,
}

impl CreditEngine {
    pub fn unlock(&self) -> Result<MaturityReport> {
        let store = &self.ctx.store;
        let mut report = MaturityReport::default();

        let matured = store
            .blocks_by_status(BlockStatus::Matured)
            .recoverable(Stage::CreditMaturity)?;

        for block in matured {
            let changed = store
                .set_credit_status(block.id, CreditStatus::Matured)
                .recoverable(Stage::CreditMaturity)?;
            log_credit_event("credits_matured", block.id, None, None, None, true, None);

            store
                .set_block_status(block.id, BlockStatus::Closed)
                .recoverable(Stage::CreditMaturity)?;
            log_block_event("block_status_changed", block.id, block.height, &BlockStatus::Closed.to_string());

            tracing::info!(
                target: "payoutd::credit",
                block_id = block.id,
                height = block.height,
                credits = changed,
                "block closed"
            );
            report.closed += 1;
        }

        let orphaned = store
            .orphaned_blocks_with_live_credits()
            .recoverable(Stage::CreditMaturity)?;

        for block in orphaned {
            let changed = store
                .set_credit_status(block.id, CreditStatus::Orphaned)
                .recoverable(Stage::CreditMaturity)?;
            if changed > 0 {
                log_credit_event("credits_orphaned", block.id, None, None, None, true, None);
                report.orphaned += 1;
            }
        }

        Ok(report)
    }
}
