//! Block Lifecycle Tracker
//!
//! Advances mined blocks using what the wallet and the daemon report:
//!
//! - reward transfer seen in the wallet, block not yet TX_SEEN: record the
//!   observed and the header reward, move to TX_SEEN
//! - reward transfer seen, block CREDITED and buried deeper than the
//!   maturity depth: move to MATURED
//! - reward transfer not seen past the orphan depth: move to ORPHANED
//!
//! A failed lookup skips that block until the next cycle.

use crate::common::error::{PayoutError, Result, ResultExt, Stage};
use crate::common::logging::log_block_event;
use crate::context::PayoutContext;
use crate::types::{Block, BlockStatus};

/// Counts of what one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerReport {
    pub tx_seen: usize,
    pub matured: usize,
    pub orphaned: usize,
    pub skipped: usize,
}

pub struct BlockTracker {
    ctx: PayoutContext,
}

impl BlockTracker {
    pub fn new(ctx: PayoutContext) -> Self {
        Self { ctx }
    }

    /// Advance every unfinalized block against the given wallet height
    pub async fn advance(&self, wallet_height: u64) -> Result<TrackerReport> {
        let blocks = self
            .ctx
            .store
            .unfinalized_blocks()
            .recoverable(Stage::BlockTracker)?;

        let mut report = TrackerReport::default();

        for block in blocks {
            match self.advance_block(&block, wallet_height).await {
                Ok(Some(BlockStatus::TxSeen)) => report.tx_seen += 1,
                Ok(Some(BlockStatus::Matured)) => report.matured += 1,
                Ok(Some(BlockStatus::Orphaned)) => report.orphaned += 1,
                Ok(_) => {}
                Err(e @ PayoutError::Skipped { .. }) => {
                    tracing::warn!(
                        target: "payoutd::block",
                        block_id = block.id,
                        height = block.height,
                        error = %e,
                        "skipping block this cycle"
                    );
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn advance_block(&self, block: &Block, wallet_height: u64) -> Result<Option<BlockStatus>> {
        let general = &self.ctx.config.general;
        let entity = format!("block {} at height {}", block.id, block.height);

        let transfers = self
            .ctx
            .wallet
            .incoming_transfers(block.height.saturating_sub(1), block.height)
            .await
            .map_err(|e| PayoutError::skipped(Stage::BlockTracker, &entity, format!("get_transfers: {}", e)))?;

        let header = self
            .ctx
            .daemon
            .block_header(block.height)
            .await
            .map_err(|e| PayoutError::skipped(Stage::BlockTracker, &entity, format!("get_block: {}", e)))?;

        let reward_transfer = transfers
            .iter()
            .find(|t| t.height == block.height && t.kind == "block" && t.txid == block.txid);

        match reward_transfer {
            Some(transfer) => {
                if block.status == BlockStatus::Credited
                    && wallet_height > block.height + general.block_mature_depth
                {
                    self.transition(block, BlockStatus::Matured)?;
                    return Ok(Some(BlockStatus::Matured));
                }

                if block.status < BlockStatus::TxSeen {
                    self.ctx
                        .store
                        .set_block_reward(block.id, transfer.amount, header.reward)
                        .recoverable(Stage::BlockTracker)?;
                    tracing::info!(
                        target: "payoutd::block",
                        block_id = block.id,
                        height = block.height,
                        reward = transfer.amount,
                        reward_total = header.reward,
                        "block reward observed"
                    );
                    self.transition(block, BlockStatus::TxSeen)?;
                    return Ok(Some(BlockStatus::TxSeen));
                }

                Ok(None)
            }
            None if wallet_height > block.height + general.block_orphan_depth => {
                if !block.status.can_advance_to(BlockStatus::Orphaned) {
                    // Credits already exist; the reward must not vanish silently
                    tracing::error!(
                        target: "payoutd::block",
                        block_id = block.id,
                        height = block.height,
                        status = %block.status,
                        "reward transfer of a credited block is no longer visible"
                    );
                    return Ok(None);
                }
                self.transition(block, BlockStatus::Orphaned)?;
                Ok(Some(BlockStatus::Orphaned))
            }
            None => Ok(None),
        }
    }

    fn transition(&self, block: &Block, next: BlockStatus) -> Result<()> {
        if !block.status.can_advance_to(next) {
            return Err(PayoutError::skipped(
                Stage::BlockTracker,
                format!("block {}", block.id),
                format!("illegal transition {} -> {}", block.status, next),
            ));
        }

        self.ctx
            .store
            .set_block_status(block.id, next)
            .recoverable(Stage::BlockTracker)?;

        log_block_event("block_status_changed", block.id, block.height, &next.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LedgerStore;
    use crate::testutil::{harness, test_config, Harness};

    const REWARD_TX: &str = "reward-tx";

    fn setup_block(h: &Harness, height: u64, status: BlockStatus) -> i64 {
        let mut block = Block::new(height, REWARD_TX, 100, 1000, 7);
        block.status = status;
        h.daemon.set_reward(height, 1_000_000);
        h.store.insert_block(&block).unwrap()
    }

    fn status(h: &Harness, id: i64) -> BlockStatus {
        h.store.get_block(id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_seen_block_records_reward() {
        let h = harness(test_config());
        let id = setup_block(&h, 100, BlockStatus::Ok);
        h.wallet.add_block_reward(100, REWARD_TX, 990_000);

        let report = BlockTracker::new(h.ctx.clone()).advance(101).await.unwrap();
        assert_eq!(report.tx_seen, 1);

        let block = h.store.get_block(id).unwrap().unwrap();
        assert_eq!(block.status, BlockStatus::TxSeen);
        assert_eq!(block.reward, Some(990_000));
        assert_eq!(block.reward_total, Some(1_000_000));
    }

    #[tokio::test]
    async fn test_transfer_must_match_txid_and_kind() {
        let h = harness(test_config());
        let id = setup_block(&h, 100, BlockStatus::Ok);
        h.wallet.add_block_reward(100, "someone-else", 990_000);
        {
            let mut state = h.wallet.state.lock().unwrap();
            state.incoming.push(crate::gateway::Transfer {
                txid: REWARD_TX.to_string(),
                height: 100,
                kind: "in".to_string(),
                amount: 5,
                fee: 0,
                destinations: Vec::new(),
            });
        }

        BlockTracker::new(h.ctx.clone()).advance(101).await.unwrap();
        assert_eq!(status(&h, id), BlockStatus::Ok);
    }

    #[tokio::test]
    async fn test_credited_block_matures_past_depth() {
        let h = harness(test_config());
        let id = setup_block(&h, 100, BlockStatus::Credited);
        h.wallet.add_block_reward(100, REWARD_TX, 990_000);
        let tracker = BlockTracker::new(h.ctx.clone());

        // mature depth is 10: height 110 is not yet past it
        tracker.advance(110).await.unwrap();
        assert_eq!(status(&h, id), BlockStatus::Credited);

        let report = tracker.advance(111).await.unwrap();
        assert_eq!(report.matured, 1);
        assert_eq!(status(&h, id), BlockStatus::Matured);
    }

    #[tokio::test]
    async fn test_unseen_block_orphaned_past_depth() {
        let h = harness(test_config());
        let ok = setup_block(&h, 100, BlockStatus::Ok);
        let seen = setup_block(&h, 101, BlockStatus::TxSeen);
        let tracker = BlockTracker::new(h.ctx.clone());

        // orphan depth is 5
        tracker.advance(105).await.unwrap();
        assert_eq!(status(&h, ok), BlockStatus::Ok);

        let report = tracker.advance(107).await.unwrap();
        assert_eq!(report.orphaned, 2);
        assert_eq!(status(&h, ok), BlockStatus::Orphaned);
        assert_eq!(status(&h, seen), BlockStatus::Orphaned);
    }

    #[tokio::test]
    async fn test_credited_block_never_orphaned() {
        let h = harness(test_config());
        let id = setup_block(&h, 100, BlockStatus::Credited);

        let report = BlockTracker::new(h.ctx.clone()).advance(500).await.unwrap();
        assert_eq!(report.orphaned, 0);
        assert_eq!(status(&h, id), BlockStatus::Credited);
    }

    #[tokio::test]
    async fn test_rpc_failure_skips_block() {
        let h = harness(test_config());
        let id = setup_block(&h, 100, BlockStatus::Ok);
        // daemon has no header for this one
        let mut other = Block::new(200, REWARD_TX, 100, 1000, 7);
        other.status = BlockStatus::Ok;
        let other_id = h.store.insert_block(&other).unwrap();
        h.wallet.add_block_reward(100, REWARD_TX, 990_000);
        h.wallet.add_block_reward(200, REWARD_TX, 990_000);

        let report = BlockTracker::new(h.ctx.clone()).advance(201).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.tx_seen, 1);
        assert_eq!(status(&h, id), BlockStatus::TxSeen);
        assert_eq!(status(&h, other_id), BlockStatus::Ok);
    }

    #[tokio::test]
    async fn test_wallet_failure_skips_every_block() {
        let h = harness(test_config());
        let id = setup_block(&h, 100, BlockStatus::Ok);
        h.wallet.state.lock().unwrap().fail_incoming = true;

        let report = BlockTracker::new(h.ctx.clone()).advance(500).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(status(&h, id), BlockStatus::Ok);
    }

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let h = harness(test_config());
        let seen = setup_block(&h, 100, BlockStatus::Ok);
        let orphan = setup_block(&h, 90, BlockStatus::Ok);
        h.wallet.add_block_reward(100, REWARD_TX, 990_000);
        let tracker = BlockTracker::new(h.ctx.clone());

        let first = tracker.advance(102).await.unwrap();
        assert_eq!(first.tx_seen, 1);
        assert_eq!(first.orphaned, 1);

        let second = tracker.advance(102).await.unwrap();
        assert_eq!(second, TrackerReport::default());
        assert_eq!(status(&h, seen), BlockStatus::TxSeen);
        assert_eq!(status(&h, orphan), BlockStatus::Orphaned);
    }
}
