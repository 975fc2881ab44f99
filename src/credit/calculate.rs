//! PPLNS credit calculation
//!
//! For each TX_SEEN block with a known reward:
//!
//! 1. `payable` is the observed reward less the pool fee
//! 2. the window starts at the newest share time at which the running
//!    share count (newest first, from the block time back) reaches twice
//!    the block difficulty
//! 3. every miner with shares in the window gets `payable * shares / total`
//! 4. whatever the miners did not get out of the observed reward goes to
//!    the dev/operator fee split
//!
//! Credits are written first and the block is marked CREDITED last, so an
//! interrupted pass is simply repeated; credits already written are kept.

use std::collections::BTreeMap;

use super::CreditEngine;
use crate::common::config::FeeSplit;
use crate::common::error::{PayoutError, Result, ResultExt, Stage};
use crate::common::logging::{log_block_event, log_credit_event};
use crate::storage::StorageError;
use crate::types::{ledger_time_now, Block, BlockStatus, Credit, CreditStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationReport {
    pub credited: usize,
    pub skipped: usize,
}

/// Reward left after withholding `fee_percent`, rounded down
pub fn discount(reward: u64, fee_percent: f64) -> u64 {
    // parts per million kept, so fractional percentages stay exact
    let kept_ppm = ((100.0 - fee_percent) * 10_000.0).round().clamp(0.0, 1_000_000.0) as u128;
    (reward as u128 * kept_ppm / 1_000_000) as u64
}

/// Proportional split of `payable` over `(uid, shares)`, each rounded down
pub fn split_reward(payable: u64, shares: &[(i64, u64)]) -> Vec<(i64, u64)> {
    let total: u128 = shares.iter().map(|(_, count)| *count as u128).sum();
    if total == 0 {
        return Vec::new();
    }

    shares
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(uid, count)| {
            let amount = (payable as u128 * *count as u128 / total).min(payable as u128);
            (*uid, amount as u64)
        })
        .collect()
}

/// Split of the dev remainder, each recipient rounded down
pub fn split_dev_fee(remainder: u64, split: &[FeeSplit]) -> Vec<(i64, u64)> {
    split
        .iter()
        .map(|dev| (dev.uid, (remainder as u128 * dev.percent as u128 / 100) as u64))
        .collect()
}

impl CreditEngine {
    /// Credit every TX_SEEN block whose reward and PPLNS window are known
    pub fn calculate(&self) -> Result<CalculationReport> {
        let blocks = self
            .ctx
            .store
            .blocks_by_status(BlockStatus::TxSeen)
            .recoverable(Stage::CreditCalculation)?;

        let now = ledger_time_now();
        let mut report = CalculationReport::default();

        for block in blocks {
            if self.credit_block(&block, now)? {
                report.credited += 1;
            } else {
                report.skipped += 1;
            }
        }

        Ok(report)
    }

    fn credit_block(&self, block: &Block, now: i64) -> Result<bool> {
        let store = &self.ctx.store;
        let fee = &self.ctx.config.fee;

        let Some(reward) = block.reward else {
            tracing::info!(
                target: "payoutd::credit",
                block_id = block.id,
                height = block.height,
                "block has no reward set, skipping"
            );
            return Ok(false);
        };

        let payable = discount(reward, fee.percent);

        let window_start = store
            .pplns_window_start(block.time, block.difficulty.saturating_mul(2))
            .recoverable(Stage::CreditCalculation)?;
        let Some(start_time) = window_start else {
            tracing::error!(
                target: "payoutd::credit",
                block_id = block.id,
                height = block.height,
                difficulty = block.difficulty,
                "not enough shares for a PPLNS window, skipping"
            );
            return Ok(false);
        };

        let shares = store
            .share_totals(start_time, block.time)
            .recoverable(Stage::CreditCalculation)?;
        let total_shares: u64 = shares.iter().map(|(_, count)| count).sum();

        tracing::info!(
            target: "payoutd::credit",
            block_id = block.id,
            height = block.height,
            window_seconds = block.time - start_time,
            miners = shares.len(),
            total_shares,
            payable,
            "calculating credits"
        );

        let miner_credits = split_reward(payable, &shares);
        if miner_credits.is_empty() {
            tracing::error!(target: "payoutd::credit", block_id = block.id, "PPLNS window holds no shares, skipping");
            return Ok(false);
        }

        let total_credited: u64 = miner_credits.iter().map(|(_, amount)| amount).sum();
        let dev_remainder = reward.saturating_sub(total_credited);

        tracing::info!(
            target: "payoutd::credit",
            block_id = block.id,
            total_credited,
            dev_remainder,
            "miner credits computed"
        );

        // one row per uid: (reward, dev)
        let mut rows: BTreeMap<i64, (Option<u64>, Option<u64>)> = BTreeMap::new();
        for (uid, amount) in miner_credits {
            rows.entry(uid).or_default().0 = Some(amount);
        }
        for (uid, amount) in split_dev_fee(dev_remainder, &fee.split) {
            let dev = &mut rows.entry(uid).or_default().1;
            *dev = Some(dev.unwrap_or(0) + amount);
        }

        for (uid, (amount_reward, amount_dev)) in rows {
            let credit = Credit {
                block_id: block.id,
                miner_uid: uid,
                time: now,
                amount_reward,
                amount_bonus: None,
                amount_dev,
                status: CreditStatus::Pending,
            };

            match store.insert_credit(&credit) {
                Ok(()) => log_credit_event(
                    "credit_recorded",
                    block.id,
                    Some(uid),
                    amount_reward,
                    amount_dev,
                    true,
                    None,
                ),
                Err(StorageError::Duplicate(_)) => {
                    tracing::warn!(
                        target: "payoutd::credit",
                        block_id = block.id,
                        miner_uid = uid,
                        "credit already recorded by an interrupted pass"
                    );
                }
                Err(e) => {
                    log_credit_event(
                        "credit_failed",
                        block.id,
                        Some(uid),
                        amount_reward,
                        amount_dev,
                        false,
                        Some(&e.to_string()),
                    );
                    return Err(PayoutError::recoverable(Stage::CreditCalculation, e.to_string()));
                }
            }
        }

        store
            .set_block_status(block.id, BlockStatus::Credited)
            .recoverable(Stage::CreditCalculation)?;
        log_block_event("block_status_changed", block.id, block.height, &BlockStatus::Credited.to_string());

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LedgerStore;
    use crate::testutil::{harness, test_config, Harness};
    use crate::types::Share;

    fn seen_block(h: &Harness, reward: Option<u64>, difficulty: u64, time: i64) -> i64 {
        let mut block = Block::new(100, "reward-tx", difficulty, time, 10);
        block.status = BlockStatus::TxSeen;
        block.reward = reward;
        block.reward_total = reward;
        h.store.insert_block(&block).unwrap()
    }

    fn add_share(h: &Harness, uid: i64, time: i64, count: u64) {
        h.store.insert_share(&Share { miner_uid: uid, time, count }).unwrap();
    }

    fn engine(h: &Harness) -> CreditEngine {
        CreditEngine::new(h.ctx.clone())
    }

    #[test]
    fn test_discount() {
        assert_eq!(discount(1_000_000, 1.0), 990_000);
        assert_eq!(discount(1_000_000, 0.0), 1_000_000);
        assert_eq!(discount(1_000_000, 0.5), 995_000);
        assert_eq!(discount(999, 1.0), 989);
        assert_eq!(discount(1_000_000, 100.0), 0);
    }

    #[test]
    fn test_split_reward_rounds_down() {
        let credits = split_reward(100, &[(1, 1), (2, 1), (3, 1)]);
        assert_eq!(credits, vec![(1, 33), (2, 33), (3, 33)]);
        assert!(split_reward(100, &[]).is_empty());
        assert!(split_reward(100, &[(1, 0)]).is_empty());
    }

    #[test]
    fn test_credit_conservation() {
        let splits = vec![
            FeeSplit { uid: 1, name: "ops".into(), percent: 33 },
            FeeSplit { uid: 2, name: "dev".into(), percent: 67 },
        ];
        let share_sets: [&[(i64, u64)]; 4] = [
            &[(10, 7), (11, 3)],
            &[(10, 1), (11, 1), (12, 1)],
            &[(10, 123_456), (11, 789), (12, 1), (13, 99_999)],
            &[(10, 5)],
        ];

        for reward in [1u64, 999, 1_000_000, 617_283_950_617] {
            for shares in share_sets {
                let payable = discount(reward, 1.5);
                let credits = split_reward(payable, shares);
                let credited: u64 = credits.iter().map(|(_, a)| a).sum();
                assert!(credited <= payable);

                let remainder = reward - credited;
                let dev: u64 = split_dev_fee(remainder, &splits).iter().map(|(_, a)| a).sum();
                assert!(dev <= remainder);
                assert!(credited + dev <= reward);
            }
        }
    }

    #[test]
    fn test_two_miner_block() {
        let mut config = test_config();
        config.fee.percent = 1.0;
        config.fee.split = vec![
            FeeSplit { uid: 1, name: "ops".into(), percent: 60 },
            FeeSplit { uid: 2, name: "dev".into(), percent: 40 },
        ];
        let h = harness(config);

        add_share(&h, 10, 900, 70);
        add_share(&h, 11, 950, 30);
        let id = seen_block(&h, Some(1_000_000), 50, 1000);

        let report = engine(&h).calculate().unwrap();
        assert_eq!(report.credited, 1);

        let credits = h.store.credits_for_block(id).unwrap();
        let amounts: Vec<_> = credits
            .iter()
            .map(|c| (c.miner_uid, c.amount_reward, c.amount_dev))
            .collect();
        assert_eq!(
            amounts,
            vec![
                (1, None, Some(6_000)),
                (2, None, Some(4_000)),
                (10, Some(693_000), None),
                (11, Some(297_000), None),
            ]
        );
        assert!(credits.iter().all(|c| c.status == CreditStatus::Pending));
        assert_eq!(h.store.get_block(id).unwrap().unwrap().status, BlockStatus::Credited);
    }

    #[test]
    fn test_window_excludes_older_shares() {
        let h = harness(test_config());

        add_share(&h, 12, 100, 1_000);
        add_share(&h, 10, 900, 70);
        add_share(&h, 11, 950, 30);
        // after the block
        add_share(&h, 13, 1_100, 1_000);
        let id = seen_block(&h, Some(1_000_000), 50, 1000);

        engine(&h).calculate().unwrap();

        let uids: Vec<_> = h
            .store
            .credits_for_block(id)
            .unwrap()
            .iter()
            .filter(|c| c.amount_reward.is_some())
            .map(|c| c.miner_uid)
            .collect();
        assert_eq!(uids, vec![10, 11]);
    }

    #[test]
    fn test_dev_recipient_who_also_mined() {
        let h = harness(test_config());
        add_share(&h, 1, 900, 100);
        let id = seen_block(&h, Some(1_000_000), 50, 1000);

        engine(&h).calculate().unwrap();

        let credits = h.store.credits_for_block(id).unwrap();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].amount_reward, Some(990_000));
        assert_eq!(credits[0].amount_dev, Some(10_000));
        assert_eq!(credits[0].total(), 1_000_000);
    }

    #[test]
    fn test_block_without_reward_skipped() {
        let h = harness(test_config());
        add_share(&h, 10, 900, 100);
        let id = seen_block(&h, None, 50, 1000);

        let report = engine(&h).calculate().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(h.store.get_block(id).unwrap().unwrap().status, BlockStatus::TxSeen);
        assert!(h.store.credits_for_block(id).unwrap().is_empty());
    }

    #[test]
    fn test_short_window_skipped() {
        let h = harness(test_config());
        add_share(&h, 10, 900, 99);
        let id = seen_block(&h, Some(1_000_000), 50, 1000);

        let report = engine(&h).calculate().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(h.store.get_block(id).unwrap().unwrap().status, BlockStatus::TxSeen);
    }

    #[test]
    fn test_interrupted_pass_completes() {
        let h = harness(test_config());
        add_share(&h, 10, 900, 100);
        let id = seen_block(&h, Some(1_000_000), 50, 1000);

        // a previous pass wrote the miner credit and stopped
        h.store
            .insert_credit(&Credit {
                block_id: id,
                miner_uid: 10,
                time: 0,
                amount_reward: Some(990_000),
                amount_bonus: None,
                amount_dev: None,
                status: CreditStatus::Pending,
            })
            .unwrap();

        let report = engine(&h).calculate().unwrap();
        assert_eq!(report.credited, 1);
        assert_eq!(h.store.credits_for_block(id).unwrap().len(), 2);
        assert_eq!(h.store.get_block(id).unwrap().unwrap().status, BlockStatus::Credited);
    }

    #[test]
    fn test_window_grows_with_difficulty() {
        let h = harness(test_config());
        for t in 0..50 {
            add_share(&h, t % 4, 500 + t * 10, 3);
        }

        let mut last_start = i64::MAX;
        for difficulty in [1u64, 5, 10, 20, 40, 60, 75] {
            let start = h.store.pplns_window_start(1000, difficulty * 2).unwrap().unwrap();
            assert!(start <= last_start, "window shrank at difficulty {}", difficulty);
            last_start = start;
        }
    }
}
