//! Payout Service
//!
//! The driver loop. Each iteration self-tests the ledger and both RPC
//! endpoints, then, if the wallet has moved past the last scanned height,
//! runs one cycle:
//!
//! tracker -> credit calculate -> credit unlock -> [batcher] -> reconciler
//!
//! The batcher only runs on heights that are a multiple of the configured
//! payout interval. The scan height is written last, so an abandoned cycle
//! is simply redone from the top.
//!
//! Shutdown is observed between cycles and during sleeps, never mid-cycle.

use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use crate::block_tracker::{BlockTracker, TrackerReport};
use crate::common::error::{PayoutError, Result, ResultExt, Stage};
use crate::common::logging::{generate_correlation_id, log_system_event};
use crate::context::PayoutContext;
use crate::credit::{CalculationReport, CreditEngine, MaturityReport};
use crate::payments::{BatchReport, PaymentBatcher, PaymentReconciler, ReconcileReport};
use crate::types::ledger_time_now;

/// How long payment work stays suspended after a critical error
pub const HALT_DURATION: Duration = Duration::from_secs(31_556_952);

/// What one cycle did, stage by stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub wallet_height: u64,
    pub tracker: TrackerReport,
    pub calculation: CalculationReport,
    pub maturity: MaturityReport,
    /// `None` when the height is not a payout height
    pub batch: Option<BatchReport>,
    pub reconcile: ReconcileReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Wallet height equals the last scanned height
    Idle { height: u64 },
    Completed(CycleReport),
}

/// Why [`PayoutService::run`] returned
#[derive(Debug)]
pub enum RunOutcome {
    Shutdown,
    /// A critical error stopped payment work
    Halted(PayoutError),
}

pub struct PayoutService {
    ctx: PayoutContext,
}

impl PayoutService {
    pub fn new(ctx: PayoutContext) -> Self {
        Self { ctx }
    }

    /// Ledger reachable, daemon and wallet RPC answering
    pub async fn self_test(&self) -> Result<()> {
        self.ctx.store.ping().recoverable(Stage::SelfTest)?;

        let info = self.ctx.daemon.info().await.recoverable(Stage::SelfTest)?;
        let version = self.ctx.wallet.version().await.recoverable(Stage::SelfTest)?;

        tracing::debug!(
            target: "payoutd::system",
            daemon_height = info.height,
            daemon_status = %info.status,
            wallet_version = version,
            "self test passed"
        );
        Ok(())
    }

    /// Run one cycle against the current wallet height
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let wallet_height = self
            .ctx
            .wallet
            .height()
            .await
            .recoverable(Stage::ScanHeight)?;
        let last_scan = self.ctx.store.scan_height().recoverable(Stage::ScanHeight)?;

        tracing::info!(
            target: "payoutd::system",
            wallet_height,
            last_scan_height = last_scan,
            "heights"
        );

        if wallet_height == last_scan {
            return Ok(CycleOutcome::Idle {
                height: wallet_height,
            });
        }

        let correlation_id = generate_correlation_id();
        log_system_event(
            "cycle_started",
            &correlation_id,
            json!({ "wallet_height": wallet_height, "last_scan_height": last_scan }),
        );

        let mut report = CycleReport {
            wallet_height,
            ..Default::default()
        };

        report.tracker = BlockTracker::new(self.ctx.clone()).advance(wallet_height).await?;

        let credit = CreditEngine::new(self.ctx.clone());
        report.calculation = credit.calculate()?;
        report.maturity = credit.unlock()?;

        if wallet_height % self.ctx.config.payments.network_block_interval == 0 {
            tracing::info!(target: "payoutd::system", wallet_height, "payout height, making payments");
            report.batch = Some(PaymentBatcher::new(self.ctx.clone()).make_payments().await?);
        }

        report.reconcile = PaymentReconciler::new(self.ctx.clone())
            .unlock(wallet_height)
            .await?;

        self.ctx
            .store
            .set_scan_height(wallet_height, ledger_time_now())
            .recoverable(Stage::ScanHeight)?;

        log_system_event(
            "cycle_completed",
            &correlation_id,
            json!({
                "wallet_height": wallet_height,
                "blocks_seen": report.tracker.tx_seen,
                "blocks_matured": report.tracker.matured,
                "blocks_orphaned": report.tracker.orphaned,
                "blocks_credited": report.calculation.credited,
                "blocks_closed": report.maturity.closed,
                "payments_sent": report.batch.as_ref().map(|b| b.recipients),
                "payments_matured": report.reconcile.matured,
                "payments_orphaned": report.reconcile.orphaned,
            }),
        );

        Ok(CycleOutcome::Completed(report))
    }

    /// Loop until shutdown or a critical error
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RunOutcome {
        let general = &self.ctx.config.general;
        let interval = Duration::from_secs(general.interval);
        let self_test_timeout = Duration::from_secs(general.self_test_timeout);

        tracing::info!(target: "payoutd::system", interval = general.interval, "payout service started");

        while !*shutdown.borrow() {
            if let Err(e) = self.self_test().await {
                tracing::error!(
                    target: "payoutd::system",
                    error = %e,
                    sleep_secs = general.self_test_timeout,
                    "self test failed"
                );
                sleep_or_shutdown(self_test_timeout, &mut shutdown).await;
                continue;
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::Idle { height }) => {
                    tracing::info!(target: "payoutd::system", height, "no new blocks");
                }
                Ok(CycleOutcome::Completed(report)) => {
                    tracing::info!(
                        target: "payoutd::system",
                        wallet_height = report.wallet_height,
                        "cycle done"
                    );
                }
                Err(e) if e.is_critical() => {
                    tracing::error!(
                        target: "payoutd::system",
                        error = %e,
                        code = e.error_code(),
                        stage = %e.stage(),
                        "critical payment error, halting payouts"
                    );
                    sleep_or_shutdown(HALT_DURATION, &mut shutdown).await;
                    return RunOutcome::Halted(e);
                }
                Err(e) => {
                    tracing::error!(
                        target: "payoutd::system",
                        error = %e,
                        stage = %e.stage(),
                        "cycle abandoned until next run"
                    );
                }
            }

            sleep_or_shutdown(interval, &mut shutdown).await;
        }

        tracing::info!(target: "payoutd::system", "payout service stopped");
        RunOutcome::Shutdown
    }
}

/// Sleep for `duration`, returning early once shutdown is signalled
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.wait_for(|stop| *stop) => {}
    }
}
