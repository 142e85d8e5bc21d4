//! # Background Jobs
//!
//! The four units of work the scheduler runs. Each job is a [`JobHandler`];
//! cadence, single-flight and the enabled flag are the scheduler's business.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  voucher_pull            InboundReconciler::fetch_modified_vouchers     │
//! │  full_stock_reset        InboundReconciler::fetch_closing_balances      │
//! │  health_check            probe → drain if online → snapshot → prune     │
//! │  abandoned_order_cleanup cancel unpaid online orders, restore stock     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use ironmart_core::{
    CleanupReport, ClosingBalanceReport, DrainReport, HealthResult, HealthSnapshot, RunTrigger,
    RuntimeSettings, VoucherPullReport, SYSTEM_ACTOR,
};
use ironmart_db::Database;

use crate::audit::AuditLog;
use crate::error::SyncResult;
use crate::inbound::InboundReconciler;
use crate::outbound::OutboundQueue;
use crate::probe::ConnectivityProbe;

// =============================================================================
// Job Contract
// =============================================================================

/// Per-run inputs. Settings are read fresh from the database for every run.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    pub trigger: RunTrigger,
    pub settings: RuntimeSettings,
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobOutput {
    VoucherPull(VoucherPullReport),
    StockReset(ClosingBalanceReport),
    HealthCheck {
        health: HealthResult,
        drain: DrainReport,
    },
    Cleanup(CleanupReport),
}

/// Result of asking the scheduler to run a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobRunOutcome {
    Completed { output: JobOutput },
    /// The previous run of the same job has not finished.
    AlreadyRunning,
    /// Tally sync is switched off.
    Disabled,
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: &JobContext) -> SyncResult<JobOutput>;
}

// =============================================================================
// Inbound Jobs
// =============================================================================

pub struct VoucherPullJob {
    inbound: Arc<InboundReconciler>,
}

impl VoucherPullJob {
    pub fn new(inbound: Arc<InboundReconciler>) -> Self {
        VoucherPullJob { inbound }
    }
}

#[async_trait]
impl JobHandler for VoucherPullJob {
    async fn run(&self, _ctx: &JobContext) -> SyncResult<JobOutput> {
        Ok(JobOutput::VoucherPull(
            self.inbound.fetch_modified_vouchers().await?,
        ))
    }
}

pub struct FullStockResetJob {
    inbound: Arc<InboundReconciler>,
}

impl FullStockResetJob {
    pub fn new(inbound: Arc<InboundReconciler>) -> Self {
        FullStockResetJob { inbound }
    }
}

#[async_trait]
impl JobHandler for FullStockResetJob {
    async fn run(&self, _ctx: &JobContext) -> SyncResult<JobOutput> {
        Ok(JobOutput::StockReset(
            self.inbound.fetch_closing_balances().await?,
        ))
    }
}

// =============================================================================
// Health Check + Drain
// =============================================================================

pub struct HealthCheckJob {
    probe: ConnectivityProbe,
    outbound: Arc<OutboundQueue>,
    audit: AuditLog,
}

impl HealthCheckJob {
    pub fn new(probe: ConnectivityProbe, outbound: Arc<OutboundQueue>, audit: AuditLog) -> Self {
        HealthCheckJob {
            probe,
            outbound,
            audit,
        }
    }
}

#[async_trait]
impl JobHandler for HealthCheckJob {
    async fn run(&self, ctx: &JobContext) -> SyncResult<JobOutput> {
        let health = self.probe.probe().await;

        let (drain, drained) = if health.online {
            self.outbound.drain_with_report().await
        } else {
            info!(error = ?health.error, "Tally offline, skipping outbound drain");
            (DrainReport::default(), Ok(()))
        };

        // Written even when the drain errored, with the counts it reached.
        let snapshot = HealthSnapshot::new(
            Uuid::new_v4().to_string(),
            Utc::now(),
            &health,
            &drain,
            ctx.trigger,
        );
        self.audit.record(&snapshot).await;
        self.audit.cleanup_old_logs().await;

        drained?;
        Ok(JobOutput::HealthCheck { health, drain })
    }
}

// =============================================================================
// Abandoned Order Cleanup
// =============================================================================

/// Cancels online orders whose payment never arrived and returns their stock.
pub struct AbandonedOrderCleanupJob {
    db: Arc<Database>,
    timeout: Duration,
}

impl AbandonedOrderCleanupJob {
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        AbandonedOrderCleanupJob { db, timeout }
    }
}

#[async_trait]
impl JobHandler for AbandonedOrderCleanupJob {
    async fn run(&self, _ctx: &JobContext) -> SyncResult<JobOutput> {
        let orders = self.db.orders();
        let cutoff = Utc::now() - self.timeout;
        let abandoned = orders.find_abandoned(cutoff).await?;

        let reason = format!(
            "Payment not received within {} minutes",
            self.timeout.num_minutes()
        );
        let mut report = CleanupReport {
            examined: abandoned.len() as i64,
            ..Default::default()
        };

        for order in &abandoned {
            match orders.cancel_abandoned(&order.id, &reason, SYSTEM_ACTOR).await {
                Ok(Some(units)) => {
                    report.cancelled += 1;
                    report.units_restored += units;
                }
                Ok(None) => {}
                Err(e) => warn!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    error = %e,
                    "Failed to cancel abandoned order"
                ),
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                cancelled = report.cancelled,
                units_restored = report.units_restored,
                "Abandoned order cleanup finished"
            );
        }
        Ok(JobOutput::Cleanup(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_shape() {
        let outcome = JobRunOutcome::Completed {
            output: JobOutput::Cleanup(CleanupReport {
                examined: 2,
                cancelled: 1,
                units_restored: 3,
            }),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["output"]["job"], "cleanup");
        assert_eq!(json["output"]["unitsRestored"], 3);

        let busy = serde_json::to_value(JobRunOutcome::AlreadyRunning).unwrap();
        assert_eq!(busy["outcome"], "already_running");
    }
}
