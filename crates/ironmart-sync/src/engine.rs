//! # Tally Sync Engine
//!
//! Wires the probe, queue, reconciler, audit log and scheduler together and
//! exposes the operations the admin API needs.
//!
//! ```rust,ignore
//! let engine = Arc::new(TallySyncEngine::connect(config, db)?);
//! let handle = engine.scheduler().start();
//!
//! match engine.sync_one(SyncEntityType::Order, &order_id).await? {
//!     SyncOneOutcome::QueuedOffline => { /* picked up by the hourly drain */ }
//!     other => println!("{:?}", other),
//! }
//!
//! handle.shutdown().await;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use ironmart_core::validation::validate_list_limit;
use ironmart_core::{
    EnqueueOutcome, HealthResult, HealthSnapshot, JobKind, QueueStats, RunTrigger,
    RuntimeSettings, SyncEntityType, SyncOneOutcome, SyncTask, SyncTaskStatus, VoucherCursor,
};
use ironmart_db::{Database, TALLY_SYNC_ENABLED};

use crate::audit::AuditLog;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::inbound::InboundReconciler;
use crate::jobs::{
    AbandonedOrderCleanupJob, FullStockResetJob, HealthCheckJob, JobHandler, JobRunOutcome,
    VoucherPullJob,
};
use crate::outbound::OutboundQueue;
use crate::probe::ConnectivityProbe;
use crate::scheduler::{JobDefinition, Scheduler};
use crate::tally::{HttpTallyGateway, TallyGateway};

/// Dashboard summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyStatus {
    pub enabled: bool,
    pub tally_url: String,
    pub latest: Option<HealthSnapshot>,
    pub queue: QueueStats,
    pub cursor: VoucherCursor,
}

pub struct TallySyncEngine {
    config: SyncConfig,
    db: Arc<Database>,
    probe: ConnectivityProbe,
    outbound: Arc<OutboundQueue>,
    inbound: Arc<InboundReconciler>,
    audit: AuditLog,
    scheduler: Arc<Scheduler>,
}

impl TallySyncEngine {
    /// Builds the engine against Tally's HTTP interface.
    pub fn connect(config: SyncConfig, db: Arc<Database>) -> SyncResult<Self> {
        let gateway = HttpTallyGateway::new(&config.tally)?;
        info!(url = gateway.base_url(), "Using Tally HTTP gateway");
        Self::new(config, db, Arc::new(gateway))
    }

    pub fn new(
        config: SyncConfig,
        db: Arc<Database>,
        gateway: Arc<dyn TallyGateway>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let probe = ConnectivityProbe::new(Arc::clone(&gateway), config.tally.probe_timeout());
        let outbound = Arc::new(OutboundQueue::new(
            Arc::clone(&db),
            Arc::clone(&gateway),
            probe.clone(),
            &config,
        )?);
        let inbound = Arc::new(InboundReconciler::new(Arc::clone(&db), gateway, &config));
        let audit = AuditLog::new(Arc::clone(&db), config.retention.clone());

        let mut scheduler = Scheduler::new(Arc::clone(&db), config.time_zone()?, config.tally.enabled);
        for kind in JobKind::ALL {
            let handler: Arc<dyn JobHandler> = match kind {
                JobKind::VoucherPull => Arc::new(VoucherPullJob::new(Arc::clone(&inbound))),
                JobKind::FullStockReset => Arc::new(FullStockResetJob::new(Arc::clone(&inbound))),
                JobKind::HealthCheck => Arc::new(HealthCheckJob::new(
                    probe.clone(),
                    Arc::clone(&outbound),
                    audit.clone(),
                )),
                JobKind::AbandonedOrderCleanup => Arc::new(AbandonedOrderCleanupJob::new(
                    Arc::clone(&db),
                    config.orders.abandoned_timeout(),
                )),
            };
            scheduler.register(JobDefinition {
                kind,
                cadence: config.cadence(kind),
                handler,
            })?;
        }

        Ok(TallySyncEngine {
            config,
            db,
            probe,
            outbound,
            inbound,
            audit,
            scheduler: Arc::new(scheduler),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn inbound(&self) -> &InboundReconciler {
        &self.inbound
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    // =========================================================================
    // Admin Operations
    // =========================================================================

    pub async fn check_connection(&self) -> HealthResult {
        self.probe.probe().await
    }

    pub async fn status(&self) -> SyncResult<TallyStatus> {
        let settings = self.scheduler.runtime_settings().await?;
        Ok(TallyStatus {
            enabled: settings.tally_sync_enabled,
            tally_url: self.config.tally.url.clone(),
            latest: self.audit.latest().await?,
            queue: self.audit.queue_stats().await?,
            cursor: self.db.vouchers().cursor().await?,
        })
    }

    pub async fn logs(&self, limit: i64) -> SyncResult<Vec<HealthSnapshot>> {
        self.audit.list(limit).await
    }

    pub async fn tasks(
        &self,
        status: Option<SyncTaskStatus>,
        limit: i64,
    ) -> SyncResult<Vec<SyncTask>> {
        validate_list_limit(limit)?;
        Ok(self.db.sync_tasks().list(status, limit).await?)
    }

    pub async fn enqueue(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> SyncResult<EnqueueOutcome> {
        self.outbound.enqueue(entity_type, entity_id).await
    }

    /// Manual push. With sync switched off the entity is only queued.
    pub async fn sync_one(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> SyncResult<SyncOneOutcome> {
        if !self.scheduler.runtime_settings().await?.tally_sync_enabled {
            return Ok(match self.outbound.enqueue(entity_type, entity_id).await? {
                EnqueueOutcome::AlreadySynced => SyncOneOutcome::AlreadySynced,
                _ => SyncOneOutcome::QueuedOffline,
            });
        }
        self.outbound.sync_one(entity_type, entity_id).await
    }

    pub async fn run_job(&self, kind: JobKind) -> SyncResult<JobRunOutcome> {
        self.scheduler.run_now(kind, RunTrigger::Manual).await
    }

    pub async fn set_enabled(&self, enabled: bool) -> SyncResult<RuntimeSettings> {
        self.db.settings().set_bool(TALLY_SYNC_ENABLED, enabled).await?;
        info!(enabled, "Tally sync toggled");
        self.scheduler.runtime_settings().await
    }
}
