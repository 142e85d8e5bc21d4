//! # Outbound Sync Queue
//!
//! Pushes marketplace orders and supplier bills to Tally as vouchers.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Outbound Drain                                     │
//! │                                                                         │
//! │  1. Reclaim: queued tasks past their lease → pending                   │
//! │                                                                         │
//! │  2. Page:  pending|failed, attempts < max, ORDER BY created_at, rowid  │
//! │                                                                         │
//! │  3. Per task:                                                          │
//! │       claim (→ queued)          lost? skip, another attempt has it     │
//! │       build voucher from the marketplace record                        │
//! │       import into Tally                                                │
//! │         ok   → synced (+ Tally voucher id)                             │
//! │         err  → failed, attempts+1 (stuck at max)                       │
//! │                transport error? stop, the rest stay pending            │
//! │                                                                         │
//! │  One task's failure never aborts the drain.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ironmart_core::validation::validate_entity_id;
use ironmart_core::{
    DrainReport, EnqueueOutcome, OrderStatus, SyncEntityType, SyncOneOutcome, SyncTask,
    SyncTaskStatus, StockTarget,
};
use ironmart_db::{Database, DbError};

use crate::config::{QueueSettings, SyncConfig, TallySettings};
use crate::error::{SyncError, SyncResult};
use crate::probe::ConnectivityProbe;
use crate::tally::{OutboundLine, OutboundVoucher, TallyGateway};

pub struct OutboundQueue {
    db: Arc<Database>,
    gateway: Arc<dyn TallyGateway>,
    probe: ConnectivityProbe,
    tally: TallySettings,
    queue: QueueSettings,
    tz: Tz,
    drain_lock: Mutex<()>,
}

impl OutboundQueue {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn TallyGateway>,
        probe: ConnectivityProbe,
        config: &SyncConfig,
    ) -> SyncResult<Self> {
        Ok(OutboundQueue {
            db,
            gateway,
            probe,
            tally: config.tally.clone(),
            queue: config.queue.clone(),
            tz: config.time_zone()?,
            drain_lock: Mutex::new(()),
        })
    }

    /// Records that an entity must reach Tally. Safe to call repeatedly.
    pub async fn enqueue(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> SyncResult<EnqueueOutcome> {
        validate_entity_id(entity_id)?;
        let outcome = self.db.sync_tasks().enqueue(entity_type, entity_id).await?;
        debug!(%entity_type, entity_id, ?outcome, "Enqueue");
        Ok(outcome)
    }

    /// Pushes every eligible task, oldest first.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        let (report, result) = self.drain_with_report().await;
        result.map(|()| report)
    }

    /// Like [`drain`](Self::drain), but hands back the counts reached even
    /// when a database error cut the drain short.
    pub async fn drain_with_report(&self) -> (DrainReport, SyncResult<()>) {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();
        let result = self.drain_into(&mut report).await;

        info!(
            processed = report.processed,
            success = report.success,
            failed = report.failed,
            stopped_early = report.stopped_early,
            aborted = result.is_err(),
            "Outbound drain finished"
        );
        (report, result)
    }

    async fn drain_into(&self, report: &mut DrainReport) -> SyncResult<()> {
        let tasks = self.db.sync_tasks();

        let reclaimed = tasks.reset_expired_leases(self.queue.lease()).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed sync tasks with expired leases");
        }

        let mut cursor = None;

        'pages: loop {
            let page = tasks
                .next_batch(cursor.as_ref(), self.queue.batch_size, self.queue.max_attempts)
                .await?;
            if page.is_empty() {
                break;
            }

            for item in page {
                let task = &item.task;

                if tasks.claim(&task.id, false).await? {
                    report.processed += 1;

                    match self.push(task).await {
                        Ok(voucher_id) => {
                            match tasks.mark_synced(&task.id, voucher_id.as_deref()).await {
                                Ok(()) => {
                                    report.success += 1;
                                    info!(
                                        entity_type = %task.entity_type,
                                        entity_id = %task.entity_id,
                                        tally_voucher_id = ?voucher_id,
                                        "Synced to Tally"
                                    );
                                }
                                Err(DbError::NotFound { .. }) => {
                                    report.failed += 1;
                                    warn!(
                                        entity_type = %task.entity_type,
                                        entity_id = %task.entity_id,
                                        tally_voucher_id = ?voucher_id,
                                        "Task removed while its voucher was being imported"
                                    );
                                }
                                Err(e) => return Err(e.into()),
                            }
                        }
                        Err(e) => {
                            report.failed += 1;
                            match tasks
                                .mark_failed(&task.id, &e.to_string(), self.queue.max_attempts)
                                .await
                            {
                                Ok(status) => warn!(
                                    entity_type = %task.entity_type,
                                    entity_id = %task.entity_id,
                                    attempts = task.attempts + 1,
                                    %status,
                                    error = %e,
                                    "Sync to Tally failed"
                                ),
                                Err(DbError::NotFound { .. }) => warn!(
                                    entity_type = %task.entity_type,
                                    entity_id = %task.entity_id,
                                    error = %e,
                                    "Sync to Tally failed and the task is gone"
                                ),
                                Err(db_err) => return Err(db_err.into()),
                            }

                            if e.is_transport() {
                                report.stopped_early = true;
                                break 'pages;
                            }
                        }
                    }
                } else {
                    debug!(task_id = %task.id, "Task claimed elsewhere, skipping");
                }

                cursor = Some(item);
            }
        }

        Ok(())
    }

    /// Manual push of one entity, used by the admin "sync now" button.
    ///
    /// Tally being offline is not an error: the task is left pending and the
    /// next drain picks it up.
    pub async fn sync_one(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> SyncResult<SyncOneOutcome> {
        if self.enqueue(entity_type, entity_id).await? == EnqueueOutcome::AlreadySynced {
            return Ok(SyncOneOutcome::AlreadySynced);
        }

        let tasks = self.db.sync_tasks();

        let health = self.probe.probe().await;
        if !health.online {
            tasks.requeue(entity_type, entity_id).await?;
            info!(%entity_type, entity_id, error = ?health.error, "Tally offline, left queued");
            return Ok(SyncOneOutcome::QueuedOffline);
        }

        let task = tasks
            .get(entity_type, entity_id)
            .await?
            .ok_or_else(|| SyncError::Internal(format!("task for {} vanished", entity_id)))?;

        if !tasks.claim(&task.id, true).await? {
            let current = tasks.get_by_id(&task.id).await?;
            return Ok(match current.map(|t| t.status) {
                Some(SyncTaskStatus::Synced) => SyncOneOutcome::AlreadySynced,
                _ => SyncOneOutcome::InFlight,
            });
        }

        match self.push(&task).await {
            Ok(voucher_id) => {
                tasks.mark_synced(&task.id, voucher_id.as_deref()).await?;
                info!(%entity_type, entity_id, tally_voucher_id = ?voucher_id, "Manual sync succeeded");
                Ok(SyncOneOutcome::Synced {
                    tally_voucher_id: voucher_id,
                })
            }
            Err(e) => {
                tasks
                    .mark_failed(&task.id, &e.to_string(), self.queue.max_attempts)
                    .await?;

                if e.is_transport() {
                    tasks.requeue(entity_type, entity_id).await?;
                    info!(%entity_type, entity_id, error = %e, "Tally went offline, left queued");
                    Ok(SyncOneOutcome::QueuedOffline)
                } else {
                    warn!(%entity_type, entity_id, error = %e, "Manual sync failed");
                    Ok(SyncOneOutcome::Failed {
                        error: e.to_string(),
                    })
                }
            }
        }
    }

    /// Builds and imports one task's voucher. Returns Tally's voucher id.
    async fn push(&self, task: &SyncTask) -> SyncResult<Option<String>> {
        let voucher = self.build_voucher(task.entity_type, &task.entity_id).await?;

        let limit = self.tally.request_timeout();
        let outcome = tokio::time::timeout(limit, self.gateway.import_voucher(&voucher))
            .await
            .map_err(|_| SyncError::Timeout(limit.as_secs()))??;

        Ok(outcome.voucher_id)
    }

    /// Frames a marketplace record as a Tally voucher.
    pub async fn build_voucher(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> SyncResult<OutboundVoucher> {
        match entity_type {
            SyncEntityType::Order => self.order_voucher(entity_id).await,
            SyncEntityType::StockEntry => self.purchase_voucher(entity_id).await,
        }
    }

    async fn order_voucher(&self, order_id: &str) -> SyncResult<OutboundVoucher> {
        let entity_type = SyncEntityType::Order;
        let order = self
            .db
            .orders()
            .get(order_id)
            .await?
            .ok_or_else(|| SyncError::not_found(entity_type.as_str(), order_id))?;

        if order.status == OrderStatus::Cancelled {
            return Err(not_syncable(entity_type, order_id, "order is cancelled"));
        }

        let items = self.db.orders().items(order_id).await?;
        if items.is_empty() {
            return Err(not_syncable(entity_type, order_id, "order has no items"));
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            lines.push(OutboundLine {
                stock_item: self.tally_item_name(entity_type, order_id, &item.stock_target()).await?,
                quantity: item.quantity,
                rate: item.unit_price(),
            });
        }

        Ok(OutboundVoucher {
            entity_type,
            remote_id: entity_type.voucher_reference(&self.tally.reference_prefix, order_id),
            date: self.local_date(order.created_at),
            voucher_number: order.order_number.clone(),
            party_ledger: self.tally.default_party_ledger.clone(),
            ledger: self.tally.sales_ledger.clone(),
            narration: format!(
                "Marketplace order {} for {}",
                order.order_number, order.customer_name
            ),
            lines,
        })
    }

    async fn purchase_voucher(&self, entry_id: &str) -> SyncResult<OutboundVoucher> {
        let entity_type = SyncEntityType::StockEntry;
        let entry = self
            .db
            .stock_entries()
            .get(entry_id)
            .await?
            .ok_or_else(|| SyncError::not_found(entity_type.as_str(), entry_id))?;

        let items = self.db.stock_entries().items(entry_id).await?;
        if items.is_empty() {
            return Err(not_syncable(entity_type, entry_id, "stock entry has no items"));
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let target = StockTarget::new(&item.product_id, item.variation_id.as_deref());
            lines.push(OutboundLine {
                stock_item: self.tally_item_name(entity_type, entry_id, &target).await?,
                quantity: item.quantity,
                rate: ironmart_core::Money::from_paise(item.unit_cost_paise),
            });
        }

        Ok(OutboundVoucher {
            entity_type,
            remote_id: entity_type.voucher_reference(&self.tally.reference_prefix, entry_id),
            date: self.local_date(entry.bill_date),
            voucher_number: entry.bill_number.clone(),
            party_ledger: entry.supplier_name.clone(),
            ledger: self.tally.purchase_ledger.clone(),
            narration: format!("Supplier bill {} from {}", entry.bill_number, entry.supplier_name),
            lines,
        })
    }

    async fn tally_item_name(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
        target: &StockTarget,
    ) -> SyncResult<String> {
        match self.db.products().stock_item(target).await {
            Ok(item) => Ok(item.tally_name().to_string()),
            Err(DbError::NotFound { .. }) => Err(not_syncable(
                entity_type,
                entity_id,
                &format!("stock item {} no longer exists", target.key()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }
}

fn not_syncable(entity_type: SyncEntityType, entity_id: &str, reason: &str) -> SyncError {
    SyncError::EntityNotSyncable {
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        reason: reason.to_string(),
    }
}
