//! # Status & Audit Log
//!
//! Health-check history for the admin dashboard. Writing history must never
//! break a sync cycle, so `record` and `cleanup_old_logs` only log failures.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use ironmart_core::validation::validate_list_limit;
use ironmart_core::{HealthSnapshot, QueueStats};
use ironmart_db::Database;

use crate::config::RetentionSettings;
use crate::error::SyncResult;

#[derive(Clone)]
pub struct AuditLog {
    db: Arc<Database>,
    retention: RetentionSettings,
}

impl AuditLog {
    pub fn new(db: Arc<Database>, retention: RetentionSettings) -> Self {
        AuditLog { db, retention }
    }

    pub async fn record(&self, snapshot: &HealthSnapshot) {
        match self.db.health_logs().insert(snapshot).await {
            Ok(()) => debug!(snapshot_id = %snapshot.id, online = snapshot.online, "Recorded health snapshot"),
            Err(e) => warn!(snapshot_id = %snapshot.id, error = %e, "Failed to record health snapshot"),
        }
    }

    /// Drops snapshots past the retention window, then trims to the cap.
    pub async fn cleanup_old_logs(&self) {
        let logs = self.db.health_logs();
        let cutoff = Utc::now() - Duration::days(self.retention.days);

        let expired = match logs.delete_older_than(cutoff).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Health log retention cleanup failed");
                return;
            }
        };

        match logs.trim_to(self.retention.max_entries).await {
            Ok(trimmed) if expired + trimmed > 0 => {
                debug!(expired, trimmed, "Pruned health log")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Health log trim failed"),
        }
    }

    /// Newest first.
    pub async fn list(&self, limit: i64) -> SyncResult<Vec<HealthSnapshot>> {
        validate_list_limit(limit)?;
        Ok(self.db.health_logs().list(limit).await?)
    }

    pub async fn latest(&self) -> SyncResult<Option<HealthSnapshot>> {
        Ok(self.db.health_logs().latest().await?)
    }

    pub async fn queue_stats(&self) -> SyncResult<QueueStats> {
        Ok(self.db.sync_tasks().stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironmart_core::{DrainReport, HealthResult, RunTrigger};
    use ironmart_db::DbConfig;

    async fn audit(days: i64, max_entries: i64) -> AuditLog {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        AuditLog::new(Arc::new(db), RetentionSettings { days, max_entries })
    }

    fn snapshot(minutes_ago: i64) -> HealthSnapshot {
        HealthSnapshot::new(
            uuid::Uuid::new_v4().to_string(),
            Utc::now() - Duration::minutes(minutes_ago),
            &HealthResult::online(12),
            &DrainReport::default(),
            RunTrigger::Scheduled,
        )
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let audit = audit(30, 1000).await;
        audit.record(&snapshot(30)).await;
        audit.record(&snapshot(10)).await;
        audit.record(&snapshot(20)).await;

        let logs = audit.list(10).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs[0].checked_at > logs[1].checked_at);
        assert!(logs[1].checked_at > logs[2].checked_at);
        assert_eq!(audit.latest().await.unwrap().unwrap().id, logs[0].id);
    }

    #[tokio::test]
    async fn test_cleanup_applies_age_and_cap() {
        let audit = audit(1, 2).await;
        audit.record(&snapshot(3 * 24 * 60)).await;
        for minutes in [5, 4, 3] {
            audit.record(&snapshot(minutes)).await;
        }

        audit.cleanup_old_logs().await;

        let logs = audit.list(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|s| s.checked_at > Utc::now() - Duration::minutes(5)));
    }

    #[tokio::test]
    async fn test_list_rejects_bad_limit() {
        let audit = audit(30, 1000).await;
        assert!(audit.list(0).await.is_err());
    }
}
