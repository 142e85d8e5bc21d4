//! # Health Log Repository
//!
//! Append-only history of health-check cycles (`tally_health_logs`). Rows
//! are never updated; retention is the only thing that deletes them.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::DbResult;
use ironmart_core::HealthSnapshot;

const SNAPSHOT_COLUMNS: &str = r#"
    id, checked_at, online, response_time_ms, error_message,
    queue_processed, queue_success, queue_failed, run_trigger
"#;

#[derive(Debug, Clone)]
pub struct HealthLogRepository {
    pool: SqlitePool,
}

impl HealthLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        HealthLogRepository { pool }
    }

    pub async fn insert(&self, snapshot: &HealthSnapshot) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tally_health_logs (
                id, checked_at, online, response_time_ms, error_message,
                queue_processed, queue_success, queue_failed, run_trigger
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&snapshot.id)
        .bind(snapshot.checked_at)
        .bind(snapshot.online)
        .bind(snapshot.response_time_ms)
        .bind(&snapshot.error_message)
        .bind(snapshot.queue_processed)
        .bind(snapshot.queue_success)
        .bind(snapshot.queue_failed)
        .bind(snapshot.trigger)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Newest first.
    pub async fn list(&self, limit: i64) -> DbResult<Vec<HealthSnapshot>> {
        let sql = format!(
            "SELECT {} FROM tally_health_logs ORDER BY checked_at DESC, rowid DESC LIMIT ?1",
            SNAPSHOT_COLUMNS
        );
        let rows = sqlx::query_as::<_, HealthSnapshot>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn latest(&self) -> DbResult<Option<HealthSnapshot>> {
        Ok(self.list(1).await?.into_iter().next())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM tally_health_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes snapshots checked before `cutoff`.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM tally_health_logs WHERE checked_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Keeps only the newest `max_entries` snapshots.
    pub async fn trim_to(&self, max_entries: i64) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tally_health_logs
            WHERE id NOT IN (
                SELECT id FROM tally_health_logs
                ORDER BY checked_at DESC, rowid DESC
                LIMIT ?1
            )
            "#,
        )
        .bind(max_entries)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use ironmart_core::RunTrigger;

    fn snapshot(checked_at: DateTime<Utc>, online: bool) -> HealthSnapshot {
        HealthSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            checked_at,
            online,
            response_time_ms: 12,
            error_message: (!online).then(|| "connection refused".to_string()),
            queue_processed: 3,
            queue_success: 3,
            queue_failed: 0,
            trigger: RunTrigger::Scheduled,
        }
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let logs = db.health_logs();
        let now = Utc::now();

        logs.insert(&snapshot(now - Duration::hours(2), false)).await.unwrap();
        logs.insert(&snapshot(now, true)).await.unwrap();
        logs.insert(&snapshot(now - Duration::hours(1), false)).await.unwrap();

        let rows = logs.list(10).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].online);
        assert_eq!(rows[0].trigger, RunTrigger::Scheduled);
        assert!(rows[0].checked_at > rows[1].checked_at);
        assert_eq!(rows[2].error_message.as_deref(), Some("connection refused"));

        let latest = logs.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, rows[0].id);
    }

    #[tokio::test]
    async fn test_retention_by_age_and_count() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let logs = db.health_logs();
        let now = Utc::now();

        logs.insert(&snapshot(now - Duration::days(40), true)).await.unwrap();
        for h in 0..5 {
            logs.insert(&snapshot(now - Duration::hours(h), true)).await.unwrap();
        }

        assert_eq!(logs.delete_older_than(now - Duration::days(30)).await.unwrap(), 1);
        assert_eq!(logs.trim_to(3).await.unwrap(), 2);
        assert_eq!(logs.count().await.unwrap(), 3);

        // The newest survive.
        let rows = logs.list(10).await.unwrap();
        assert!(rows.iter().all(|r| r.checked_at > now - Duration::hours(3)));
    }
}
