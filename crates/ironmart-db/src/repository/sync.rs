//! # Sync Task Repository
//!
//! The outbound queue: one row per marketplace entity that must reach Tally.
//!
//! ## Claiming Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Conditional Claim                                    │
//! │                                                                         │
//! │  Drain A (scheduled)               Drain B (manual push)               │
//! │       │                                 │                               │
//! │       ▼                                 ▼                               │
//! │  UPDATE sync_tasks                 UPDATE sync_tasks                    │
//! │  SET status = 'queued'             SET status = 'queued'                │
//! │  WHERE id = ?                      WHERE id = ?                         │
//! │    AND status IN ('pending',         AND status IN ('pending',          │
//! │                   'failed')                         'failed')           │
//! │       │                                 │                               │
//! │       ▼                                 ▼                               │
//! │  rows_affected = 1 → owns it       rows_affected = 0 → skip             │
//! │                                                                         │
//! │  SQLite serializes writers, so exactly one UPDATE wins even when the   │
//! │  drains run in different processes.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use ironmart_core::{EnqueueOutcome, QueueStats, SyncEntityType, SyncTask, SyncTaskStatus};

const TASK_COLUMNS: &str = r#"
    id, entity_type, entity_id, status, attempts, last_error,
    created_at, last_attempt_at, synced_at, tally_voucher_id
"#;

/// A drainable task plus its insertion sequence, used as a keyset cursor
/// so a drain never revisits a task it already failed in the same run.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DrainableTask {
    pub seq: i64,
    #[sqlx(flatten)]
    pub task: SyncTask,
}

/// Repository for the outbound sync queue.
#[derive(Debug, Clone)]
pub struct SyncTaskRepository {
    pool: SqlitePool,
}

impl SyncTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncTaskRepository { pool }
    }

    /// Idempotently records that an entity must be pushed to Tally.
    ///
    /// ## Outcomes
    /// - `Created`: a new `pending` row
    /// - `AlreadyPending`: a row exists in any non-synced status
    /// - `AlreadySynced`: the entity is in Tally; nothing changes
    pub async fn enqueue(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> DbResult<EnqueueOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_tasks (id, entity_type, entity_id, status, attempts, created_at)
            VALUES (?1, ?2, ?3, 'pending', 0, ?4)
            ON CONFLICT (entity_type, entity_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entity_type)
        .bind(entity_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(%entity_type, entity_id, "Enqueued sync task");
            return Ok(EnqueueOutcome::Created);
        }

        let status: SyncTaskStatus = sqlx::query_scalar(
            "SELECT status FROM sync_tasks WHERE entity_type = ?1 AND entity_id = ?2",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(match status {
            SyncTaskStatus::Synced => EnqueueOutcome::AlreadySynced,
            _ => EnqueueOutcome::AlreadyPending,
        })
    }

    /// Finds the task for an entity, if one was ever enqueued.
    pub async fn get(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> DbResult<Option<SyncTask>> {
        let sql = format!(
            "SELECT {} FROM sync_tasks WHERE entity_type = ?1 AND entity_id = ?2",
            TASK_COLUMNS
        );
        let task = sqlx::query_as::<_, SyncTask>(&sql)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SyncTask>> {
        let sql = format!("SELECT {} FROM sync_tasks WHERE id = ?1", TASK_COLUMNS);
        let task = sqlx::query_as::<_, SyncTask>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    /// Returns tasks stuck in `queued` longer than `lease` to `pending`.
    ///
    /// A task only stays `queued` past the lease when the process that
    /// claimed it died mid-push.
    pub async fn reset_expired_leases(&self, lease: Duration) -> DbResult<u64> {
        let cutoff = Utc::now() - lease;
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks SET status = 'pending'
            WHERE status = 'queued' AND (last_attempt_at IS NULL OR last_attempt_at < ?1)
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Next batch of drainable tasks in FIFO order, strictly after `after`.
    pub async fn next_batch(
        &self,
        after: Option<&DrainableTask>,
        limit: i64,
        max_attempts: i64,
    ) -> DbResult<Vec<DrainableTask>> {
        let sql = format!(
            r#"
            SELECT rowid AS seq, {}
            FROM sync_tasks
            WHERE status IN ('pending', 'failed')
              AND attempts < ?1
              AND (?2 IS NULL OR created_at > ?2 OR (created_at = ?2 AND rowid > ?3))
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?4
            "#,
            TASK_COLUMNS
        );

        let (after_created, after_seq): (Option<DateTime<Utc>>, i64) = match after {
            Some(t) => (Some(t.task.created_at), t.seq),
            None => (None, 0),
        };

        let tasks = sqlx::query_as::<_, DrainableTask>(&sql)
            .bind(max_attempts)
            .bind(after_created)
            .bind(after_seq)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(tasks)
    }

    /// Tries to take ownership of a task for one submission attempt.
    ///
    /// Returns `false` if another attempt already holds it or it is synced.
    /// A manual push passes `include_stuck` to retry a task past the cap.
    pub async fn claim(&self, id: &str, include_stuck: bool) -> DbResult<bool> {
        let sql = if include_stuck {
            r#"
            UPDATE sync_tasks SET status = 'queued', last_attempt_at = ?2
            WHERE id = ?1 AND status IN ('pending', 'failed', 'stuck')
            "#
        } else {
            r#"
            UPDATE sync_tasks SET status = 'queued', last_attempt_at = ?2
            WHERE id = ?1 AND status IN ('pending', 'failed')
            "#
        };

        let result = sqlx::query(sql)
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records a successful import.
    pub async fn mark_synced(&self, id: &str, tally_voucher_id: Option<&str>) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sync_tasks SET
                status = 'synced',
                synced_at = ?2,
                last_error = NULL,
                tally_voucher_id = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(tally_voucher_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SyncTask", id));
        }
        Ok(())
    }

    /// Records a failed attempt and returns the resulting status:
    /// `failed`, or `stuck` once `attempts` reaches `max_attempts`.
    pub async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        max_attempts: i64,
    ) -> DbResult<SyncTaskStatus> {
        let status: Option<SyncTaskStatus> = sqlx::query_scalar(
            r#"
            UPDATE sync_tasks SET
                attempts = attempts + 1,
                last_error = ?2,
                status = CASE WHEN attempts + 1 >= ?3 THEN 'stuck' ELSE 'failed' END
            WHERE id = ?1
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        status.ok_or_else(|| DbError::not_found("SyncTask", id))
    }

    /// Puts a failed or stuck task back to `pending` so the next drain
    /// retries it. A stuck task also gets its attempt counter reset.
    pub async fn requeue(&self, entity_type: SyncEntityType, entity_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks SET
                attempts = CASE WHEN status = 'stuck' THEN 0 ELSE attempts END,
                status = 'pending'
            WHERE entity_type = ?1 AND entity_id = ?2 AND status IN ('failed', 'stuck')
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists tasks, newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<SyncTaskStatus>,
        limit: i64,
    ) -> DbResult<Vec<SyncTask>> {
        let sql = format!(
            r#"
            SELECT {} FROM sync_tasks
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
            TASK_COLUMNS
        );

        let tasks = sqlx::query_as::<_, SyncTask>(&sql)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    /// Task counts per status.
    pub async fn stats(&self) -> DbResult<QueueStats> {
        let rows: Vec<(SyncTaskStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM sync_tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status {
                SyncTaskStatus::Pending => stats.pending = count,
                SyncTaskStatus::Queued => stats.queued = count,
                SyncTaskStatus::Synced => stats.synced = count,
                SyncTaskStatus::Failed => stats.failed = count,
                SyncTaskStatus::Stuck => stats.stuck = count,
            }
        }
        Ok(stats)
    }
}

/// Deletes the idle tasks for an entity, inside the caller's transaction.
/// Synced tasks are history and stay, and a `queued` task belongs to a push
/// that is still running.
pub(crate) async fn delete_unsynced_on(
    conn: &mut SqliteConnection,
    entity_type: SyncEntityType,
    entity_id: &str,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM sync_tasks
        WHERE entity_type = ?1 AND entity_id = ?2 AND status NOT IN ('synced', 'queued')
        "#,
    )
    .bind(entity_type)
    .bind(entity_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================
