//! # Database Migrations
//!
//! SQL files under `migrations/sqlite/` are embedded at compile time and
//! applied in filename order on startup.
//!
//! ```text
//! migrations/sqlite/
//! ├── 001_marketplace_schema.sql  # products, orders, stock entries, settings
//! └── 002_tally_sync.sql          # sync_tasks, health logs, voucher cursor/ledger
//! ```
//!
//! Never edit an applied migration; add a new `NNN_description.sql`.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Brings the schema up to date. Already-applied files are skipped, so the
/// storefront and the daemon may both call this.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(known = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// `(known, applied)` migration counts.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
