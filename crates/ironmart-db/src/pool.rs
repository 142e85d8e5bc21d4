//! # Marketplace Database Handle
//!
//! The daemon opens the same SQLite file the storefront writes orders to.
//! Repositories hang off [`Database`]; each one owns a pool clone.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  storefront ──writes orders──┐                                          │
//! │                              ▼                                          │
//! │                     marketplace.db (WAL)                                │
//! │                              ▲                                          │
//! │  sync-daemon ── Database ────┤                                          │
//! │                 ├── sync_tasks()    outbound queue                      │
//! │                 ├── vouchers()      cursor + applied ledger             │
//! │                 ├── health_logs()   probe history                       │
//! │                 └── products() / orders() / stock_entries() / settings()│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two processes write the file, so every connection carries a busy timeout
//! and WAL keeps the daemon's long reads from stalling checkout.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::health_log::HealthLogRepository;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::settings::SettingsRepository;
use crate::repository::stock_entry::StockEntryRepository;
use crate::repository::sync::SyncTaskRepository;
use crate::repository::voucher::VoucherRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the marketplace database.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/ironmart/ironmart.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Pool ceiling. Default 5: four job loops plus admin requests.
    pub max_connections: u32,

    pub min_connections: u32,

    /// Wait for a free pooled connection. Default 30 s.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections
    /// forever, which an in-memory database requires.
    pub idle_timeout: Option<Duration>,

    /// How long a statement waits on the storefront's write lock.
    pub busy_timeout: Duration,

    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed database; created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Private, empty, migrated database for tests. One connection, since
    /// every SQLite `:memory:` connection is its own database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the marketplace database. Cheap to clone.
///
/// ```rust,ignore
/// let stats = db.sync_tasks().stats().await?;
/// let cursor = db.vouchers().cursor().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the database with WAL, foreign keys and the
    /// busy timeout, then applies pending migrations unless disabled.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening marketplace database");

        let base_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::Unavailable(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true)
        };

        let connect_options = base_options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);

        if config.is_in_memory() {
            // Closing the last connection would drop the whole database.
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::Unavailable(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Pool ready"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies all pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    pub fn stock_entries(&self) -> StockEntryRepository {
        StockEntryRepository::new(self.pool.clone())
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }

    /// Outbound queue.
    pub fn sync_tasks(&self) -> SyncTaskRepository {
        SyncTaskRepository::new(self.pool.clone())
    }

    /// Probe history.
    pub fn health_logs(&self) -> HealthLogRepository {
        HealthLogRepository::new(self.pool.clone())
    }

    /// AlterID cursor and applied-voucher ledger.
    pub fn vouchers(&self) -> VoucherRepository {
        VoucherRepository::new(self.pool.clone())
    }

    /// True when a trivial statement succeeds.
    pub async fn is_reachable(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
