//! # ironmart-db: Database Layer for the Tally Sync Engine
//!
//! SQLite access for both sides of the sync: the marketplace tables the
//! engine reads and adjusts, and the engine's own bookkeeping.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Sync Data Flow                             │
//! │                                                                         │
//! │  ironmart-sync (drain, voucher pull, cleanup job)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  ironmart-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ marketplace:       │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│  products, orders, │  │ 001_...sql │  │   │
//! │  │   │ WAL, FKs on   │    │  stock entries,    │  │ 002_...sql │  │   │
//! │  │   │               │    │  settings          │  │            │  │   │
//! │  │   │               │    │ engine:            │  │            │  │   │
//! │  │   │               │    │  sync tasks, health│  │            │  │   │
//! │  │   │               │    │  logs, vouchers    │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ironmart_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./ironmart.db")).await?;
//! let outcome = db.sync_tasks().enqueue(SyncEntityType::Order, "ord-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConstraintKind, DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::health_log::HealthLogRepository;
pub use repository::order::{NewOrder, NewOrderItem, OrderHistoryEntry, OrderRepository};
pub use repository::product::{NewProduct, NewVariation, ProductRepository};
pub use repository::settings::{SettingsRepository, TALLY_SYNC_ENABLED};
pub use repository::stock_entry::{NewStockEntry, NewStockEntryItem, StockEntryRepository};
pub use repository::sync::{DrainableTask, SyncTaskRepository};
pub use repository::voucher::{VoucherApplication, VoucherRepository};
