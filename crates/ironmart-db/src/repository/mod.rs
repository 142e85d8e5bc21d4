//! # Repository Module
//!
//! Each repository owns the SQL for one table family and hands out domain
//! types from ironmart-core.
//!
//! ```text
//! db.sync_tasks().enqueue(Order, "ord-1")
//!        │
//!        ▼
//! SyncTaskRepository ──SQL──► sync_tasks
//! ```
//!
//! ## Available Repositories
//!
//! Marketplace (consumed):
//! - [`product::ProductRepository`] - Stock counters, Tally item mapping
//! - [`order::OrderRepository`] - Orders, abandoned-order cancellation
//! - [`stock_entry::StockEntryRepository`] - Supplier bills
//! - [`settings::SettingsRepository`] - Runtime flags
//!
//! Sync engine (owned):
//! - [`sync::SyncTaskRepository`] - Outbound queue
//! - [`health_log::HealthLogRepository`] - Audit history
//! - [`voucher::VoucherRepository`] - Inbound cursor and ledger

pub mod health_log;
pub mod order;
pub mod product;
pub mod settings;
pub mod stock_entry;
pub mod sync;
pub mod voucher;
