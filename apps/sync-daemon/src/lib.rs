//! # IronMart Sync Daemon
//!
//! Hosts the Tally sync engine: starts the job scheduler and serves the
//! admin API. The binary in `main.rs` is a thin shell over this library so
//! the router can be exercised in-process.
//!
//! ## Configuration
//! Read through [`ironmart_sync::SyncConfig`]. Environment overrides:
//! - `IRONMART_TALLY_URL` - Tally server address (default: http://localhost:9000)
//! - `IRONMART_TALLY_ENABLED` - Default for the sync flag before one is stored
//! - `IRONMART_DB_PATH` - Marketplace SQLite database
//! - `IRONMART_ADMIN_PORT` - Admin API port (default: 8787)
//! - `IRONMART_TIMEZONE` - Store time zone for the cadence table
//! - `RUST_LOG` - Log filter (default: info,ironmart=debug,sqlx=warn)

pub mod api;
pub mod error;

// Re-exports
pub use api::{router, AppState};
pub use error::{ApiError, ApiResult, ErrorCode};
