//! # ironmart-core: Pure Domain Logic for the Tally Sync Engine
//!
//! This crate holds the domain model shared by the database layer, the sync
//! engine and the admin API. Everything here is a pure type or a pure
//! function.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     IronMart Tally Sync Architecture                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Admin UI (external, reads snapshots/tasks)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP (sync-daemon)                     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         ironmart-sync (probe, queue, reconciler, jobs)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ironmart-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ schedule  │  │ validation│  │   │
//! │  │   │ SyncTask  │  │   Money   │  │  Cadence  │  │   rules   │  │   │
//! │  │   │ Snapshot  │  │  (paise)  │  │  JobKind  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ironmart-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (SyncTask, HealthSnapshot, Order, ...)
//! - [`money`] - Money type with integer paise arithmetic
//! - [`schedule`] - Job kinds and cadence arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use ironmart_core::money::Money;
//!
//! let price = Money::from_paise(123_450);
//! assert_eq!(price.to_tally_amount(), "1234.50");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod schedule;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use schedule::{Cadence, JobKind};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Actor recorded on order history rows written by background jobs.
pub const SYSTEM_ACTOR: &str = "system";

/// Default number of failed attempts after which a task is marked stuck.
///
/// ## Why a cap?
/// A task that keeps failing is almost always bad data (unknown stock item,
/// ledger mismatch). Retrying it every hour forever hides the problem; after
/// the cap it stops retrying and shows up as `stuck` for an operator.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 10;

/// Default minutes before an unpaid online order is considered abandoned.
pub const DEFAULT_ABANDONED_ORDER_TIMEOUT_MINS: i64 = 60;
