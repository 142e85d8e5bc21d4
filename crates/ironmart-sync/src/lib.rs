//! # ironmart-sync: Tally Sync Engine for IronMart
//!
//! Keeps the IronMart marketplace and the store's on-premises Tally Prime
//! server in step. Tally is only reachable on the store LAN and is often
//! switched off, so every path here tolerates it being gone.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Tally Sync Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   TallySyncEngine (facade)                       │  │
//! │  │                                                                  │  │
//! │  │  Built once by the daemon, shared with the admin API            │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ OutboundQueue  │  │   Scheduler    │  │  InboundReconciler     │    │
//! │  │                │  │                │  │                        │    │
//! │  │ sync_tasks →   │  │ 4 jobs, one    │  │ AlterID voucher pull   │    │
//! │  │ Sales/Purchase │  │ tokio task per │  │ + nightly closing      │    │
//! │  │ vouchers       │  │ job            │  │ balance reset          │    │
//! │  └───────┬────────┘  └────────────────┘  └───────────┬────────────┘    │
//! │          │                                           │                  │
//! │          └──────────────┐         ┌──────────────────┘                  │
//! │                         ▼         ▼                                     │
//! │                  ┌─────────────────────────┐   ┌───────────────────┐   │
//! │                  │  TallyGateway           │   │ ConnectivityProbe │   │
//! │                  │  (HTTP + XML, reqwest)  │◄──│ AuditLog          │   │
//! │                  └─────────────────────────┘   └───────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML + env configuration
//! - [`error`] - Sync error types
//! - [`tally`] - Gateway trait, HTTP client, XML envelopes
//! - [`probe`] - Tally online check
//! - [`outbound`] - Marketplace → Tally voucher queue
//! - [`inbound`] - Tally → marketplace stock reconciliation
//! - [`audit`] - Health-check history
//! - [`jobs`] - The four background jobs
//! - [`scheduler`] - Cadence loop and single-flight runs
//! - [`engine`] - Facade used by the daemon
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ironmart_sync::{SyncConfig, TallySyncEngine};
//!
//! let config = SyncConfig::load(None)?;
//! let engine = TallySyncEngine::connect(config, db)?;
//! let scheduler = engine.scheduler().start();
//!
//! let status = engine.status().await?;
//! println!("Pending: {}", status.queue.pending);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod inbound;
pub mod jobs;
pub mod outbound;
pub mod probe;
pub mod scheduler;
pub mod tally;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::AuditLog;
pub use config::SyncConfig;
pub use engine::{TallyStatus, TallySyncEngine};
pub use error::{SyncError, SyncResult};
pub use inbound::{InboundReconciler, StockItemIndex};
pub use jobs::{JobContext, JobHandler, JobOutput, JobRunOutcome};
pub use outbound::OutboundQueue;
pub use probe::ConnectivityProbe;
pub use scheduler::{JobDefinition, Scheduler, SchedulerHandle};
pub use tally::{HttpTallyGateway, TallyGateway};
