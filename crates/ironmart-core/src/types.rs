//! # Domain Types
//!
//! Types shared by the sync engine, the database layer and the admin API.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Sync engine (owned)              Marketplace (consumed)                │
//! │  ┌─────────────────┐              ┌─────────────────┐                   │
//! │  │    SyncTask     │──entity_id──►│  Order          │                   │
//! │  │  status/attempts│              │  StockEntry     │                   │
//! │  └─────────────────┘              └─────────────────┘                   │
//! │  ┌─────────────────┐              ┌─────────────────┐                   │
//! │  │ HealthSnapshot  │              │  StockItemRef   │◄─tally_item_name  │
//! │  │ VoucherCursor   │              │ (product/var.)  │                   │
//! │  └─────────────────┘              └─────────────────┘                   │
//! │                                                                         │
//! │  Reports: DrainReport, VoucherPullReport, ClosingBalanceReport,         │
//! │           CleanupReport, QueueStats                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every type that reaches the admin UI derives `TS` and serializes in
//! camelCase.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Sync Entity Type
// =============================================================================

/// The kind of marketplace record a sync task pushes to Tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntityType {
    /// A customer order, pushed as a Sales voucher.
    Order,
    /// A supplier bill, pushed as a Purchase voucher.
    StockEntry,
}

impl SyncEntityType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncEntityType::Order => "order",
            SyncEntityType::StockEntry => "stock_entry",
        }
    }

    /// Tally voucher type this entity is imported as.
    pub const fn voucher_type(&self) -> &'static str {
        match self {
            SyncEntityType::Order => "Sales",
            SyncEntityType::StockEntry => "Purchase",
        }
    }

    /// Short code used inside voucher references.
    pub const fn reference_code(&self) -> &'static str {
        match self {
            SyncEntityType::Order => "ORD",
            SyncEntityType::StockEntry => "STK",
        }
    }

    /// Builds the reference Tally stores in `REMOTEID` and `REFERENCE`.
    ///
    /// ```rust,ignore
    /// use ironmart_core::SyncEntityType;
    ///
    /// assert_eq!(SyncEntityType::Order.voucher_reference("IM", "42"), "IM-ORD-42");
    /// ```
    pub fn voucher_reference(&self, prefix: &str, entity_id: &str) -> String {
        format!("{}-{}-{}", prefix, self.reference_code(), entity_id)
    }
}

impl fmt::Display for SyncEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncEntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(SyncEntityType::Order),
            "stock_entry" => Ok(SyncEntityType::StockEntry),
            other => Err(CoreError::UnknownEntityType(other.to_string())),
        }
    }
}

// =============================================================================
// Sync Task Status
// =============================================================================

/// Lifecycle of an outbound sync task.
///
/// ```text
///   pending ──claim──► queued ──ok──► synced
///      ▲                  │
///      │ lease expired    └─err──► failed ──claim──► queued ...
///      └──────────────────────────── │
///                                    └─ attempts ≥ cap ──► stuck
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskStatus {
    Pending,
    Queued,
    Synced,
    Failed,
    Stuck,
}

impl SyncTaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncTaskStatus::Pending => "pending",
            SyncTaskStatus::Queued => "queued",
            SyncTaskStatus::Synced => "synced",
            SyncTaskStatus::Failed => "failed",
            SyncTaskStatus::Stuck => "stuck",
        }
    }

    /// Statuses an automatic drain may claim.
    pub const fn is_drainable(&self) -> bool {
        matches!(self, SyncTaskStatus::Pending | SyncTaskStatus::Failed)
    }
}

impl Default for SyncTaskStatus {
    fn default() -> Self {
        SyncTaskStatus::Pending
    }
}

impl fmt::Display for SyncTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncTaskStatus::Pending),
            "queued" => Ok(SyncTaskStatus::Queued),
            "synced" => Ok(SyncTaskStatus::Synced),
            "failed" => Ok(SyncTaskStatus::Failed),
            "stuck" => Ok(SyncTaskStatus::Stuck),
            other => Err(CoreError::UnknownTaskStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Sync Task
// =============================================================================

/// One unit of outbound work: push one marketplace entity to Tally.
///
/// `(entity_type, entity_id)` is unique, so enqueueing the same entity twice
/// never creates two tasks.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncTask {
    pub id: String,
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub status: SyncTaskStatus,
    /// Failed submission attempts so far.
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub synced_at: Option<DateTime<Utc>>,
    /// Tally's `LASTVCHID` once the voucher was imported.
    pub tally_voucher_id: Option<String>,
}

impl SyncTask {
    /// Whether the retry cap has been reached.
    #[inline]
    pub fn attempts_exhausted(&self, max_attempts: i64) -> bool {
        self.attempts >= max_attempts
    }
}

/// Result of an idempotent enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A fresh pending task was inserted.
    Created,
    /// A task already exists and has not synced yet.
    AlreadyPending,
    /// The entity is already in Tally; nothing to do.
    AlreadySynced,
}

/// Result of a manual single-entity push.
///
/// Tally being offline is an expected outcome here, not an error: the task is
/// left pending and the hourly drain picks it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOneOutcome {
    Synced {
        #[serde(rename = "tallyVoucherId")]
        tally_voucher_id: Option<String>,
    },
    AlreadySynced,
    #[serde(rename = "queued")]
    QueuedOffline,
    InFlight,
    Failed {
        error: String,
    },
}

/// Counts of one outbound drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub processed: i64,
    pub success: i64,
    pub failed: i64,
    /// The drain stopped because Tally became unreachable.
    pub stopped_early: bool,
}

/// Task counts per status for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: i64,
    pub queued: i64,
    pub synced: i64,
    pub failed: i64,
    pub stuck: i64,
}

// =============================================================================
// Health
// =============================================================================

/// Outcome of one connectivity probe. Never an error: every failure mode is
/// captured as `online = false` plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    pub online: bool,
    pub response_time_ms: i64,
    pub error: Option<String>,
}

impl HealthResult {
    pub fn online(response_time_ms: i64) -> Self {
        Self {
            online: true,
            response_time_ms,
            error: None,
        }
    }

    pub fn offline(response_time_ms: i64, error: impl Into<String>) -> Self {
        Self {
            online: false,
            response_time_ms,
            error: Some(error.into()),
        }
    }
}

/// What started a health-check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

/// One row of the audit history the admin UI shows.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub id: String,
    #[ts(as = "String")]
    pub checked_at: DateTime<Utc>,
    pub online: bool,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
    pub queue_processed: i64,
    pub queue_success: i64,
    pub queue_failed: i64,
    // `trigger` is an SQL keyword
    #[cfg_attr(feature = "sqlx", sqlx(rename = "run_trigger"))]
    pub trigger: RunTrigger,
}

impl HealthSnapshot {
    /// Combines a probe result and the drain that followed it.
    pub fn new(
        id: String,
        checked_at: DateTime<Utc>,
        health: &HealthResult,
        drain: &DrainReport,
        trigger: RunTrigger,
    ) -> Self {
        Self {
            id,
            checked_at,
            online: health.online,
            response_time_ms: health.response_time_ms,
            error_message: health.error.clone(),
            queue_processed: drain.processed,
            queue_success: drain.success,
            queue_failed: drain.failed,
            trigger,
        }
    }
}

// =============================================================================
// Inbound Reconciliation
// =============================================================================

/// Progress marker for the incremental voucher pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct VoucherCursor {
    /// Highest Tally AlterID whose voucher has been fully applied.
    pub last_alter_id: i64,
    #[ts(as = "Option<String>")]
    pub last_synced_voucher_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub last_full_reset_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Counts of one closing-balance reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ClosingBalanceReport {
    pub items_fetched: i64,
    /// Products and variations whose stock actually changed.
    pub products_updated: i64,
    /// Tally stock items with no marketplace counterpart.
    pub unmatched: i64,
}

/// Counts of one incremental voucher pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct VoucherPullReport {
    pub fetched: i64,
    pub applied: i64,
    /// Vouchers the marketplace itself created.
    pub skipped: i64,
    pub errors: Vec<String>,
    /// Present when stock changed and the closing-balance pass ran after.
    pub full_reset: Option<ClosingBalanceReport>,
}

/// Which stock counter an adjustment targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockTarget {
    Product {
        product_id: String,
    },
    Variation {
        product_id: String,
        variation_id: String,
    },
}

impl StockTarget {
    pub fn new(product_id: &str, variation_id: Option<&str>) -> Self {
        match variation_id {
            Some(v) => StockTarget::Variation {
                product_id: product_id.to_string(),
                variation_id: v.to_string(),
            },
            None => StockTarget::Product {
                product_id: product_id.to_string(),
            },
        }
    }

    /// Stable key used by the voucher ledger.
    pub fn key(&self) -> String {
        match self {
            StockTarget::Product { product_id } => format!("p:{}", product_id),
            StockTarget::Variation { variation_id, .. } => format!("v:{}", variation_id),
        }
    }
}

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// A Tally voucher was created or modified.
    VoucherDelta,
    /// Units held by an abandoned order went back on the shelf.
    AbandonedOrderRelease,
}

/// A signed change to one stock counter. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub target: StockTarget,
    pub delta: i64,
    pub reason: AdjustmentReason,
}

// =============================================================================
// Marketplace Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Prepaid through the payment gateway.
    Online,
    /// Cash on delivery.
    Cod,
}

/// A marketplace order as the sync engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub total_paise: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_paise(self.total_paise)
    }

    /// An online order whose payment never completed within `timeout`.
    ///
    /// COD orders are never abandoned: payment is collected on delivery.
    pub fn is_abandoned(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.payment_method == PaymentMethod::Online
            && self.payment_status == PaymentStatus::Pending
            && self.status != OrderStatus::Cancelled
            && self.created_at < now - timeout
    }
}

/// One line of an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variation_id: Option<String>,
    /// Product name frozen at time of purchase.
    pub name: String,
    pub quantity: i64,
    pub unit_price_paise: i64,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_paise(self.unit_price_paise)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price() * self.quantity
    }

    pub fn stock_target(&self) -> StockTarget {
        StockTarget::new(&self.product_id, self.variation_id.as_deref())
    }
}

// =============================================================================
// Marketplace Stock Entries
// =============================================================================

/// A supplier bill recorded by the admin when goods arrive.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    pub id: String,
    pub bill_number: String,
    pub supplier_name: String,
    #[ts(as = "String")]
    pub bill_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockEntryItem {
    pub id: String,
    pub stock_entry_id: String,
    pub product_id: String,
    pub variation_id: Option<String>,
    pub quantity: i64,
    pub unit_cost_paise: i64,
}

impl StockEntryItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_paise(self.unit_cost_paise) * self.quantity
    }
}

/// A product or variation as addressed from Tally.
///
/// Tally knows stock items by name; the marketplace stores that name in
/// `tally_item_name` and falls back to the SKU when it is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockItemRef {
    pub product_id: String,
    pub variation_id: Option<String>,
    pub name: String,
    pub sku: Option<String>,
    pub tally_item_name: Option<String>,
    pub stock: i64,
}

impl StockItemRef {
    pub fn target(&self) -> StockTarget {
        StockTarget::new(&self.product_id, self.variation_id.as_deref())
    }

    /// Name used for the stock item on vouchers sent to Tally.
    pub fn tally_name(&self) -> &str {
        self.tally_item_name
            .as_deref()
            .or(self.sku.as_deref())
            .unwrap_or(&self.name)
    }
}

// =============================================================================
// Runtime Settings & Reports
// =============================================================================

/// Settings read from the database at the start of every job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    pub tally_sync_enabled: bool,
}

/// Counts of one abandoned-order cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub examined: i64,
    pub cancelled: i64,
    /// Units returned to stock across all cancelled orders.
    pub units_restored: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
