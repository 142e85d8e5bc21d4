//! # Tally Gateway
//!
//! Everything the engine needs from Tally Prime, behind one trait.
//!
//! ## Wire Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Tally HTTP+XML Interface                           │
//! │                                                                         │
//! │  ping                    GET  /        → "TallyPrime Server is Running" │
//! │  import_voucher          POST / Import Data   → <RESPONSE>CREATED..     │
//! │  export_vouchers_since   POST / Export Collection (ALTERID > n)         │
//! │  export_closing_balances POST / Export Collection (StockItem)           │
//! │                                                                         │
//! │  Plain HTTP on the store LAN, no TLS, no auth.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Engine code only sees [`TallyGateway`]; tests swap in a scripted fake.

pub mod client;
pub mod xml;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ironmart_core::{Money, SyncEntityType};

use crate::error::SyncResult;

pub use client::HttpTallyGateway;

// =============================================================================
// Outbound Vouchers
// =============================================================================

/// A marketplace document framed as a Tally voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundVoucher {
    pub entity_type: SyncEntityType,
    /// `REMOTEID` and `REFERENCE`, e.g. `IM-ORD-42`.
    pub remote_id: String,
    pub date: NaiveDate,
    pub voucher_number: String,
    pub party_ledger: String,
    /// Sales or purchase ledger the inventory amounts post to.
    pub ledger: String,
    pub narration: String,
    pub lines: Vec<OutboundLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLine {
    pub stock_item: String,
    pub quantity: i64,
    pub rate: Money,
}

impl OutboundLine {
    pub fn amount(&self) -> Money {
        self.rate * self.quantity
    }
}

impl OutboundVoucher {
    pub fn voucher_type(&self) -> &'static str {
        self.entity_type.voucher_type()
    }

    /// Purchases bring stock in, sales take it out.
    pub fn is_inward(&self) -> bool {
        self.entity_type == SyncEntityType::StockEntry
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(OutboundLine::amount).sum()
    }
}

/// What Tally reported after an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub created: i64,
    pub altered: i64,
    /// Tally's master id of the voucher (`LASTVCHID`).
    pub voucher_id: Option<String>,
}

// =============================================================================
// Inbound Data
// =============================================================================

/// A voucher exported from Tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyVoucher {
    pub guid: String,
    pub alter_id: i64,
    pub voucher_type: String,
    pub voucher_number: Option<String>,
    pub reference: Option<String>,
    pub remote_id: Option<String>,
    pub cancelled: bool,
    pub lines: Vec<InventoryLine>,
}

impl TallyVoucher {
    /// True for vouchers the marketplace pushed itself; their stock effect
    /// is already in marketplace stock.
    pub fn is_marketplace_voucher(&self, reference_prefix: &str) -> bool {
        let marker = format!("{}-", reference_prefix);
        [self.reference.as_deref(), self.remote_id.as_deref()]
            .into_iter()
            .flatten()
            .any(|r| r.starts_with(&marker))
    }
}

/// One inventory line; `quantity` is positive for inward movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLine {
    pub stock_item: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingBalance {
    pub stock_item: String,
    pub quantity: i64,
}

// =============================================================================
// Gateway Trait
// =============================================================================

#[async_trait]
pub trait TallyGateway: Send + Sync {
    /// Succeeds only when a running Tally server answered.
    async fn ping(&self) -> SyncResult<()>;

    /// Imports (or, for a known REMOTEID, alters) one voucher.
    async fn import_voucher(&self, voucher: &OutboundVoucher) -> SyncResult<ImportOutcome>;

    /// Vouchers whose AlterID is greater than `alter_id`.
    async fn export_vouchers_since(&self, alter_id: i64) -> SyncResult<Vec<TallyVoucher>>;

    async fn export_closing_balances(&self) -> SyncResult<Vec<ClosingBalance>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voucher(reference: Option<&str>, remote_id: Option<&str>) -> TallyVoucher {
        TallyVoucher {
            guid: "g-1".into(),
            alter_id: 1,
            voucher_type: "Sales".into(),
            voucher_number: None,
            reference: reference.map(String::from),
            remote_id: remote_id.map(String::from),
            cancelled: false,
            lines: vec![],
        }
    }

    #[test]
    fn test_marketplace_voucher_detection() {
        assert!(voucher(Some("IM-ORD-42"), None).is_marketplace_voucher("IM"));
        assert!(voucher(None, Some("IM-STK-7")).is_marketplace_voucher("IM"));
        assert!(!voucher(Some("IMPORT-99"), None).is_marketplace_voucher("IM"));
        assert!(!voucher(None, None).is_marketplace_voucher("IM"));
    }

    #[test]
    fn test_outbound_totals() {
        let v = OutboundVoucher {
            entity_type: SyncEntityType::Order,
            remote_id: "IM-ORD-1".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            voucher_number: "ORD-1001".into(),
            party_ledger: "Marketplace Customers".into(),
            ledger: "Sales".into(),
            narration: String::new(),
            lines: vec![
                OutboundLine { stock_item: "Hex Bolt M8".into(), quantity: 10, rate: Money::from_paise(1_250) },
                OutboundLine { stock_item: "Hex Nut M8".into(), quantity: 4, rate: Money::from_paise(500) },
            ],
        };
        assert_eq!(v.total(), Money::from_paise(14_500));
        assert_eq!(v.voucher_type(), "Sales");
        assert!(!v.is_inward());
    }
}
