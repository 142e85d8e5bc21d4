//! # Inbound Reconciler
//!
//! Pulls stock changes made directly in Tally back into the marketplace.
//!
//! ## Two Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Inbound Reconciliation                               │
//! │                                                                         │
//! │  INCREMENTAL (every 10 min)                                            │
//! │  ──────────────────────────                                            │
//! │  • Export vouchers with ALTERID > cursor                               │
//! │  • Skip vouchers carrying the marketplace reference prefix             │
//! │  • Apply each through the voucher ledger (difference-based)            │
//! │  • Advance cursor over the applied prefix only                         │
//! │  • Stock changed? → closing-balance pass right away                    │
//! │                                                                         │
//! │  ABSOLUTE (nightly 02:00)                                              │
//! │  ────────────────────────                                              │
//! │  • Export every stock item's closing balance                           │
//! │  • stock = closing − unsynced order qty + unsynced bill qty            │
//! │  • Corrects drift the incremental path cannot see (deleted vouchers)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cursor Rule
//! The cursor only moves forward and never past a voucher that failed to
//! apply. Re-fetching an already-applied voucher is harmless: the ledger
//! diff is zero.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ironmart_core::{ClosingBalanceReport, StockItemRef, StockTarget, VoucherPullReport};
use ironmart_db::Database;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::tally::{TallyGateway, TallyVoucher};

// =============================================================================
// Stock Item Index
// =============================================================================

/// Resolves Tally stock item names to marketplace stock counters.
///
/// Matching is case-insensitive. An explicit `tally_item_name` wins over a
/// SKU, which wins over the display name.
#[derive(Debug, Default)]
pub struct StockItemIndex {
    by_tally_name: HashMap<String, StockTarget>,
    by_sku: HashMap<String, StockTarget>,
    by_name: HashMap<String, StockTarget>,
}

impl StockItemIndex {
    pub fn new(items: &[StockItemRef]) -> Self {
        let mut index = StockItemIndex::default();
        for item in items {
            let target = item.target();
            if let Some(name) = &item.tally_item_name {
                index.by_tally_name.entry(normalize(name)).or_insert_with(|| target.clone());
            }
            if let Some(sku) = &item.sku {
                index.by_sku.entry(normalize(sku)).or_insert_with(|| target.clone());
            }
            index.by_name.entry(normalize(&item.name)).or_insert(target);
        }
        index
    }

    pub async fn load(db: &Database) -> SyncResult<Self> {
        Ok(Self::new(&db.products().stock_items().await?))
    }

    pub fn resolve(&self, stock_item: &str) -> Option<&StockTarget> {
        let key = normalize(stock_item);
        self.by_tally_name
            .get(&key)
            .or_else(|| self.by_sku.get(&key))
            .or_else(|| self.by_name.get(&key))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct InboundReconciler {
    db: Arc<Database>,
    gateway: Arc<dyn TallyGateway>,
    reference_prefix: String,
    request_timeout: Duration,
    pull_lock: Mutex<()>,
    reset_lock: Mutex<()>,
}

impl InboundReconciler {
    pub fn new(db: Arc<Database>, gateway: Arc<dyn TallyGateway>, config: &SyncConfig) -> Self {
        InboundReconciler {
            db,
            gateway,
            reference_prefix: config.tally.reference_prefix.clone(),
            request_timeout: config.tally.request_timeout(),
            pull_lock: Mutex::new(()),
            reset_lock: Mutex::new(()),
        }
    }

    /// Applies vouchers created or altered in Tally since the cursor.
    pub async fn fetch_modified_vouchers(&self) -> SyncResult<VoucherPullReport> {
        let (mut report, stock_changed) = {
            let _guard = self.pull_lock.lock().await;
            self.pull_vouchers().await?
        };

        if stock_changed {
            match self.reset_lock.try_lock() {
                Ok(_guard) => match self.reconcile_closing_balances().await {
                    Ok(reset) => report.full_reset = Some(reset),
                    Err(e) => {
                        warn!(error = %e, "Closing-balance pass after voucher pull failed");
                        report.errors.push(format!("closing balances: {}", e));
                    }
                },
                Err(_) => debug!("Closing-balance pass already running, not triggering another"),
            }
        }

        Ok(report)
    }

    /// Pulls and applies one batch. Also returns whether any voucher moved
    /// marketplace stock.
    async fn pull_vouchers(&self) -> SyncResult<(VoucherPullReport, bool)> {
        let vouchers = self.db.vouchers();
        let cursor = vouchers.cursor().await?;
        let since = cursor.last_alter_id;

        let mut batch: Vec<TallyVoucher> =
            tokio::time::timeout(self.request_timeout, self.gateway.export_vouchers_since(since))
                .await
                .map_err(|_| SyncError::Timeout(self.request_timeout.as_secs()))??;
        batch.retain(|v| v.alter_id > since);
        batch.sort_by_key(|v| v.alter_id);

        let mut report = VoucherPullReport {
            fetched: batch.len() as i64,
            ..Default::default()
        };
        if batch.is_empty() {
            debug!(alter_id = since, "No new Tally vouchers");
            return Ok((report, false));
        }

        let index = StockItemIndex::load(&self.db).await?;
        let mut high_water = since;
        let mut stock_changed = false;

        for voucher in &batch {
            if voucher.is_marketplace_voucher(&self.reference_prefix) {
                debug!(guid = %voucher.guid, alter_id = voucher.alter_id, "Skipping marketplace voucher");
                report.skipped += 1;
                high_water = voucher.alter_id;
                continue;
            }

            let lines = self.map_lines(voucher, &index);
            match vouchers.apply_voucher(&voucher.guid, voucher.alter_id, &lines).await {
                Ok(applied) => {
                    report.applied += 1;
                    stock_changed |= applied.changed_stock();
                    high_water = voucher.alter_id;
                }
                Err(e) => {
                    warn!(
                        guid = %voucher.guid,
                        alter_id = voucher.alter_id,
                        error = %e,
                        "Voucher could not be applied, holding cursor"
                    );
                    report.errors.push(format!(
                        "voucher {} (AlterID {}): {}",
                        voucher.guid, voucher.alter_id, e
                    ));
                    break;
                }
            }
        }

        if high_water > since {
            vouchers.advance_cursor(high_water, Utc::now()).await?;
        }

        info!(
            fetched = report.fetched,
            applied = report.applied,
            skipped = report.skipped,
            errors = report.errors.len(),
            from_alter_id = since,
            to_alter_id = high_water,
            stock_changed,
            "Voucher pull finished"
        );
        Ok((report, stock_changed))
    }

    /// Signed quantities per stock counter. Cancelled vouchers map to no
    /// lines, which reverses whatever was applied for them before.
    fn map_lines(&self, voucher: &TallyVoucher, index: &StockItemIndex) -> Vec<(StockTarget, i64)> {
        if voucher.cancelled {
            return Vec::new();
        }

        voucher
            .lines
            .iter()
            .filter_map(|line| match index.resolve(&line.stock_item) {
                Some(target) => Some((target.clone(), line.quantity)),
                None => {
                    warn!(
                        guid = %voucher.guid,
                        stock_item = %line.stock_item,
                        "Tally stock item has no marketplace product"
                    );
                    None
                }
            })
            .collect()
    }

    /// Overwrites marketplace stock with Tally's closing balances.
    pub async fn fetch_closing_balances(&self) -> SyncResult<ClosingBalanceReport> {
        let _guard = self.reset_lock.lock().await;
        self.reconcile_closing_balances().await
    }

    async fn reconcile_closing_balances(&self) -> SyncResult<ClosingBalanceReport> {
        let balances =
            tokio::time::timeout(self.request_timeout, self.gateway.export_closing_balances())
                .await
                .map_err(|_| SyncError::Timeout(self.request_timeout.as_secs()))??;

        let index = StockItemIndex::load(&self.db).await?;
        let in_transit = self.in_transit_quantities().await?;

        let products = self.db.products();
        let mut report = ClosingBalanceReport::default();

        for balance in &balances {
            report.items_fetched += 1;

            let Some(target) = index.resolve(&balance.stock_item) else {
                debug!(stock_item = %balance.stock_item, "Unmatched Tally stock item");
                report.unmatched += 1;
                continue;
            };

            let pending = in_transit.get(&target.key()).copied().unwrap_or(0);
            let stock = balance.quantity + pending;
            if products.set_stock(target, stock).await? {
                debug!(
                    stock_key = %target.key(),
                    closing = balance.quantity,
                    pending,
                    stock,
                    "Stock reset from Tally"
                );
                report.products_updated += 1;
            }
        }

        self.db.vouchers().mark_full_reset(Utc::now()).await?;

        info!(
            items_fetched = report.items_fetched,
            products_updated = report.products_updated,
            unmatched = report.unmatched,
            "Closing-balance reconciliation finished"
        );
        Ok(report)
    }

    /// Net stock movement the marketplace has recorded but Tally has not:
    /// unsynced bills count in, unsynced orders count out.
    async fn in_transit_quantities(&self) -> SyncResult<HashMap<String, i64>> {
        let mut net: HashMap<String, i64> = HashMap::new();
        for (target, qty) in self.db.orders().unsynced_quantities().await? {
            *net.entry(target.key()).or_default() -= qty;
        }
        for (target, qty) in self.db.stock_entries().unsynced_quantities().await? {
            *net.entry(target.key()).or_default() += qty;
        }
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product: &str, variation: Option<&str>, name: &str, sku: Option<&str>, tally: Option<&str>) -> StockItemRef {
        StockItemRef {
            product_id: product.into(),
            variation_id: variation.map(String::from),
            name: name.into(),
            sku: sku.map(String::from),
            tally_item_name: tally.map(String::from),
            stock: 0,
        }
    }

    #[test]
    fn test_index_matches_case_insensitively() {
        let index = StockItemIndex::new(&[item("p1", None, "Hex Bolt M8", Some("HB-M8"), None)]);

        assert_eq!(index.resolve("hb-m8"), Some(&StockTarget::new("p1", None)));
        assert_eq!(index.resolve("  HEX BOLT m8 "), Some(&StockTarget::new("p1", None)));
        assert_eq!(index.resolve("Hex Nut M8"), None);
    }

    #[test]
    fn test_index_prefers_tally_name_over_sku_and_name() {
        let index = StockItemIndex::new(&[
            item("p1", None, "Anchor Bolt", Some("AB-10"), None),
            item("p2", None, "Wedge Anchor", None, Some("Anchor Bolt")),
            item("p3", Some("v3"), "Chain 6mm", Some("AB-10-X"), Some("ab-10")),
        ]);

        assert_eq!(index.resolve("Anchor Bolt"), Some(&StockTarget::new("p2", None)));
        assert_eq!(index.resolve("AB-10"), Some(&StockTarget::new("p3", Some("v3"))));
        assert_eq!(index.resolve("Wedge Anchor"), Some(&StockTarget::new("p2", None)));
    }
}
