//! # Voucher Repository
//!
//! State of the inbound reconciler: the AlterID cursor and the per-voucher
//! ledger of quantities already applied to marketplace stock.
//!
//! ## Replay-Safe Application
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Voucher G, line "Hex Bolt M8"                                         │
//! │                                                                         │
//! │  pull 1: qty +50   ledger(G, bolt) = none  → stock += 50, ledger = 50  │
//! │  pull 2: qty +50   ledger(G, bolt) = 50    → stock += 0   (replay)     │
//! │  edit:   qty +40   ledger(G, bolt) = 50    → stock -= 10, ledger = 40  │
//! │  line removed      ledger(G, bolt) = 40    → stock -= 40, ledger = 0   │
//! │                                                                         │
//! │  Stock change and ledger update commit in one transaction.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::product::adjust_stock_on;
use ironmart_core::{StockTarget, VoucherCursor};

/// What applying one voucher did to marketplace stock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoucherApplication {
    /// Stock counters whose value moved.
    pub counters_changed: i64,
    /// Sum of absolute quantity changes.
    pub units_changed: i64,
}

impl VoucherApplication {
    pub fn changed_stock(&self) -> bool {
        self.counters_changed > 0
    }
}

#[derive(Debug, Clone)]
pub struct VoucherRepository {
    pool: SqlitePool,
}

impl VoucherRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VoucherRepository { pool }
    }

    pub async fn cursor(&self) -> DbResult<VoucherCursor> {
        let cursor = sqlx::query_as::<_, VoucherCursor>(
            r#"
            SELECT last_alter_id, last_synced_voucher_at, last_full_reset_at, updated_at
            FROM voucher_cursor WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(cursor)
    }

    /// Moves the cursor forward to `alter_id`. Never moves it backward.
    pub async fn advance_cursor(&self, alter_id: i64, synced_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE voucher_cursor SET
                last_alter_id = MAX(last_alter_id, ?1),
                last_synced_voucher_at = ?2,
                updated_at = ?2
            WHERE id = 1
            "#,
        )
        .bind(alter_id)
        .bind(synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stamps the time of the last closing-balance reset.
    pub async fn mark_full_reset(&self, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            "UPDATE voucher_cursor SET last_full_reset_at = ?1, updated_at = ?1 WHERE id = 1",
        )
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Applies one voucher's inventory lines to stock, difference-based.
    ///
    /// `lines` carries signed quantities (inward positive). Lines for the
    /// same target are summed. Targets recorded for this voucher earlier but
    /// absent now are reversed.
    pub async fn apply_voucher(
        &self,
        voucher_guid: &str,
        alter_id: i64,
        lines: &[(StockTarget, i64)],
    ) -> DbResult<VoucherApplication> {
        let now = Utc::now();

        let mut wanted: BTreeMap<String, (StockTarget, i64)> = BTreeMap::new();
        for (target, qty) in lines {
            wanted
                .entry(target.key())
                .or_insert_with(|| (target.clone(), 0))
                .1 += qty;
        }

        let mut tx = self.pool.begin().await?;

        let previous: Vec<(String, String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT item_key, product_id, variation_id, applied_qty
            FROM voucher_ledger WHERE voucher_guid = ?1
            "#,
        )
        .bind(voucher_guid)
        .fetch_all(&mut *tx)
        .await?;

        let mut applied: BTreeMap<String, i64> = BTreeMap::new();
        for (key, product_id, variation_id, qty) in previous {
            wanted
                .entry(key.clone())
                .or_insert_with(|| (StockTarget::new(&product_id, variation_id.as_deref()), 0));
            applied.insert(key, qty);
        }

        let mut outcome = VoucherApplication::default();

        for (key, (target, new_qty)) in &wanted {
            let old_qty = applied.get(key).copied().unwrap_or(0);
            let diff = new_qty - old_qty;

            if diff != 0 {
                adjust_stock_on(&mut tx, target, diff, now).await?;
                outcome.counters_changed += 1;
                outcome.units_changed += diff.abs();
            }

            let (product_id, variation_id) = match target {
                StockTarget::Product { product_id } => (product_id.as_str(), None),
                StockTarget::Variation {
                    product_id,
                    variation_id,
                } => (product_id.as_str(), Some(variation_id.as_str())),
            };

            sqlx::query(
                r#"
                INSERT INTO voucher_ledger
                    (voucher_guid, item_key, product_id, variation_id, applied_qty, alter_id, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (voucher_guid, item_key) DO UPDATE SET
                    applied_qty = excluded.applied_qty,
                    alter_id = excluded.alter_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(voucher_guid)
            .bind(key)
            .bind(product_id)
            .bind(variation_id)
            .bind(new_qty)
            .bind(alter_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            voucher_guid,
            alter_id,
            counters_changed = outcome.counters_changed,
            units_changed = outcome.units_changed,
            "Applied voucher"
        );
        Ok(outcome)
    }

    /// Quantity recorded for one voucher line, if any.
    pub async fn applied_quantity(
        &self,
        voucher_guid: &str,
        target: &StockTarget,
    ) -> DbResult<Option<i64>> {
        let qty = sqlx::query_scalar(
            "SELECT applied_qty FROM voucher_ledger WHERE voucher_guid = ?1 AND item_key = ?2",
        )
        .bind(voucher_guid)
        .bind(target.key())
        .fetch_optional(&self.pool)
        .await?;
        Ok(qty)
    }
}
