//! # Stock Entry Repository
//!
//! Supplier bills recorded when goods arrive. Each one becomes a Purchase
//! voucher in Tally.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::product::adjust_stock_on;
use ironmart_core::{StockEntry, StockEntryItem, StockTarget};

#[derive(Debug, Clone)]
pub struct NewStockEntry {
    pub bill_number: String,
    pub supplier_name: String,
    pub bill_date: DateTime<Utc>,
    pub items: Vec<NewStockEntryItem>,
}

#[derive(Debug, Clone)]
pub struct NewStockEntryItem {
    pub product_id: String,
    pub variation_id: Option<String>,
    pub quantity: i64,
    pub unit_cost_paise: i64,
}

#[derive(Debug, Clone)]
pub struct StockEntryRepository {
    pool: SqlitePool,
}

impl StockEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockEntryRepository { pool }
    }

    /// Records a bill and adds its quantities to stock in one transaction.
    pub async fn insert(&self, entry: &NewStockEntry) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stock_entries (id, bill_number, supplier_name, bill_date, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(&entry.bill_number)
        .bind(&entry.supplier_name)
        .bind(entry.bill_date)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for item in &entry.items {
            sqlx::query(
                r#"
                INSERT INTO stock_entry_items
                    (id, stock_entry_id, product_id, variation_id, quantity, unit_cost_paise)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(&item.product_id)
            .bind(&item.variation_id)
            .bind(item.quantity)
            .bind(item.unit_cost_paise)
            .execute(&mut *tx)
            .await?;

            let target = StockTarget::new(&item.product_id, item.variation_id.as_deref());
            adjust_stock_on(&mut tx, &target, item.quantity, now).await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<StockEntry>> {
        let entry = sqlx::query_as::<_, StockEntry>(
            "SELECT id, bill_number, supplier_name, bill_date, created_at FROM stock_entries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn items(&self, stock_entry_id: &str) -> DbResult<Vec<StockEntryItem>> {
        let items = sqlx::query_as::<_, StockEntryItem>(
            r#"
            SELECT id, stock_entry_id, product_id, variation_id, quantity, unit_cost_paise
            FROM stock_entry_items WHERE stock_entry_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(stock_entry_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Quantities received on bills that Tally has not seen yet.
    ///
    /// Marketplace stock already includes them but Tally's closing balance
    /// does not, so the nightly reset adds them back.
    pub async fn unsynced_quantities(&self) -> DbResult<Vec<(StockTarget, i64)>> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT si.product_id, si.variation_id, SUM(si.quantity)
            FROM stock_entry_items si
            WHERE NOT EXISTS (
                SELECT 1 FROM sync_tasks t
                WHERE t.entity_type = 'stock_entry'
                  AND t.entity_id = si.stock_entry_id
                  AND t.status = 'synced'
            )
            GROUP BY si.product_id, si.variation_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, variation_id, qty)| {
                (StockTarget::new(&product_id, variation_id.as_deref()), qty)
            })
            .collect())
    }
}
