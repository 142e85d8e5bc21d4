//! # Product Repository
//!
//! Stock counters of products and their variations.
//!
//! ## Stock Update Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  ❌ Read-modify-write (loses concurrent checkout decrements)        │
//! │     let s = SELECT stock; UPDATE products SET stock = s + 3         │
//! │                                                                     │
//! │  ✅ Atomic delta                                                    │
//! │     UPDATE products SET stock = stock + 3 WHERE id = ?              │
//! │                                                                     │
//! │  The storefront decrements stock on checkout while the sync engine  │
//! │  applies Tally deltas; both must land.                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The only absolute write is [`ProductRepository::set_stock`], used by the
//! nightly closing-balance reset where Tally is authoritative.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use ironmart_core::{StockItemRef, StockTarget};

/// Fields for creating a product.
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub tally_item_name: Option<String>,
    pub stock: i64,
}

/// Fields for creating a variation under an existing product.
#[derive(Debug, Clone, Default)]
pub struct NewVariation {
    pub product_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub tally_item_name: Option<String>,
    pub stock: i64,
}

/// Repository for product and variation stock.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product and returns its generated ID.
    pub async fn insert_product(&self, product: &NewProduct) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, tally_item_name, stock, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.tally_item_name)
        .bind(product.stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Inserts a variation and returns its generated ID.
    pub async fn insert_variation(&self, variation: &NewVariation) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO product_variations
                (id, product_id, name, sku, tally_item_name, stock, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(&variation.product_id)
        .bind(&variation.name)
        .bind(&variation.sku)
        .bind(&variation.tally_item_name)
        .bind(variation.stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Current stock of one counter.
    pub async fn stock(&self, target: &StockTarget) -> DbResult<i64> {
        let stock: Option<i64> = match target {
            StockTarget::Product { product_id } => {
                sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
                    .bind(product_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            StockTarget::Variation { variation_id, .. } => {
                sqlx::query_scalar("SELECT stock FROM product_variations WHERE id = ?1")
                    .bind(variation_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        stock.ok_or_else(|| not_found(target))
    }

    /// Atomically adds `delta` to a stock counter.
    pub async fn adjust_stock(&self, target: &StockTarget, delta: i64) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        adjust_stock_on(&mut conn, target, delta, Utc::now()).await
    }

    /// Overwrites a stock counter. Returns whether the value changed.
    pub async fn set_stock(&self, target: &StockTarget, stock: i64) -> DbResult<bool> {
        let now = Utc::now();

        let result = match target {
            StockTarget::Product { product_id } => {
                sqlx::query(
                    "UPDATE products SET stock = ?2, updated_at = ?3 WHERE id = ?1 AND stock != ?2",
                )
                .bind(product_id)
                .bind(stock)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
            StockTarget::Variation { variation_id, .. } => {
                sqlx::query(
                    "UPDATE product_variations SET stock = ?2, updated_at = ?3 WHERE id = ?1 AND stock != ?2",
                )
                .bind(variation_id)
                .bind(stock)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    /// Every product and variation, as addressable from Tally.
    ///
    /// A product with variations is listed once for itself and once per
    /// variation; each carries its own `tally_item_name`.
    pub async fn stock_items(&self) -> DbResult<Vec<StockItemRef>> {
        let items = sqlx::query_as::<_, StockItemRef>(
            r#"
            SELECT id AS product_id, NULL AS variation_id, name, sku, tally_item_name, stock
            FROM products
            UNION ALL
            SELECT product_id, id AS variation_id, name, sku, tally_item_name, stock
            FROM product_variations
            ORDER BY product_id, variation_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = items.len(), "Loaded stock items");
        Ok(items)
    }

    /// Looks up the stock item reference for a target.
    pub async fn stock_item(&self, target: &StockTarget) -> DbResult<StockItemRef> {
        let item = match target {
            StockTarget::Product { product_id } => {
                sqlx::query_as::<_, StockItemRef>(
                    r#"
                    SELECT id AS product_id, NULL AS variation_id, name, sku, tally_item_name, stock
                    FROM products WHERE id = ?1
                    "#,
                )
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?
            }
            StockTarget::Variation { variation_id, .. } => {
                sqlx::query_as::<_, StockItemRef>(
                    r#"
                    SELECT product_id, id AS variation_id, name, sku, tally_item_name, stock
                    FROM product_variations WHERE id = ?1
                    "#,
                )
                .bind(variation_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        item.ok_or_else(|| not_found(target))
    }
}

/// Atomic `stock = stock + delta` on a caller-supplied connection, so it can
/// run inside a transaction.
pub(crate) async fn adjust_stock_on(
    conn: &mut SqliteConnection,
    target: &StockTarget,
    delta: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    debug!(stock_key = %target.key(), delta, "Adjusting stock");

    let result = match target {
        StockTarget::Product { product_id } => {
            sqlx::query("UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1")
                .bind(product_id)
                .bind(delta)
                .bind(now)
                .execute(&mut *conn)
                .await?
        }
        StockTarget::Variation {
            product_id,
            variation_id,
        } => {
            sqlx::query(
                r#"
                UPDATE product_variations SET stock = stock + ?3, updated_at = ?4
                WHERE id = ?1 AND product_id = ?2
                "#,
            )
            .bind(variation_id)
            .bind(product_id)
            .bind(delta)
            .bind(now)
            .execute(&mut *conn)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(not_found(target));
    }

    Ok(())
}

fn not_found(target: &StockTarget) -> DbError {
    match target {
        StockTarget::Product { product_id } => DbError::not_found("Product", product_id),
        StockTarget::Variation { variation_id, .. } => {
            DbError::not_found("ProductVariation", variation_id)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
