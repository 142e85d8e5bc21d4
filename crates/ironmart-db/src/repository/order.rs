//! # Order Repository
//!
//! Marketplace orders as consumed by the sync engine: reading orders and
//! their lines for Sales vouchers, and cancelling abandoned online orders.
//!
//! ## Abandoned Order Cancellation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   ONE TRANSACTION PER ORDER                             │
//! │                                                                         │
//! │  1. UPDATE orders SET status = 'cancelled'                             │
//! │     WHERE id = ? AND status != 'cancelled' AND payment_status='pending'│
//! │       AND no sync task for the order is 'queued'                       │
//! │       │                                                                 │
//! │       ├── 0 rows → paid, cancelled, or mid-push to Tally → ROLLBACK    │
//! │       ▼                                                                 │
//! │  2. stock = stock + quantity for every line                            │
//! │  3. INSERT order_status_history (changed_by = 'system')                │
//! │  4. DELETE unsynced sync_tasks for the order                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Step 1 is the guard: stock is restored at most once per order.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::adjust_stock_on;
use crate::repository::sync::delete_unsynced_on;
use ironmart_core::{
    Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, StockTarget, SyncEntityType,
};

const ORDER_COLUMNS: &str = r#"
    id, order_number, customer_name, status, payment_status, payment_method,
    total_paise, created_at, updated_at, cancelled_at, cancel_reason
"#;

/// Fields for creating an order. The storefront owns order placement; this
/// exists for the sync engine's tests and for seeding.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub variation_id: Option<String>,
    pub name: String,
    pub quantity: i64,
    pub unit_price_paise: i64,
}

/// One row of an order's status history.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderHistoryEntry {
    pub id: String,
    pub order_id: String,
    pub status: String,
    pub note: Option<String>,
    pub changed_by: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for marketplace orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts an order with its lines. Stock is decremented for every line,
    /// as the storefront does at checkout.
    pub async fn insert(&self, order: &NewOrder) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let total: i64 = order
            .items
            .iter()
            .map(|i| i.quantity * i.unit_price_paise)
            .sum();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, customer_name, status, payment_status, payment_method,
                total_paise, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&id)
        .bind(&order.order_number)
        .bind(&order.customer_name)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_method)
        .bind(total)
        .bind(order.created_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (id, order_id, product_id, variation_id, name, quantity, unit_price_paise)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(&item.product_id)
            .bind(&item.variation_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price_paise)
            .execute(&mut *tx)
            .await?;

            let target = StockTarget::new(&item.product_id, item.variation_id.as_deref());
            adjust_stock_on(&mut tx, &target, -item.quantity, now).await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, variation_id, name, quantity, unit_price_paise
            FROM order_items WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn history(&self, order_id: &str) -> DbResult<Vec<OrderHistoryEntry>> {
        let entries = sqlx::query_as::<_, OrderHistoryEntry>(
            r#"
            SELECT id, order_id, status, note, changed_by, created_at
            FROM order_status_history WHERE order_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Sets payment status (storefront webhook path; used by tests).
    pub async fn set_payment_status(&self, id: &str, status: PaymentStatus) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE orders SET payment_status = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(status)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", id));
        }
        Ok(())
    }

    /// Online orders still awaiting payment that were placed before `cutoff`.
    pub async fn find_abandoned(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {} FROM orders
            WHERE payment_status = 'pending'
              AND payment_method = 'online'
              AND status != 'cancelled'
              AND created_at < ?1
            ORDER BY created_at
            "#,
            ORDER_COLUMNS
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    /// Cancels an abandoned order and returns its stock, atomically.
    ///
    /// Returns `Some(units_restored)` when this call cancelled the order,
    /// `None` when it was already cancelled, got paid in the meantime, or
    /// its Sales voucher is being pushed right now. A later run picks the
    /// last case up again.
    pub async fn cancel_abandoned(
        &self,
        order_id: &str,
        reason: &str,
        changed_by: &str,
    ) -> DbResult<Option<i64>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'cancelled',
                cancelled_at = ?2,
                cancel_reason = ?3,
                updated_at = ?2
            WHERE id = ?1 AND status != 'cancelled' AND payment_status = 'pending'
              AND NOT EXISTS (
                  SELECT 1 FROM sync_tasks t
                  WHERE t.entity_type = 'order' AND t.entity_id = ?1 AND t.status = 'queued'
              )
            "#,
        )
        .bind(order_id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        if cancelled.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(order_id, "Order no longer abandoned or being pushed, skipping");
            return Ok(None);
        }

        let items: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            "SELECT product_id, variation_id, quantity FROM order_items WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut restored = 0;
        for (product_id, variation_id, quantity) in &items {
            let target = StockTarget::new(product_id, variation_id.as_deref());
            adjust_stock_on(&mut tx, &target, *quantity, now).await?;
            restored += quantity;
        }

        sqlx::query(
            r#"
            INSERT INTO order_status_history (id, order_id, status, note, changed_by, created_at)
            VALUES (?1, ?2, 'cancelled', ?3, ?4, ?5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(order_id)
        .bind(reason)
        .bind(changed_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let dropped = delete_unsynced_on(&mut tx, SyncEntityType::Order, order_id).await?;

        tx.commit().await?;

        info!(
            order_id,
            units_restored = restored,
            sync_tasks_dropped = dropped,
            "Cancelled abandoned order"
        );
        Ok(Some(restored))
    }

    /// Quantities held by live orders that Tally has not seen yet.
    ///
    /// Tally's closing balance does not include these sales, so the nightly
    /// reset subtracts them to avoid putting sold units back on the shelf.
    pub async fn unsynced_quantities(&self) -> DbResult<Vec<(StockTarget, i64)>> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT oi.product_id, oi.variation_id, SUM(oi.quantity)
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status != 'cancelled'
              AND NOT EXISTS (
                  SELECT 1 FROM sync_tasks t
                  WHERE t.entity_type = 'order' AND t.entity_id = o.id AND t.status = 'synced'
              )
            GROUP BY oi.product_id, oi.variation_id
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

// =============================================================================
// Unit Tests
// =============================================================================
