//! Shared fixtures for the engine scenario tests: a scripted in-memory Tally
//! and helpers that seed the marketplace database.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use ironmart_core::{OrderStatus, PaymentMethod, PaymentStatus};
use ironmart_db::{
    Database, DbConfig, NewOrder, NewOrderItem, NewProduct, NewStockEntry, NewStockEntryItem,
};
use ironmart_sync::tally::{
    ClosingBalance, ImportOutcome, InventoryLine, OutboundVoucher, TallyGateway, TallyVoucher,
};
use ironmart_sync::{SyncConfig, SyncError, SyncResult, TallySyncEngine};

// =============================================================================
// Fake Tally
// =============================================================================

/// Runs while Tally is "processing" an import, keyed by the voucher's
/// REMOTEID. Lets a test change the database mid-push.
pub type ImportHook =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Tally stand-in. Starts online with an empty company.
pub struct FakeTally {
    online: AtomicBool,
    /// Remote ids Tally refuses, as if a ledger were missing.
    rejected: Mutex<HashSet<String>>,
    imported: Mutex<Vec<OutboundVoucher>>,
    vouchers: Mutex<Vec<TallyVoucher>>,
    balances: Mutex<Vec<ClosingBalance>>,
    /// Return every voucher regardless of the requested AlterID.
    ignore_cursor: AtomicBool,
    next_voucher_id: AtomicI64,
    on_import: Mutex<Option<ImportHook>>,
}

impl FakeTally {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeTally {
            online: AtomicBool::new(true),
            rejected: Mutex::new(HashSet::new()),
            imported: Mutex::new(Vec::new()),
            vouchers: Mutex::new(Vec::new()),
            balances: Mutex::new(Vec::new()),
            ignore_cursor: AtomicBool::new(false),
            next_voucher_id: AtomicI64::new(1001),
            on_import: Mutex::new(None),
        })
    }

    pub fn on_import<F, Fut>(&self, hook: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: ImportHook = Box::new(move |remote_id| Box::pin(hook(remote_id)));
        *self.on_import.lock().unwrap() = Some(hook);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_ignore_cursor(&self, ignore: bool) {
        self.ignore_cursor.store(ignore, Ordering::SeqCst);
    }

    pub fn reject(&self, remote_id: &str) {
        self.rejected.lock().unwrap().insert(remote_id.to_string());
    }

    pub fn accept(&self, remote_id: &str) {
        self.rejected.lock().unwrap().remove(remote_id);
    }

    pub fn imported(&self) -> Vec<OutboundVoucher> {
        self.imported.lock().unwrap().clone()
    }

    pub fn imported_remote_ids(&self) -> Vec<String> {
        self.imported().into_iter().map(|v| v.remote_id).collect()
    }

    pub fn add_voucher(&self, voucher: TallyVoucher) {
        let mut vouchers = self.vouchers.lock().unwrap();
        vouchers.retain(|v| v.guid != voucher.guid);
        vouchers.push(voucher);
    }

    pub fn set_balances(&self, balances: &[(&str, i64)]) {
        *self.balances.lock().unwrap() = balances
            .iter()
            .map(|(item, qty)| ClosingBalance {
                stock_item: item.to_string(),
                quantity: *qty,
            })
            .collect();
    }

    fn check_online(&self) -> SyncResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::TallyUnreachable("connection refused".into()))
        }
    }
}

#[async_trait]
impl TallyGateway for FakeTally {
    async fn ping(&self) -> SyncResult<()> {
        self.check_online()
    }

    async fn import_voucher(&self, voucher: &OutboundVoucher) -> SyncResult<ImportOutcome> {
        self.check_online()?;

        if self.rejected.lock().unwrap().contains(&voucher.remote_id) {
            return Err(SyncError::VoucherRejected {
                reference: voucher.remote_id.clone(),
                reason: format!("Ledger '{}' does not exist", voucher.party_ledger),
            });
        }

        let during_import = self
            .on_import
            .lock()
            .unwrap()
            .as_ref()
            .map(|hook| hook(voucher.remote_id.clone()));
        if let Some(work) = during_import {
            work.await;
        }

        self.imported.lock().unwrap().push(voucher.clone());
        let id = self.next_voucher_id.fetch_add(1, Ordering::SeqCst);
        Ok(ImportOutcome {
            created: 1,
            altered: 0,
            voucher_id: Some(id.to_string()),
        })
    }

    async fn export_vouchers_since(&self, alter_id: i64) -> SyncResult<Vec<TallyVoucher>> {
        self.check_online()?;
        let ignore = self.ignore_cursor.load(Ordering::SeqCst);
        Ok(self
            .vouchers
            .lock()
            .unwrap()
            .iter()
            .filter(|v| ignore || v.alter_id > alter_id)
            .cloned()
            .collect())
    }

    async fn export_closing_balances(&self) -> SyncResult<Vec<ClosingBalance>> {
        self.check_online()?;
        Ok(self.balances.lock().unwrap().clone())
    }
}

/// A voucher entered directly in Tally. Quantities are inward-positive.
pub fn tally_voucher(guid: &str, alter_id: i64, lines: &[(&str, i64)]) -> TallyVoucher {
    TallyVoucher {
        guid: guid.to_string(),
        alter_id,
        voucher_type: "Stock Journal".to_string(),
        voucher_number: Some(format!("SJ-{}", alter_id)),
        reference: None,
        remote_id: None,
        cancelled: false,
        lines: lines
            .iter()
            .map(|(item, qty)| InventoryLine {
                stock_item: item.to_string(),
                quantity: *qty,
            })
            .collect(),
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub db: Arc<Database>,
    pub tally: Arc<FakeTally>,
    pub engine: TallySyncEngine,
}

pub async fn harness() -> Harness {
    harness_with(SyncConfig::default()).await
}

pub async fn harness_with(config: SyncConfig) -> Harness {
    let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
    let tally = FakeTally::new();
    let engine = TallySyncEngine::new(config, Arc::clone(&db), tally.clone()).unwrap();
    Harness { db, tally, engine }
}

// =============================================================================
// Seeding
// =============================================================================

pub async fn seed_product(db: &Database, name: &str, sku: &str, stock: i64) -> String {
    db.products()
        .insert_product(&NewProduct {
            name: name.to_string(),
            sku: Some(sku.to_string()),
            tally_item_name: None,
            stock,
        })
        .await
        .unwrap()
}

/// A paid cash-on-delivery order placed just now.
pub async fn seed_order(db: &Database, number: &str, product_id: &str, quantity: i64) -> String {
    seed_order_with(
        db,
        number,
        product_id,
        quantity,
        0,
        PaymentMethod::Cod,
        PaymentStatus::Paid,
    )
    .await
}

pub async fn seed_order_with(
    db: &Database,
    number: &str,
    product_id: &str,
    quantity: i64,
    minutes_ago: i64,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
) -> String {
    db.orders()
        .insert(&NewOrder {
            order_number: number.to_string(),
            customer_name: "Ravi Hardware".to_string(),
            status: OrderStatus::Pending,
            payment_status,
            payment_method,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            items: vec![NewOrderItem {
                product_id: product_id.to_string(),
                variation_id: None,
                name: "Line".to_string(),
                quantity,
                unit_price_paise: 2_500,
            }],
        })
        .await
        .unwrap()
}

/// A supplier bill received just now for one product.
pub async fn seed_stock_entry(
    db: &Database,
    bill_number: &str,
    product_id: &str,
    quantity: i64,
) -> String {
    db.stock_entries()
        .insert(&NewStockEntry {
            bill_number: bill_number.to_string(),
            supplier_name: "Krishna Steel Traders".to_string(),
            bill_date: Utc::now(),
            items: vec![NewStockEntryItem {
                product_id: product_id.to_string(),
                variation_id: None,
                quantity,
                unit_cost_paise: 1_200,
            }],
        })
        .await
        .unwrap()
}
