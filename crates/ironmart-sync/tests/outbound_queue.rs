//! Outbound queue behaviour against a scripted Tally.

mod common;

use std::sync::{Arc, Mutex};

use chrono::Utc;

use common::{harness, harness_with, seed_order, seed_order_with, seed_product};
use ironmart_core::{
    EnqueueOutcome, JobKind, OrderStatus, PaymentMethod, PaymentStatus, SyncEntityType,
    SyncOneOutcome, SyncTaskStatus, SYSTEM_ACTOR,
};
use ironmart_db::{NewOrder, NewOrderItem, NewStockEntry, NewStockEntryItem};
use ironmart_sync::{JobOutput, JobRunOutcome, SyncConfig};

const ORDER: SyncEntityType = SyncEntityType::Order;

#[tokio::test]
async fn test_enqueue_is_idempotent_and_synced_entities_are_not_resubmitted() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let order = seed_order(&h.db, "ORD-1001", &bolt, 4).await;

    assert_eq!(h.engine.enqueue(ORDER, &order).await.unwrap(), EnqueueOutcome::Created);
    assert_eq!(h.engine.enqueue(ORDER, &order).await.unwrap(), EnqueueOutcome::AlreadyPending);

    let report = h.engine.outbound().drain().await.unwrap();
    assert_eq!((report.processed, report.success, report.failed), (1, 1, 0));

    assert_eq!(h.engine.enqueue(ORDER, &order).await.unwrap(), EnqueueOutcome::AlreadySynced);
    let again = h.engine.outbound().drain().await.unwrap();
    assert_eq!(again.processed, 0);

    assert_eq!(
        h.engine.sync_one(ORDER, &order).await.unwrap(),
        SyncOneOutcome::AlreadySynced
    );
    assert_eq!(h.tally.imported().len(), 1);

    let task = h.db.sync_tasks().get(ORDER, &order).await.unwrap().unwrap();
    assert_eq!(task.status, SyncTaskStatus::Synced);
    assert_eq!(task.tally_voucher_id.as_deref(), Some("1001"));
}

#[tokio::test]
async fn test_one_rejected_voucher_does_not_abort_the_drain() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;

    let mut orders = Vec::new();
    for n in 1..=5 {
        let id = seed_order(&h.db, &format!("ORD-100{}", n), &bolt, 1).await;
        h.engine.enqueue(ORDER, &id).await.unwrap();
        orders.push(id);
    }
    h.tally.reject(&ORDER.voucher_reference("IM", &orders[2]));

    let report = h.engine.outbound().drain().await.unwrap();
    assert_eq!((report.processed, report.success, report.failed), (5, 4, 1));
    assert!(!report.stopped_early);

    let failed = h.db.sync_tasks().get(ORDER, &orders[2]).await.unwrap().unwrap();
    assert_eq!(failed.status, SyncTaskStatus::Failed);
    assert_eq!(failed.attempts, 1);
    assert!(failed.last_error.unwrap().contains("does not exist"));

    // FIFO: pushed in the order they were queued
    let expected: Vec<String> = [0, 1, 3, 4]
        .iter()
        .map(|&i| ORDER.voucher_reference("IM", &orders[i]))
        .collect();
    assert_eq!(h.tally.imported_remote_ids(), expected);
}

#[tokio::test]
async fn test_manual_sync_while_offline_leaves_task_pending() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let order = seed_order(&h.db, "ORD-1001", &bolt, 2).await;
    h.tally.set_online(false);

    let outcome = h.engine.sync_one(ORDER, &order).await.unwrap();
    assert_eq!(outcome, SyncOneOutcome::QueuedOffline);

    let task = h.db.sync_tasks().get(ORDER, &order).await.unwrap().unwrap();
    assert_eq!(task.status, SyncTaskStatus::Pending);
    assert_eq!(task.attempts, 0);
    assert!(h.tally.imported().is_empty());

    h.tally.set_online(true);
    match h.engine.sync_one(ORDER, &order).await.unwrap() {
        SyncOneOutcome::Synced { tally_voucher_id } => assert!(tally_voucher_id.is_some()),
        other => panic!("expected synced, got {:?}", other),
    }
}

#[tokio::test]
async fn test_drain_stops_when_tally_goes_away() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let mut orders = Vec::new();
    for n in 1..=3 {
        let id = seed_order(&h.db, &format!("ORD-200{}", n), &bolt, 1).await;
        h.engine.enqueue(ORDER, &id).await.unwrap();
        orders.push(id);
    }
    h.tally.set_online(false);

    let report = h.engine.outbound().drain().await.unwrap();
    assert!(report.stopped_early);
    assert_eq!((report.processed, report.success, report.failed), (1, 0, 1));

    let tasks = h.db.sync_tasks();
    assert_eq!(tasks.get(ORDER, &orders[0]).await.unwrap().unwrap().status, SyncTaskStatus::Failed);
    for id in &orders[1..] {
        assert_eq!(tasks.get(ORDER, id).await.unwrap().unwrap().status, SyncTaskStatus::Pending);
    }
}

#[tokio::test]
async fn test_task_becomes_stuck_at_retry_cap_and_manual_push_revives_it() {
    let mut config = SyncConfig::default();
    config.queue.max_attempts = 2;
    let h = harness_with(config).await;

    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let order = seed_order(&h.db, "ORD-3001", &bolt, 1).await;
    h.engine.enqueue(ORDER, &order).await.unwrap();
    h.tally.reject(&ORDER.voucher_reference("IM", &order));

    h.engine.outbound().drain().await.unwrap();
    h.engine.outbound().drain().await.unwrap();

    let task = h.db.sync_tasks().get(ORDER, &order).await.unwrap().unwrap();
    assert_eq!(task.status, SyncTaskStatus::Stuck);
    assert_eq!(task.attempts, 2);

    let idle = h.engine.outbound().drain().await.unwrap();
    assert_eq!(idle.processed, 0);

    assert_eq!(h.db.sync_tasks().stats().await.unwrap().stuck, 1);

    h.tally.accept(&ORDER.voucher_reference("IM", &order));
    let outcome = h.engine.sync_one(ORDER, &order).await.unwrap();
    assert!(matches!(outcome, SyncOneOutcome::Synced { .. }), "{:?}", outcome);
    assert_eq!(h.db.sync_tasks().stats().await.unwrap().stuck, 0);
}

#[tokio::test]
async fn test_cancelled_order_is_not_pushed() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let order = h
        .db
        .orders()
        .insert(&NewOrder {
            order_number: "ORD-4001".into(),
            customer_name: "Ravi Hardware".into(),
            status: OrderStatus::Cancelled,
            payment_status: PaymentStatus::Refunded,
            payment_method: PaymentMethod::Online,
            created_at: Utc::now(),
            items: vec![NewOrderItem {
                product_id: bolt.clone(),
                variation_id: None,
                name: "Hex Bolt M8".into(),
                quantity: 1,
                unit_price_paise: 1_000,
            }],
        })
        .await
        .unwrap();

    match h.engine.sync_one(ORDER, &order).await.unwrap() {
        SyncOneOutcome::Failed { error } => assert!(error.contains("cancelled"), "{}", error),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(h.tally.imported().is_empty());
}

#[tokio::test]
async fn test_stock_entry_becomes_purchase_voucher() {
    let h = harness().await;
    let chain = seed_product(&h.db, "Chain 6mm", "CH-6", 10).await;
    let entry = h
        .db
        .stock_entries()
        .insert(&NewStockEntry {
            bill_number: "BILL-77".into(),
            supplier_name: "Krishna Steel Traders".into(),
            bill_date: Utc::now(),
            items: vec![NewStockEntryItem {
                product_id: chain,
                variation_id: None,
                quantity: 25,
                unit_cost_paise: 12_000,
            }],
        })
        .await
        .unwrap();

    let outcome = h.engine.sync_one(SyncEntityType::StockEntry, &entry).await.unwrap();
    assert!(matches!(outcome, SyncOneOutcome::Synced { .. }));

    let imported = h.tally.imported();
    assert_eq!(imported.len(), 1);
    let voucher = &imported[0];
    assert_eq!(voucher.voucher_type(), "Purchase");
    assert!(voucher.is_inward());
    assert_eq!(voucher.party_ledger, "Krishna Steel Traders");
    assert_eq!(voucher.ledger, "Purchase");
    assert_eq!(voucher.remote_id, format!("IM-STK-{}", entry));
    assert_eq!(voucher.lines[0].stock_item, "CH-6");
    assert_eq!(voucher.lines[0].quantity, 25);
}

#[tokio::test]
async fn test_manual_sync_with_sync_disabled_only_queues() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let order = seed_order(&h.db, "ORD-5001", &bolt, 1).await;

    h.engine.set_enabled(false).await.unwrap();
    assert_eq!(
        h.engine.sync_one(ORDER, &order).await.unwrap(),
        SyncOneOutcome::QueuedOffline
    );
    assert!(h.tally.imported().is_empty());

    let task = h.db.sync_tasks().get(ORDER, &order).await.unwrap().unwrap();
    assert_eq!(task.status, SyncTaskStatus::Pending);
}

#[tokio::test]
async fn test_cleanup_waits_for_an_order_whose_voucher_is_being_imported() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let unpaid = seed_order_with(
        &h.db,
        "ORD-4001",
        &bolt,
        3,
        90,
        PaymentMethod::Online,
        PaymentStatus::Pending,
    )
    .await;
    let next = seed_order(&h.db, "ORD-4002", &bolt, 1).await;
    h.engine.enqueue(ORDER, &unpaid).await.unwrap();
    h.engine.enqueue(ORDER, &next).await.unwrap();

    // The cleanup job fires while Tally is still importing the unpaid order
    let mid_push = Arc::new(Mutex::new(None));
    {
        let db = Arc::clone(&h.db);
        let seen = Arc::clone(&mid_push);
        let watched = ORDER.voucher_reference("IM", &unpaid);
        let order_id = unpaid.clone();
        h.tally.on_import(move |remote_id| {
            let db = Arc::clone(&db);
            let seen = Arc::clone(&seen);
            let order_id = order_id.clone();
            let hit = remote_id == watched;
            async move {
                if hit {
                    let outcome = db
                        .orders()
                        .cancel_abandoned(&order_id, "payment timeout", SYSTEM_ACTOR)
                        .await
                        .unwrap();
                    *seen.lock().unwrap() = Some(outcome);
                }
            }
        });
    }

    let report = h.engine.outbound().drain().await.unwrap();
    assert_eq!((report.processed, report.success, report.failed), (2, 2, 0));
    assert_eq!(*mid_push.lock().unwrap(), Some(None));

    let tasks = h.db.sync_tasks();
    for id in [&unpaid, &next] {
        assert_eq!(tasks.get(ORDER, id).await.unwrap().unwrap().status, SyncTaskStatus::Synced);
    }
    let order = h.db.orders().get(&unpaid).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    // The next scheduled run cancels it and keeps the synced task as history
    let outcome = h.engine.run_job(JobKind::AbandonedOrderCleanup).await.unwrap();
    let JobRunOutcome::Completed { output: JobOutput::Cleanup(cleanup) } = &outcome else {
        panic!("unexpected outcome: {:?}", outcome);
    };
    assert_eq!((cleanup.cancelled, cleanup.units_restored), (1, 3));
    assert_eq!(
        tasks.get(ORDER, &unpaid).await.unwrap().unwrap().status,
        SyncTaskStatus::Synced
    );
}

#[tokio::test]
async fn test_task_removed_mid_push_does_not_abort_the_drain() {
    let h = harness().await;
    let bolt = seed_product(&h.db, "Hex Bolt M8", "HB-M8", 100).await;
    let first = seed_order(&h.db, "ORD-5001", &bolt, 1).await;
    let second = seed_order(&h.db, "ORD-5002", &bolt, 1).await;
    h.engine.enqueue(ORDER, &first).await.unwrap();
    h.engine.enqueue(ORDER, &second).await.unwrap();

    {
        let db = Arc::clone(&h.db);
        let watched = ORDER.voucher_reference("IM", &first);
        let order_id = first.clone();
        h.tally.on_import(move |remote_id| {
            let db = Arc::clone(&db);
            let order_id = order_id.clone();
            let hit = remote_id == watched;
            async move {
                if hit {
                    sqlx::query("DELETE FROM sync_tasks WHERE entity_id = ?1")
                        .bind(&order_id)
                        .execute(db.pool())
                        .await
                        .unwrap();
                }
            }
        });
    }

    let report = h.engine.outbound().drain().await.unwrap();
    assert_eq!((report.processed, report.success, report.failed), (2, 1, 1));
    assert!(!report.stopped_early);

    let tasks = h.db.sync_tasks();
    assert!(tasks.get(ORDER, &first).await.unwrap().is_none());
    assert_eq!(tasks.get(ORDER, &second).await.unwrap().unwrap().status, SyncTaskStatus::Synced);
    assert_eq!(h.tally.imported().len(), 2);
}
