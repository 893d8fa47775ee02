mod common;

use catalog_sync::{
    domain::{id::InvoiceId, order::OrderStatus, outcome::ProcessResult},
    infra::DocumentStore,
};
use common::*;
use std::sync::Arc;

/// A user linked to `cus_abc` and one mirrored product with a price.
async fn catalog(h: &Harness) -> (uuid::Uuid, String, String) {
    h.platform.seed_customer("buyer@example.com", "cus_abc");
    let user = h.user("buyer@example.com").await;
    assert_eq!(user.customer_id.as_ref().unwrap().as_str(), "cus_abc");

    let product = h.product("Ceramic Mug").await;
    let price = h.price(product.id, 2500).await;
    (
        user.id,
        product.external_id.unwrap().as_str().to_string(),
        price.external_id.unwrap().as_str().to_string(),
    )
}

async fn order_for(h: &Harness, invoice: &str) -> catalog_sync::domain::order::Order {
    h.store
        .order_by_invoice(&InvoiceId::new(invoice).unwrap())
        .await
        .unwrap()
        .expect("order exists")
}

// ── end to end ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn invoice_lifecycle_materializes_one_order() {
    let h = harness();
    let (user_id, product, price) = catalog(&h).await;
    let lines = [(price.as_str(), product.as_str(), 2500, 2)];

    let created = h.event(
        "evt_inv_created",
        "invoice.created",
        1000,
        invoice_object("in_789", "open", "cus_abc", &lines),
    );
    let paid = h.event(
        "evt_inv_paid",
        "invoice.updated",
        1010,
        invoice_object("in_789", "paid", "cus_abc", &lines),
    );

    assert!(matches!(
        h.state.events.process(&created).await.unwrap(),
        ProcessResult::Created(_)
    ));
    let order = order_for(&h, "in_789").await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.user_id, Some(user_id));

    assert!(matches!(
        h.state.events.process(&paid).await.unwrap(),
        ProcessResult::Updated(_)
    ));
    let order = order_for(&h, "in_789").await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total.minor(), 5000);
    assert_eq!(order.currency.as_str(), "usd");
    assert_eq!(order.amount_paid.minor(), 5000);
    assert_eq!(order.lines.len(), 1);
    assert!(order.lines[0].resolved);
    assert_eq!(order.lines[0].title, "Ceramic Mug");
    assert_eq!(order.lines[0].quantity, 2);
    assert!(order.lines[0].product_id.is_some());

    assert_eq!(h.store.order_count(), 1);
    let actions: Vec<String> = h.store.audit_entries().into_iter().map(|a| a.action).collect();
    assert_eq!(actions, vec!["created", "status_changed"]);
}

#[tokio::test]
async fn paid_before_created_still_ends_paid() {
    let h = harness();
    let (_, product, price) = catalog(&h).await;
    let lines = [(price.as_str(), product.as_str(), 2500, 1)];

    let paid = h.event(
        "evt_paid_first",
        "invoice.updated",
        2000,
        invoice_object("in_rev", "paid", "cus_abc", &lines),
    );
    let created = h.event(
        "evt_created_late",
        "invoice.created",
        1990,
        invoice_object("in_rev", "open", "cus_abc", &lines),
    );

    assert!(matches!(
        h.state.events.process(&paid).await.unwrap(),
        ProcessResult::Created(_)
    ));
    assert!(matches!(
        h.state.events.process(&created).await.unwrap(),
        ProcessResult::Stale(_)
    ));

    assert_eq!(order_for(&h, "in_rev").await.status, OrderStatus::Paid);
    assert_eq!(h.store.order_count(), 1);
}

#[tokio::test]
async fn newer_regression_is_anomaly() {
    let h = harness();
    let (_, product, price) = catalog(&h).await;
    let lines = [(price.as_str(), product.as_str(), 2500, 1)];

    let paid = h.event(
        "evt_anom_paid",
        "invoice.updated",
        3000,
        invoice_object("in_anom", "paid", "cus_abc", &lines),
    );
    let reopened = h.event(
        "evt_anom_open",
        "invoice.updated",
        3005,
        invoice_object("in_anom", "open", "cus_abc", &lines),
    );
    h.state.events.process(&paid).await.unwrap();

    assert!(matches!(
        h.state.events.process(&reopened).await.unwrap(),
        ProcessResult::Anomaly(_)
    ));
    let order = order_for(&h, "in_anom").await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.last_event_at, 3005);
    let last = h.store.audit_entries().pop().unwrap();
    assert_eq!(last.action, "anomaly");
    assert_eq!(last.detail["anomaly"], true);
}

// ── concurrency and redelivery ─────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invoice_events_create_one_order() {
    let h = Arc::new(harness());
    let (_, product, price) = catalog(&h).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let h = h.clone();
        let product = product.clone();
        let price = price.clone();
        handles.push(tokio::spawn(async move {
            let status = if i % 2 == 0 { "open" } else { "paid" };
            let event = h.event(
                &format!("evt_conc_{i}"),
                "invoice.updated",
                4000 + i,
                invoice_object(
                    "in_conc",
                    status,
                    "cus_abc",
                    &[(price.as_str(), product.as_str(), 2500, 1)],
                ),
            );
            h.state.events.process(&event).await.unwrap()
        }));
    }

    let mut created = 0;
    for handle in handles {
        if let ProcessResult::Created(_) = handle.await.unwrap() {
            created += 1;
        }
    }

    assert_eq!(created, 1, "exactly one Created");
    assert_eq!(h.store.order_count(), 1);
    assert_eq!(order_for(&h, "in_conc").await.status, OrderStatus::Paid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redelivery_applies_once() {
    let h = Arc::new(harness());
    let (_, product, price) = catalog(&h).await;
    let event = Arc::new(h.event(
        "evt_same",
        "invoice.created",
        5000,
        invoice_object(
            "in_dup",
            "open",
            "cus_abc",
            &[(price.as_str(), product.as_str(), 2500, 1)],
        ),
    ));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let h = h.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move {
            h.state.events.process(&event).await.unwrap()
        }));
    }

    let mut created = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ProcessResult::Created(_) => created += 1,
            ProcessResult::Duplicate => duplicates += 1,
            ProcessResult::Unchanged(_) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    // The creating task can lose the race to record the event id, so it may
    // report Duplicate as well.
    assert!(created <= 1);
    assert!(duplicates >= 9 - created);
    assert_eq!(h.store.order_count(), 1);
    assert_eq!(h.store.audit_entries().len(), 1);
}

// ── snapshots and refunds ──────────────────────────────────────────────────

#[tokio::test]
async fn unknown_catalog_item_keeps_event_snapshot() {
    let h = harness();
    let event = h.event(
        "evt_unknown_line",
        "invoice.created",
        6000,
        invoice_object(
            "in_unknown",
            "open",
            "cus_nobody",
            &[("price_ghost", "prod_ghost", 1200, 3)],
        ),
    );

    assert!(matches!(
        h.state.events.process(&event).await.unwrap(),
        ProcessResult::Created(_)
    ));
    let order = order_for(&h, "in_unknown").await;
    assert_eq!(order.user_id, None);
    let line = &order.lines[0];
    assert!(!line.resolved);
    assert_eq!(line.product_id, None);
    assert_eq!(line.external_price_id.as_deref(), Some("price_ghost"));
    assert_eq!(line.external_product_id.as_deref(), Some("prod_ghost"));
    assert_eq!(line.unit_amount.unwrap().minor(), 1200);
    assert_eq!(line.amount.minor(), 3600);
    assert_eq!(line.title, "3 x item");
}

#[tokio::test]
async fn discount_line_keeps_the_order() {
    let h = harness();
    let (_, product, price) = catalog(&h).await;
    let event = h.event(
        "evt_discounted",
        "invoice.created",
        6100,
        invoice_object(
            "in_discount",
            "paid",
            "cus_abc",
            &[
                (price.as_str(), product.as_str(), 2500, 1),
                ("price_coupon", "prod_coupon", -500, 1),
            ],
        ),
    );

    assert!(matches!(
        h.state.events.process(&event).await.unwrap(),
        ProcessResult::Created(_)
    ));
    let order = order_for(&h, "in_discount").await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total.minor(), 2000);
    assert_eq!(order.amount_paid.minor(), 2000);
    assert_eq!(order.lines.len(), 2);
    assert_eq!(order.lines[1].amount.minor(), -500);
    assert!(order.lines[1].amount.is_negative());
}

#[tokio::test]
async fn invoice_in_currency_outside_catalog_keeps_the_order() {
    let h = harness();
    let mut object = invoice_object(
        "in_chf",
        "paid",
        "cus_nobody",
        &[("price_swiss", "prod_swiss", 4200, 1)],
    );
    object["currency"] = "chf".into();
    let event = h.event("evt_chf", "invoice.created", 6200, object);

    assert!(matches!(
        h.state.events.process(&event).await.unwrap(),
        ProcessResult::Created(_)
    ));
    let order = order_for(&h, "in_chf").await;
    assert_eq!(order.currency.as_str(), "chf");
    assert_eq!(order.currency.known(), None);
    assert_eq!(order.total.minor(), 4200);
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn full_refund_moves_paid_order_to_refunded() {
    let h = harness();
    let (_, product, price) = catalog(&h).await;
    let paid = h.event(
        "evt_ref_paid",
        "invoice.updated",
        7000,
        invoice_object("in_ref", "paid", "cus_abc", &[(price.as_str(), product.as_str(), 5000, 1)]),
    );
    h.state.events.process(&paid).await.unwrap();

    let partial = h.event(
        "evt_ref_partial",
        "charge.refunded",
        7010,
        charge_object("ch_1", "in_ref", false),
    );
    assert!(matches!(
        h.state.events.process(&partial).await.unwrap(),
        ProcessResult::Ignored(_)
    ));

    let full = h.event(
        "evt_ref_full",
        "charge.refunded",
        7020,
        charge_object("ch_1", "in_ref", true),
    );
    assert!(matches!(
        h.state.events.process(&full).await.unwrap(),
        ProcessResult::Updated(_)
    ));
    assert_eq!(order_for(&h, "in_ref").await.status, OrderStatus::Refunded);
    assert_eq!(h.store.audit_entries().pop().unwrap().action, "refunded");
}

#[tokio::test]
async fn refund_for_unknown_invoice_is_acknowledged() {
    let h = harness();
    let event = h.event(
        "evt_ref_orphan",
        "charge.refunded",
        8000,
        charge_object("ch_2", "in_missing", true),
    );
    assert!(matches!(
        h.state.events.process(&event).await.unwrap(),
        ProcessResult::Ignored(_)
    ));
    assert_eq!(h.store.order_count(), 0);
}
