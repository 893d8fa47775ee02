mod common;

use catalog_sync::{
    domain::{
        error::SyncError,
        money::{Currency, Money, MoneyAmount},
        price::PricePatch,
        product::ProductPatch,
        sync::SyncState,
    },
    infra::DocumentStore,
    services::{
        hooks::{AfterChange, ProductOutboundSync},
        retry::BackoffPolicy,
    },
};
use common::*;

// ── local create pushes once and writes the external id back ───────────────

#[tokio::test]
async fn local_product_create_mirrors_to_platform() {
    let h = harness();
    let product = h.product("Ceramic Mug").await;

    assert_eq!(h.platform.calls("create_product"), 1);
    assert_eq!(product.slug, "ceramic-mug");
    assert_eq!(product.sync_state, SyncState::Synced);
    let external = product.external_id.expect("external id written back");
    assert!(external.as_str().starts_with("prod_"));

    let pushed = h.platform.products.lock().unwrap()[0].clone();
    assert_eq!(pushed.local_id, product.id);
    assert_eq!(pushed.name, "Ceramic Mug");
}

// ── one local edit, one remote update ──────────────────────────────────────

#[tokio::test]
async fn local_edit_produces_exactly_one_update_call() {
    let h = harness();
    let product = h.product("Mug").await;

    let written = h
        .state
        .documents
        .patch_product(
            product.id,
            ProductPatch {
                title: Some("Large Mug".into()),
                ..ProductPatch::default()
            },
            &admin(),
        )
        .await
        .unwrap();

    assert!(written.changed);
    assert_eq!(h.platform.calls("update_product"), 1);
    assert_eq!(h.platform.calls("create_product"), 1);
    assert_eq!(written.doc.sync_state, SyncState::Synced);
}

#[tokio::test]
async fn edit_without_effect_makes_no_call() {
    let h = harness();
    let product = h.product("Mug").await;

    let written = h
        .state
        .documents
        .patch_product(
            product.id,
            ProductPatch {
                title: Some("Mug".into()),
                ..ProductPatch::default()
            },
            &admin(),
        )
        .await
        .unwrap();

    assert!(!written.changed);
    assert_eq!(h.platform.calls("update_product"), 0);
}

// ── remote-origin writes never echo back ───────────────────────────────────

#[tokio::test]
async fn inbound_event_for_synced_product_makes_no_outbound_call() {
    let h = harness();
    let product = h.product("Mug").await;
    let external = product.external_id.clone().unwrap();
    let before = h.platform.total_calls();

    let event = h.event(
        "evt_rename",
        "product.updated",
        chrono::Utc::now().timestamp(),
        product_object(external.as_str(), "Renamed Mug", Some(product.id)),
    );
    h.state.events.process(&event).await.unwrap();

    let stored = h.store.product(product.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Renamed Mug");
    assert_eq!(h.platform.total_calls(), before, "no echo to the platform");
}

// ── failure policy ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn exhausted_retries_keep_local_write_and_record_failure() {
    let h = harness();
    h.platform.fail_next(2);

    let product = h.product("Teapot").await;

    assert_eq!(h.platform.calls("create_product"), 2);
    assert!(product.external_id.is_none());
    assert_eq!(product.sync_state, SyncState::PendingRemoteSync);
    assert!(product.sync_error.as_deref().unwrap().contains("injected failure"));

    let failures = h.store.sync_failures(10).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].collection, "products");
    assert_eq!(failures[0].document_id, product.id);
    assert_eq!(failures[0].attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried() {
    let h = harness();
    h.platform.fail_next(1);

    let product = h.product("Teapot").await;

    assert_eq!(h.platform.calls("create_product"), 2);
    assert!(product.external_id.is_some());
    assert_eq!(product.sync_state, SyncState::Synced);
    assert!(h.store.sync_failures(10).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_after_failure_restores_synced_state() {
    let h = harness();
    h.platform.fail_next(2);
    let product = h.product("Teapot").await;
    assert_eq!(product.sync_state, SyncState::PendingRemoteSync);

    let written = h
        .state
        .documents
        .patch_product(
            product.id,
            ProductPatch {
                description: Some(Some("Cast iron".into())),
                ..ProductPatch::default()
            },
            &admin(),
        )
        .await
        .unwrap();

    assert_eq!(written.doc.sync_state, SyncState::Synced);
    assert!(written.doc.external_id.is_some());
    assert!(written.doc.sync_error.is_none());
}

// ── prices ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn price_create_references_platform_product() {
    let h = harness();
    let product = h.product("Mug").await;
    let price = h.price(product.id, 1500).await;

    assert_eq!(h.platform.calls("create_price"), 1);
    assert!(price.external_id.is_some());
    assert_eq!(price.sync_state, SyncState::Synced);
    let pushed = h.platform.prices.lock().unwrap()[0].clone();
    assert_eq!(Some(&pushed.product), product.external_id.as_ref());
    assert_eq!(pushed.money.amount().minor(), 1500);
}

#[tokio::test]
async fn price_terms_are_fixed_once_mirrored() {
    let h = harness();
    let product = h.product("Mug").await;
    let price = h.price(product.id, 1500).await;

    let err = h
        .state
        .documents
        .patch_price(
            price.id,
            PricePatch {
                money: Some(Money::new(MoneyAmount::new(1800).unwrap(), Currency::Usd)),
                ..PricePatch::default()
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    // Archiving is allowed and pushed.
    let written = h
        .state
        .documents
        .patch_price(
            price.id,
            PricePatch {
                active: Some(false),
                ..PricePatch::default()
            },
            &admin(),
        )
        .await
        .unwrap();
    assert!(!written.doc.active);
    assert_eq!(h.platform.calls("update_price"), 1);
}

// ── descriptions ───────────────────────────────────────────────────────────

fn describe(description: Option<&str>) -> ProductPatch {
    ProductPatch {
        description: Some(description.map(str::to_string)),
        ..ProductPatch::default()
    }
}

#[tokio::test]
async fn description_edit_is_pushed() {
    let h = harness();
    let product = h.product("Mug").await;

    let written = h
        .state
        .documents
        .patch_product(product.id, describe(Some("Holds 350ml")), &admin())
        .await
        .unwrap();

    assert_eq!(h.platform.calls("update_product"), 1);
    let pushed = h.platform.products.lock().unwrap().last().cloned().unwrap();
    assert_eq!(pushed.description.as_deref(), Some("Holds 350ml"));
    assert_eq!(written.doc.sync_state, SyncState::Synced);
}

#[tokio::test]
async fn clearing_a_mirrored_description_is_recorded() {
    let h = harness();
    let product = h.product("Mug").await;
    h.state
        .documents
        .patch_product(product.id, describe(Some("Holds 350ml")), &admin())
        .await
        .unwrap();

    let written = h
        .state
        .documents
        .patch_product(product.id, describe(None), &admin())
        .await
        .unwrap();

    assert_eq!(written.doc.description, None);
    assert_eq!(written.doc.sync_state, SyncState::PendingRemoteSync);
    assert!(written.doc.sync_error.as_deref().unwrap().contains("cannot be cleared"));
    let failures = h.store.sync_failures(10).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, "update_product");
}

// ── overlapping pushes ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn late_success_does_not_hide_newer_failure() {
    let h = harness();
    let product = h.product("Mug").await;
    let older = h
        .state
        .documents
        .patch_product(
            product.id,
            ProductPatch {
                title: Some("Large Mug".into()),
                ..ProductPatch::default()
            },
            &admin(),
        )
        .await
        .unwrap()
        .doc;

    h.platform.fail_next(2);
    let newer = h
        .state
        .documents
        .patch_product(
            product.id,
            ProductPatch {
                title: Some("Huge Mug".into()),
                ..ProductPatch::default()
            },
            &admin(),
        )
        .await
        .unwrap()
        .doc;
    assert_eq!(newer.sync_state, SyncState::PendingRemoteSync);
    assert!(newer.version > older.version);

    // The push for the older edit finishes only now, and succeeds.
    let hook = ProductOutboundSync::new(
        h.store.clone(),
        h.platform.clone(),
        BackoffPolicy::with_max_attempts(1),
    );
    hook.after_change(&older, Some(&product), &admin())
        .await
        .unwrap();

    let stored = h.store.product(product.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_state, SyncState::PendingRemoteSync);
    assert!(stored.sync_error.is_some());
}
