mod common;

use catalog_sync::{
    domain::{outcome::ProcessResult, product::NewProduct, sync::SyncState},
    infra::DocumentStore,
};
use common::*;

#[tokio::test]
async fn unknown_product_event_creates_mirror() {
    let h = harness();
    let event = h.event(
        "evt_new_product",
        "product.created",
        1_700_000_000,
        product_object("prod_dash1", "Dashboard Hat", None),
    );

    let result = h.state.events.process(&event).await.unwrap();
    let ProcessResult::Created(id) = result else {
        panic!("expected Created, got {result:?}");
    };

    let product = h.store.product(id).await.unwrap().unwrap();
    assert_eq!(product.title, "Dashboard Hat");
    assert_eq!(product.slug, "dashboard-hat");
    assert_eq!(product.external_id.unwrap().as_str(), "prod_dash1");
    assert_eq!(product.sync_state, SyncState::Synced);
    assert_eq!(product.remote_synced_at, Some(1_700_000_000));
    assert_eq!(h.platform.total_calls(), 0, "mirrors are never pushed back");
}

#[tokio::test]
async fn mirror_slug_avoids_collision() {
    let h = harness();
    h.product("Hat").await;

    let event = h.event(
        "evt_hat",
        "product.created",
        1_700_000_000,
        product_object("prod_hat2", "Hat", None),
    );
    let ProcessResult::Created(id) = h.state.events.process(&event).await.unwrap() else {
        panic!("expected Created");
    };

    let mirror = h.store.product(id).await.unwrap().unwrap();
    assert_ne!(mirror.slug, "hat");
    assert!(mirror.slug.starts_with("hat-"));
    assert_eq!(h.store.product_count(), 2);
}

#[tokio::test]
async fn older_event_is_stale() {
    let h = harness();
    let newer = h.event(
        "evt_newer",
        "product.updated",
        200,
        product_object("prod_lww", "Newer Name", None),
    );
    let older = h.event(
        "evt_older",
        "product.updated",
        100,
        product_object("prod_lww", "Older Name", None),
    );

    let ProcessResult::Created(id) = h.state.events.process(&newer).await.unwrap() else {
        panic!("expected Created");
    };
    let result = h.state.events.process(&older).await.unwrap();

    assert_eq!(result, ProcessResult::Stale(id));
    let product = h.store.product(id).await.unwrap().unwrap();
    assert_eq!(product.title, "Newer Name");
    assert_eq!(product.remote_synced_at, Some(200));
}

#[tokio::test]
async fn event_without_field_changes_still_advances_the_clock() {
    let h = harness();
    let events = [
        h.event("evt_alpha_100", "product.created", 100, product_object("prod_clock", "Alpha", None)),
        h.event("evt_alpha_200", "product.updated", 200, product_object("prod_clock", "Alpha", None)),
        h.event("evt_beta_150", "product.updated", 150, product_object("prod_clock", "Beta", None)),
    ];

    let ProcessResult::Created(id) = h.state.events.process(&events[0]).await.unwrap() else {
        panic!("expected Created");
    };
    assert_eq!(
        h.state.events.process(&events[1]).await.unwrap(),
        ProcessResult::Unchanged(id)
    );
    assert_eq!(h.store.product(id).await.unwrap().unwrap().remote_synced_at, Some(200));

    assert_eq!(
        h.state.events.process(&events[2]).await.unwrap(),
        ProcessResult::Stale(id)
    );
    let product = h.store.product(id).await.unwrap().unwrap();
    assert_eq!(product.title, "Alpha");
    assert_eq!(product.remote_synced_at, Some(200));
    assert_eq!(h.platform.total_calls(), 0);
}

#[tokio::test]
async fn price_event_without_field_changes_still_advances_the_clock() {
    let h = harness();
    let first = h.event("evt_p100", "price.created", 100, price_object("price_clock", "prod_pclock", 900));
    let same = h.event("evt_p200", "price.updated", 200, price_object("price_clock", "prod_pclock", 900));
    let mut late_object = price_object("price_clock", "prod_pclock", 900);
    late_object["active"] = false.into();
    let late = h.event("evt_p150", "price.updated", 150, late_object);

    let ProcessResult::Created(id) = h.state.events.process(&first).await.unwrap() else {
        panic!("expected Created");
    };
    assert_eq!(h.state.events.process(&same).await.unwrap(), ProcessResult::Unchanged(id));
    assert_eq!(h.state.events.process(&late).await.unwrap(), ProcessResult::Stale(id));

    let price = h.store.price(id).await.unwrap().unwrap();
    assert!(price.active);
    assert_eq!(price.remote_synced_at, Some(200));
}

#[tokio::test]
async fn cms_id_metadata_links_unmirrored_product() {
    let h = harness();
    // Created as a remote write so no outbound call assigns an external id.
    let local = h
        .state
        .documents
        .create_product(
            NewProduct::titled("Scarf"),
            &catalog_sync::domain::sync::WriteContext::remote("import"),
        )
        .await
        .unwrap();
    assert!(local.external_id.is_none());

    let event = h.event(
        "evt_link",
        "product.updated",
        1_700_000_000,
        product_object("prod_scarf", "Scarf", Some(local.id)),
    );
    h.state.events.process(&event).await.unwrap();

    let linked = h.store.product(local.id).await.unwrap().unwrap();
    assert_eq!(linked.external_id.unwrap().as_str(), "prod_scarf");
    assert_eq!(h.store.product_count(), 1, "no duplicate mirror");
}

#[tokio::test]
async fn price_event_for_unknown_product_creates_both() {
    let h = harness();
    let event = h.event(
        "evt_price",
        "price.created",
        1_700_000_000,
        price_object("price_dash1", "prod_dash2", 2500),
    );

    let result = h.state.events.process(&event).await.unwrap();
    let ProcessResult::Created(price_id) = result else {
        panic!("expected Created, got {result:?}");
    };

    let price = h.store.price(price_id).await.unwrap().unwrap();
    assert_eq!(price.money.amount().minor(), 2500);
    assert_eq!(price.external_id.unwrap().as_str(), "price_dash1");

    let product = h.store.product(price.product_id).await.unwrap().unwrap();
    assert_eq!(product.external_id.unwrap().as_str(), "prod_dash2");
    assert_eq!(h.platform.total_calls(), 0);
}

#[tokio::test]
async fn price_without_unit_amount_is_ignored() {
    let h = harness();
    let mut object = price_object("price_tiered", "prod_tiered", 0);
    object["unit_amount"] = serde_json::Value::Null;
    let event = h.event("evt_tiered", "price.created", 1_700_000_000, object);

    let result = h.state.events.process(&event).await.unwrap();
    assert!(matches!(result, ProcessResult::Ignored(_)), "{result:?}");
}

#[tokio::test]
async fn redelivered_event_is_duplicate() {
    let h = harness();
    let event = h.event(
        "evt_twice",
        "product.created",
        1_700_000_000,
        product_object("prod_twice", "Twice", None),
    );

    assert!(matches!(
        h.state.events.process(&event).await.unwrap(),
        ProcessResult::Created(_)
    ));
    assert_eq!(
        h.state.events.process(&event).await.unwrap(),
        ProcessResult::Duplicate
    );
    assert_eq!(h.store.product_count(), 1);
}
