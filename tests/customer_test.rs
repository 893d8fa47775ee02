mod common;

use catalog_sync::{
    domain::{
        sync::SyncState,
        user::{NewUser, User},
    },
    infra::DocumentStore,
    services::{customers::CustomerProvisioner, retry::BackoffPolicy},
};
use common::*;
use std::{sync::Arc, time::Duration};

async fn bare_user(h: &Harness, email: &str) -> User {
    let user = NewUser {
        email: email.to_string(),
        name: None,
    }
    .into_user(SyncState::Synced);
    h.store.insert_user(&user).await.unwrap();
    user
}

fn provisioner(h: &Harness) -> Arc<CustomerProvisioner> {
    Arc::new(CustomerProvisioner::new(
        h.store.clone(),
        h.platform.clone(),
        BackoffPolicy::default(),
    ))
}

// ── N concurrent requests, one customer ────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ensure_creates_exactly_one_customer() {
    let h = harness();
    h.platform.set_delay(Duration::from_millis(20));
    let user = bare_user(&h, "race@example.com").await;
    let provisioner = provisioner(&h);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let provisioner = provisioner.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            provisioner.ensure_customer(&user).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    assert_eq!(h.platform.calls("create_customer"), 1, "exactly one customer created");
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "all callers see one id");
    let stored = h.store.user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.customer_id.as_ref(), Some(&ids[0]));
}

#[tokio::test]
async fn linked_user_makes_no_platform_call() {
    let h = harness();
    let user = bare_user(&h, "linked@example.com").await;
    let provisioner = provisioner(&h);

    let first = provisioner.ensure_customer(&user).await.unwrap();
    let calls = h.platform.total_calls();
    let refreshed = h.store.user(user.id).await.unwrap().unwrap();
    let second = provisioner.ensure_customer(&refreshed).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.platform.total_calls(), calls);
}

#[tokio::test]
async fn existing_platform_customer_is_linked_not_duplicated() {
    let h = harness();
    h.platform.seed_customer("known@example.com", "cus_known");
    let user = bare_user(&h, "known@example.com").await;

    let id = provisioner(&h).ensure_customer(&user).await.unwrap();

    assert_eq!(id.as_str(), "cus_known");
    assert_eq!(h.platform.calls("create_customer"), 0);
}

// ── signup hook ────────────────────────────────────────────────────────────

#[tokio::test]
async fn signup_provisions_customer() {
    let h = harness();
    let user = h.user("  New.User@Example.com ").await;

    assert_eq!(user.email, "new.user@example.com");
    assert!(user.customer_id.is_some());
    assert_eq!(user.sync_state, SyncState::Synced);
    assert_eq!(h.platform.calls("create_customer"), 1);
}

#[tokio::test(start_paused = true)]
async fn signup_survives_platform_outage() {
    let h = harness();
    h.platform.fail_next(10);

    let user = h.user("offline@example.com").await;

    assert!(user.customer_id.is_none());
    assert_eq!(user.sync_state, SyncState::PendingRemoteSync);
    let failures = h.store.sync_failures(10).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].collection, "users");
}
