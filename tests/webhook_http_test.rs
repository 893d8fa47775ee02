mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use catalog_sync::routes::router;
use common::*;
use tower::ServiceExt;

fn webhook_request(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn status_field(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    json["status"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn health_check() {
    let h = harness();
    let response = router(h.state.clone())
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_event_is_applied_then_deduplicated() {
    let h = harness();
    let app = router(h.state.clone());
    let (body, signature) = signed_event(
        "evt_http_1",
        "product.created",
        1_700_000_000,
        product_object("prod_http", "Poster", None),
    );

    let first = app
        .clone()
        .oneshot(webhook_request(body.clone(), Some(&signature)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(status_field(first).await, "created");

    let second = app
        .oneshot(webhook_request(body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(status_field(second).await, "duplicate");
    assert_eq!(h.store.product_count(), 1);
}

#[tokio::test]
async fn unverifiable_requests_are_rejected_without_effect() {
    let h = harness();
    let app = router(h.state.clone());
    let (body, signature) = signed_event(
        "evt_http_bad",
        "product.created",
        1_700_000_000,
        product_object("prod_bad", "Forged", None),
    );
    let now = chrono::Utc::now().timestamp();

    let mut tampered = body.clone();
    tampered.extend_from_slice(b"\n");
    let cases = [
        webhook_request(body.clone(), None),
        webhook_request(body.clone(), Some("t=1,v1=00")),
        webhook_request(tampered, Some(&signature)),
        webhook_request(body.clone(), Some(&sign(&body, now, "whsec_wrong"))),
        webhook_request(body.clone(), Some(&sign(&body, now - 3600, WEBHOOK_SECRET))),
    ];
    for request in cases {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(h.store.product_count(), 0);
}

#[tokio::test]
async fn unsubscribed_event_type_is_acknowledged() {
    let h = harness();
    let (body, signature) = signed_event(
        "evt_http_customer",
        "customer.created",
        1_700_000_000,
        serde_json::json!({ "id": "cus_x", "object": "customer" }),
    );

    let response = router(h.state.clone())
        .oneshot(webhook_request(body, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_field(response).await, "ignored");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let h = harness();
    let body = vec![b' '; 128 * 1024];
    let response = router(h.state.clone())
        .oneshot(webhook_request(body, Some("t=1,v1=00")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
