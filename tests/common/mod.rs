#![allow(dead_code)]

use catalog_sync::{
    AppState, build_state,
    config::AppConfig,
    domain::{
        error::SyncError,
        event::VerifiedEvent,
        id::{CustomerExtId, PriceExtId, ProductExtId},
        money::{Currency, Money, MoneyAmount},
        platform::{
            BoxFuture, CheckoutSession, CheckoutSessionRequest, CustomerDraft, PaymentPlatform,
            PriceDraft, ProductDraft,
        },
        price::NewPrice,
        product::NewProduct,
        sync::WriteContext,
        user::{NewUser, User},
    },
    infra::InMemoryStore,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const APP_URL: &str = "https://shop.example";

/// Recording payment platform with failure injection.
#[derive(Default)]
pub struct MockPlatform {
    next_id: AtomicUsize,
    failures_left: AtomicU32,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    customers: Mutex<HashMap<String, CustomerExtId>>,
    pub products: Mutex<Vec<ProductDraft>>,
    pub prices: Mutex<Vec<PriceDraft>>,
    pub sessions: Mutex<Vec<CheckoutSessionRequest>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls fail with a retryable remote error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// A customer already exists on the platform for this email.
    pub fn seed_customer(&self, email: &str, id: &str) {
        self.customers
            .lock()
            .unwrap()
            .insert(email.to_string(), CustomerExtId::new(id).unwrap());
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn enter(&self, operation: &'static str) -> Result<(), SyncError> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::Remote(format!("{operation}: injected failure")));
        }
        Ok(())
    }
}

impl PaymentPlatform for MockPlatform {
    fn create_product<'a>(
        &'a self,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<ProductExtId, SyncError>> {
        Box::pin(async move {
            self.enter("create_product").await?;
            self.products.lock().unwrap().push(draft.clone());
            ProductExtId::new(self.next_id("prod_mock"))
        })
    }

    fn update_product<'a>(
        &'a self,
        _id: &'a ProductExtId,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move {
            self.enter("update_product").await?;
            self.products.lock().unwrap().push(draft.clone());
            Ok(())
        })
    }

    fn create_price<'a>(
        &'a self,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<PriceExtId, SyncError>> {
        Box::pin(async move {
            self.enter("create_price").await?;
            self.prices.lock().unwrap().push(draft.clone());
            PriceExtId::new(self.next_id("price_mock"))
        })
    }

    fn update_price<'a>(
        &'a self,
        _id: &'a PriceExtId,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move {
            self.enter("update_price").await?;
            self.prices.lock().unwrap().push(draft.clone());
            Ok(())
        })
    }

    fn find_customer_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerExtId>, SyncError>> {
        Box::pin(async move {
            self.enter("find_customer_by_email").await?;
            Ok(self.customers.lock().unwrap().get(email).cloned())
        })
    }

    fn create_customer<'a>(
        &'a self,
        draft: &'a CustomerDraft,
    ) -> BoxFuture<'a, Result<CustomerExtId, SyncError>> {
        Box::pin(async move {
            self.enter("create_customer").await?;
            let id = CustomerExtId::new(self.next_id("cus_mock"))?;
            self.customers
                .lock()
                .unwrap()
                .insert(draft.email.clone(), id.clone());
            Ok(id)
        })
    }

    fn create_checkout_session<'a>(
        &'a self,
        request: &'a CheckoutSessionRequest,
    ) -> BoxFuture<'a, Result<CheckoutSession, SyncError>> {
        Box::pin(async move {
            self.enter("create_checkout_session").await?;
            self.sessions.lock().unwrap().push(request.clone());
            let id = self.next_id("cs_test_");
            Ok(CheckoutSession {
                url: format!("https://checkout.stripe.com/c/pay/{id}"),
                id,
            })
        })
    }
}

pub fn test_config() -> AppConfig {
    let env: HashMap<&str, &str> = HashMap::from([
        ("STRIPE_SECRET_KEY", "sk_test_unused"),
        ("STRIPE_WEBHOOKS_ENDPOINT_SECRET", WEBHOOK_SECRET),
        ("PUBLIC_APP_URL", APP_URL),
        ("OUTBOUND_SYNC_MAX_ATTEMPTS", "2"),
    ]);
    AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap()
}

/// Full service graph over an in-memory store and a mock platform.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub platform: Arc<MockPlatform>,
    pub state: AppState,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let platform = Arc::new(MockPlatform::new());
    let state = build_state(&test_config(), store.clone(), platform.clone()).unwrap();
    Harness {
        store,
        platform,
        state,
    }
}

pub fn admin() -> WriteContext {
    WriteContext::local("admin:test")
}

pub fn usd(minor: i64) -> Money {
    Money::new(MoneyAmount::new(minor).unwrap(), Currency::Usd)
}

impl Harness {
    pub async fn product(&self, title: &str) -> catalog_sync::domain::product::Product {
        self.state
            .documents
            .create_product(NewProduct::titled(title), &admin())
            .await
            .unwrap()
    }

    pub async fn price(&self, product_id: uuid::Uuid, minor: i64) -> catalog_sync::domain::price::Price {
        self.state
            .documents
            .create_price(NewPrice::one_off(product_id, usd(minor)), &admin())
            .await
            .unwrap()
    }

    pub async fn user(&self, email: &str) -> User {
        self.state
            .documents
            .create_user(
                NewUser {
                    email: email.to_string(),
                    name: Some("Test User".to_string()),
                },
                &admin(),
            )
            .await
            .unwrap()
    }

    /// Sign and verify an event the way the webhook endpoint would.
    pub fn event(
        &self,
        id: &str,
        event_type: &str,
        created: i64,
        object: serde_json::Value,
    ) -> VerifiedEvent {
        let (body, header) = signed_event(id, event_type, created, object);
        self.state.verifier.verify(&body, Some(&header)).unwrap()
    }
}

pub fn sign(body: &[u8], timestamp: i64, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Event body plus a `Stripe-Signature` header signed now.
pub fn signed_event(
    id: &str,
    event_type: &str,
    created: i64,
    object: serde_json::Value,
) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": created,
        "livemode": false,
        "data": { "object": object },
    })
    .to_string()
    .into_bytes();
    let header = sign(&body, chrono::Utc::now().timestamp(), WEBHOOK_SECRET);
    (body, header)
}

// ── Payload builders ───────────────────────────────────────────────────────

pub fn product_object(id: &str, name: &str, cms_id: Option<uuid::Uuid>) -> serde_json::Value {
    let mut metadata = serde_json::Map::new();
    if let Some(cms_id) = cms_id {
        metadata.insert("cms_id".into(), cms_id.to_string().into());
    }
    serde_json::json!({
        "id": id,
        "object": "product",
        "name": name,
        "active": true,
        "metadata": metadata,
    })
}

pub fn price_object(id: &str, product: &str, unit_amount: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "object": "price",
        "product": product,
        "unit_amount": unit_amount,
        "currency": "usd",
        "active": true,
        "metadata": {},
    })
}

/// Invoice with one line per `(price id, product id, unit amount, quantity)`.
pub fn invoice_object(
    id: &str,
    status: &str,
    customer: &str,
    lines: &[(&str, &str, i64, u64)],
) -> serde_json::Value {
    let data: Vec<serde_json::Value> = lines
        .iter()
        .map(|(price, product, unit, qty)| {
            serde_json::json!({
                "amount": unit * *qty as i64,
                "quantity": qty,
                "description": format!("{qty} x item"),
                "price": { "id": price, "product": product, "unit_amount": unit },
            })
        })
        .collect();
    let total: i64 = lines.iter().map(|(_, _, unit, qty)| unit * *qty as i64).sum();
    let amount_paid = if status == "paid" { total } else { 0 };
    serde_json::json!({
        "id": id,
        "object": "invoice",
        "customer": customer,
        "status": status,
        "currency": "usd",
        "total": total,
        "amount_paid": amount_paid,
        "lines": { "data": data },
    })
}

pub fn charge_object(id: &str, invoice: &str, refunded: bool) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "object": "charge",
        "invoice": invoice,
        "refunded": refunded,
        "amount_refunded": if refunded { 5000 } else { 0 },
    })
}
