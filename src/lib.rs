pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod routes;
pub mod services;

use {
    adapters::{
        auth::{HeaderSessionResolver, SessionResolver},
        verifier::EventVerifier,
    },
    config::AppConfig,
    domain::{error::SyncError, event::EventKind, platform::PaymentPlatform},
    infra::store::DocumentStore,
    services::{
        checkout::CheckoutService,
        customers::CustomerProvisioner,
        dispatch::{EventHandler, EventProcessor, WebhookRegistry},
        documents::Documents,
        hooks::{
            HookChain, NormalizeEmail, PriceOutboundSync, PriceTermsGuard, ProductOutboundSync,
            ProductSlug, ProvisionCustomerOnCreate,
        },
        inbound::{PriceSync, ProductSync},
        orders::OrderMaterializer,
        retry::BackoffPolicy,
    },
    std::{sync::Arc, time::Duration},
};

/// Slack on top of the platform budget for local reads and writes.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub app_url: Arc<str>,
    pub verifier: Arc<EventVerifier>,
    pub events: Arc<EventProcessor>,
    pub checkout: Arc<CheckoutService>,
    pub sessions: Arc<dyn SessionResolver>,
    pub documents: Arc<Documents>,
    /// Outer bound on a request, long enough that platform failures surface
    /// as 502/504 from the handler rather than as a layer timeout.
    pub request_timeout: Duration,
}

/// Worst case of `POST /checkout`: customer provisioning (a lookup and a
/// create per attempt, with backoff) followed by one session call.
fn request_timeout(config: &AppConfig, policy: &BackoffPolicy) -> Duration {
    policy.worst_case(config.stripe_timeout.saturating_mul(2))
        + config.stripe_timeout
        + REQUEST_TIMEOUT_MARGIN
}

/// Wires services over the given store and platform.
///
/// The platform is used as-is; callers wrap it in a timeout decorator.
pub fn build_state(
    config: &AppConfig,
    store: Arc<dyn DocumentStore>,
    platform: Arc<dyn PaymentPlatform>,
) -> Result<AppState, SyncError> {
    let policy = BackoffPolicy::with_max_attempts(config.outbound_max_attempts);
    let provisioner = Arc::new(CustomerProvisioner::new(
        store.clone(),
        platform.clone(),
        policy,
    ));

    let documents = Arc::new(Documents::new(
        store.clone(),
        HookChain::new().before(ProductSlug).after(ProductOutboundSync::new(
            store.clone(),
            platform.clone(),
            policy,
        )),
        HookChain::new()
            .before(PriceTermsGuard)
            .after(PriceOutboundSync::new(store.clone(), platform.clone(), policy)),
        HookChain::new()
            .before(NormalizeEmail)
            .after(ProvisionCustomerOnCreate::new(provisioner.clone())),
    ));

    let products: Arc<dyn EventHandler> = Arc::new(ProductSync::new(documents.clone()));
    let prices: Arc<dyn EventHandler> = Arc::new(PriceSync::new(documents.clone()));
    let orders: Arc<dyn EventHandler> = Arc::new(OrderMaterializer::new(store.clone()));

    let mut registry = WebhookRegistry::new();
    for kind in &config.webhook_events {
        let handler = match kind {
            EventKind::ProductCreated | EventKind::ProductUpdated => products.clone(),
            EventKind::PriceCreated | EventKind::PriceUpdated => prices.clone(),
            EventKind::InvoiceCreated | EventKind::InvoiceUpdated | EventKind::ChargeRefunded => {
                orders.clone()
            }
        };
        registry.register(kind.as_str(), handler)?;
    }
    tracing::info!(events = ?registry.subscribed(), "webhook subscriptions registered");

    Ok(AppState {
        app_url: config.app_url.as_str().into(),
        verifier: Arc::new(EventVerifier::new(
            config.webhook_secret.clone(),
            config.webhook_tolerance_secs,
        )),
        events: Arc::new(EventProcessor::new(store.clone(), registry)),
        checkout: Arc::new(CheckoutService::new(
            store.clone(),
            platform,
            provisioner,
            config.app_url.clone(),
        )),
        sessions: Arc::new(HeaderSessionResolver::new(store)),
        documents,
        request_timeout: request_timeout(config, &policy),
    })
}
