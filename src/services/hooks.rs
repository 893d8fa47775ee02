//! Before/after change hooks run around every document write.
//!
//! Before hooks may edit the incoming document or veto the write with an
//! error. After hooks observe the committed document; their failures are
//! logged and never undo the write.

use {
    crate::{
        domain::{
            audit::SyncFailure,
            error::SyncError,
            id::ProductExtId,
            platform::{BoxFuture, PaymentPlatform, PriceDraft, ProductDraft},
            price::{Price, terms_changed},
            product::{Product, slugify},
            sync::{SyncState, WriteContext},
            user::User,
        },
        infra::store::DocumentStore,
        services::{
            customers::CustomerProvisioner,
            retry::{BackoffPolicy, GaveUp, with_backoff},
        },
    },
    std::sync::Arc,
    uuid::Uuid,
};

pub trait BeforeChange<D>: Send + Sync {
    fn name(&self) -> &'static str;

    fn before_change(
        &self,
        doc: &mut D,
        previous: Option<&D>,
        ctx: &WriteContext,
    ) -> Result<(), SyncError>;
}

pub trait AfterChange<D>: Send + Sync {
    fn name(&self) -> &'static str;

    fn after_change<'a>(
        &'a self,
        doc: &'a D,
        previous: Option<&'a D>,
        ctx: &'a WriteContext,
    ) -> BoxFuture<'a, Result<(), SyncError>>;
}

/// Ordered hooks for one collection.
pub struct HookChain<D> {
    before: Vec<Arc<dyn BeforeChange<D>>>,
    after: Vec<Arc<dyn AfterChange<D>>>,
}

impl<D> Default for HookChain<D> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl<D: Sync> HookChain<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, hook: impl BeforeChange<D> + 'static) -> Self {
        self.before.push(Arc::new(hook));
        self
    }

    pub fn after(mut self, hook: impl AfterChange<D> + 'static) -> Self {
        self.after.push(Arc::new(hook));
        self
    }

    /// First error aborts the rest of the chain and the write.
    pub fn run_before(
        &self,
        doc: &mut D,
        previous: Option<&D>,
        ctx: &WriteContext,
    ) -> Result<(), SyncError> {
        for hook in &self.before {
            hook.before_change(doc, previous, ctx).map_err(|e| {
                tracing::debug!(hook = hook.name(), error = %e, "before-change hook rejected write");
                e
            })?;
        }
        Ok(())
    }

    pub async fn run_after(&self, doc: &D, previous: Option<&D>, ctx: &WriteContext) {
        for hook in &self.after {
            if let Err(e) = hook.after_change(doc, previous, ctx).await {
                tracing::error!(hook = hook.name(), error = %e, "after-change hook failed");
            }
        }
    }
}

// ── Before hooks ────────────────────────────────────────────────────────────

/// Title is required; slug is normalized and derived from the title when blank.
pub struct ProductSlug;

impl BeforeChange<Product> for ProductSlug {
    fn name(&self) -> &'static str {
        "product_slug"
    }

    fn before_change(
        &self,
        product: &mut Product,
        _previous: Option<&Product>,
        _ctx: &WriteContext,
    ) -> Result<(), SyncError> {
        let title = product.title.trim();
        if title.is_empty() {
            return Err(SyncError::Validation("product title is required".into()));
        }
        product.title = title.to_string();

        let source = if product.slug.trim().is_empty() {
            product.title.as_str()
        } else {
            product.slug.as_str()
        };
        let slug = slugify(source);
        if slug.is_empty() {
            return Err(SyncError::Validation(format!(
                "cannot derive a slug from {source:?}"
            )));
        }
        product.slug = slug;
        Ok(())
    }
}

/// Platform prices cannot change amount, currency or interval once created.
/// A local edit to a synced price's terms is rejected; archive it instead.
pub struct PriceTermsGuard;

impl BeforeChange<Price> for PriceTermsGuard {
    fn name(&self) -> &'static str {
        "price_terms_guard"
    }

    fn before_change(
        &self,
        price: &mut Price,
        previous: Option<&Price>,
        ctx: &WriteContext,
    ) -> Result<(), SyncError> {
        if ctx.is_remote() {
            return Ok(());
        }
        match previous {
            Some(prev) if prev.external_id.is_some() && terms_changed(prev, price) => {
                Err(SyncError::Validation(format!(
                    "price {} is already on the payment platform; its terms are immutable, \
                     archive it and create a new price",
                    prev.id
                )))
            }
            _ => Ok(()),
        }
    }
}

pub struct NormalizeEmail;

impl BeforeChange<User> for NormalizeEmail {
    fn name(&self) -> &'static str {
        "normalize_email"
    }

    fn before_change(
        &self,
        user: &mut User,
        _previous: Option<&User>,
        _ctx: &WriteContext,
    ) -> Result<(), SyncError> {
        let email = user.email.trim().to_ascii_lowercase();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                user.email = email;
                Ok(())
            }
            _ => Err(SyncError::Validation(format!(
                "invalid email address: {}",
                user.email
            ))),
        }
    }
}

// ── Outbound sync ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Products,
    Prices,
    Users,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Prices => "prices",
            Self::Users => "users",
        }
    }
}

async fn set_sync_state(
    store: &dyn DocumentStore,
    collection: Collection,
    id: Uuid,
    state: SyncState,
    error: Option<&str>,
) -> Result<(), SyncError> {
    match collection {
        Collection::Products => store.set_product_sync_state(id, state, error).await,
        Collection::Prices => store.set_price_sync_state(id, state, error).await,
        Collection::Users => store.set_user_sync_state(id, state, error).await,
    }
}

/// Keep the local write, flag the document and leave a durable record.
pub(crate) async fn record_outbound_failure(
    store: &dyn DocumentStore,
    collection: Collection,
    id: Uuid,
    operation: &str,
    gave_up: &GaveUp,
) -> Result<(), SyncError> {
    let message = gave_up.error.to_string();
    tracing::error!(
        collection = collection.as_str(),
        document_id = %id,
        operation,
        attempts = gave_up.attempts,
        error = %message,
        "outbound sync failed, document marked pending_remote_sync"
    );
    set_sync_state(
        store,
        collection,
        id,
        SyncState::PendingRemoteSync,
        Some(&message),
    )
    .await?;
    store
        .record_sync_failure(&SyncFailure::new(
            collection.as_str(),
            id,
            operation,
            message.clone(),
            gave_up.attempts,
        ))
        .await
}

/// A previously synced document whose mirrored fields did not move needs no call.
fn needs_push<D>(
    doc: &D,
    previous: Option<&D>,
    state: impl Fn(&D) -> SyncState,
    mirrored: impl Fn(&D, &D) -> bool,
) -> bool {
    match previous {
        None => true,
        Some(prev) => state(prev) != SyncState::Synced || !mirrored(prev, doc),
    }
}

fn has_description(product: &Product) -> bool {
    product
        .description
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty())
}

/// An update that empties a description the platform already holds.
fn description_cleared(product: &Product, previous: Option<&Product>) -> bool {
    previous.is_some_and(|prev| {
        prev.external_id.is_some() && has_description(prev) && !has_description(product)
    })
}

/// Creates or updates the platform product for locally authored writes.
pub struct ProductOutboundSync {
    store: Arc<dyn DocumentStore>,
    platform: Arc<dyn PaymentPlatform>,
    policy: BackoffPolicy,
}

impl ProductOutboundSync {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        platform: Arc<dyn PaymentPlatform>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            policy,
        }
    }

    async fn push(&self, product: &Product, previous: Option<&Product>) -> Result<(), SyncError> {
        let mirrored_same =
            |a: &Product, b: &Product| a.title == b.title && a.description == b.description && a.active == b.active;
        if product.external_id.is_some()
            && !needs_push(product, previous, |p| p.sync_state, mirrored_same)
        {
            return self.mark_synced(product).await;
        }

        let draft = &ProductDraft::from(product);
        let platform = &*self.platform;
        let (operation, result) = match &product.external_id {
            None => {
                let created = with_backoff(&self.policy, "create_product", move || {
                    platform.create_product(draft)
                })
                .await;
                ("create_product", created.map(Some))
            }
            Some(external_id) => {
                let updated = with_backoff(&self.policy, "update_product", move || {
                    platform.update_product(external_id, draft)
                })
                .await;
                ("update_product", updated.map(|()| None))
            }
        };

        match result {
            Ok(created) => {
                if let Some(external_id) = created {
                    self.write_back(product.id, &external_id).await?;
                }
                if description_cleared(product, previous) {
                    let gave_up = GaveUp {
                        error: SyncError::Validation(
                            "payment platform keeps the previous description, it cannot be cleared"
                                .into(),
                        ),
                        attempts: 1,
                    };
                    return record_outbound_failure(
                        &*self.store,
                        Collection::Products,
                        product.id,
                        operation,
                        &gave_up,
                    )
                    .await;
                }
                tracing::info!(product_id = %product.id, operation, "product synced to payment platform");
                self.mark_synced(product).await
            }
            Err(gave_up) => {
                record_outbound_failure(
                    &*self.store,
                    Collection::Products,
                    product.id,
                    operation,
                    &gave_up,
                )
                .await
            }
        }
    }

    async fn mark_synced(&self, product: &Product) -> Result<(), SyncError> {
        if !self.store.mark_product_synced(product.id, product.version).await? {
            tracing::debug!(
                product_id = %product.id,
                version = product.version,
                "product edited again during push, newer write owns its sync state"
            );
        }
        Ok(())
    }

    async fn write_back(&self, id: Uuid, external_id: &ProductExtId) -> Result<(), SyncError> {
        let stored = self.store.set_product_external_id(id, external_id).await?;
        if stored != *external_id {
            tracing::warn!(
                product_id = %id,
                kept = %stored,
                orphaned = %external_id,
                "product was linked concurrently, platform object left orphaned"
            );
        }
        Ok(())
    }
}

impl AfterChange<Product> for ProductOutboundSync {
    fn name(&self) -> &'static str {
        "product_outbound_sync"
    }

    fn after_change<'a>(
        &'a self,
        product: &'a Product,
        previous: Option<&'a Product>,
        ctx: &'a WriteContext,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move {
            if ctx.is_remote() {
                tracing::debug!(product_id = %product.id, "remote-origin write, outbound sync skipped");
                return Ok(());
            }
            self.push(product, previous).await
        })
    }
}

/// Creates or updates the platform price for locally authored writes.
pub struct PriceOutboundSync {
    store: Arc<dyn DocumentStore>,
    platform: Arc<dyn PaymentPlatform>,
    policy: BackoffPolicy,
}

impl PriceOutboundSync {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        platform: Arc<dyn PaymentPlatform>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            policy,
        }
    }

    async fn push(&self, price: &Price, previous: Option<&Price>) -> Result<(), SyncError> {
        let mirrored_same = |a: &Price, b: &Price| a.active == b.active && a.nickname == b.nickname;
        if price.external_id.is_some() && !needs_push(price, previous, |p| p.sync_state, mirrored_same)
        {
            return self.mark_synced(price).await;
        }

        let product_external_id = self
            .store
            .product(price.product_id)
            .await?
            .and_then(|p| p.external_id);
        let Some(product_external_id) = product_external_id else {
            let gave_up = GaveUp {
                error: SyncError::Validation(format!(
                    "product {} has no payment platform id yet",
                    price.product_id
                )),
                attempts: 0,
            };
            return record_outbound_failure(
                &*self.store,
                Collection::Prices,
                price.id,
                "create_price",
                &gave_up,
            )
            .await;
        };

        let draft = &PriceDraft::new(price, product_external_id);
        let platform = &*self.platform;
        let (operation, result) = match &price.external_id {
            None => {
                let created = with_backoff(&self.policy, "create_price", move || {
                    platform.create_price(draft)
                })
                .await;
                ("create_price", created.map(Some))
            }
            Some(external_id) => {
                let updated = with_backoff(&self.policy, "update_price", move || {
                    platform.update_price(external_id, draft)
                })
                .await;
                ("update_price", updated.map(|()| None))
            }
        };

        match result {
            Ok(created) => {
                if let Some(external_id) = created {
                    let stored = self.store.set_price_external_id(price.id, &external_id).await?;
                    if stored != external_id {
                        tracing::warn!(
                            price_id = %price.id,
                            kept = %stored,
                            orphaned = %external_id,
                            "price was linked concurrently, platform object left orphaned"
                        );
                    }
                }
                tracing::info!(price_id = %price.id, operation, "price synced to payment platform");
                self.mark_synced(price).await
            }
            Err(gave_up) => {
                record_outbound_failure(
                    &*self.store,
                    Collection::Prices,
                    price.id,
                    operation,
                    &gave_up,
                )
                .await
            }
        }
    }
}

impl PriceOutboundSync {
    async fn mark_synced(&self, price: &Price) -> Result<(), SyncError> {
        if !self.store.mark_price_synced(price.id, price.version).await? {
            tracing::debug!(
                price_id = %price.id,
                version = price.version,
                "price edited again during push, newer write owns its sync state"
            );
        }
        Ok(())
    }
}

impl AfterChange<Price> for PriceOutboundSync {
    fn name(&self) -> &'static str {
        "price_outbound_sync"
    }

    fn after_change<'a>(
        &'a self,
        price: &'a Price,
        previous: Option<&'a Price>,
        ctx: &'a WriteContext,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move {
            if ctx.is_remote() {
                tracing::debug!(price_id = %price.id, "remote-origin write, outbound sync skipped");
                return Ok(());
            }
            self.push(price, previous).await
        })
    }
}

/// Provisions the platform customer for users created locally.
pub struct ProvisionCustomerOnCreate {
    provisioner: Arc<CustomerProvisioner>,
}

impl ProvisionCustomerOnCreate {
    pub fn new(provisioner: Arc<CustomerProvisioner>) -> Self {
        Self { provisioner }
    }
}

impl AfterChange<User> for ProvisionCustomerOnCreate {
    fn name(&self) -> &'static str {
        "provision_customer_on_create"
    }

    fn after_change<'a>(
        &'a self,
        user: &'a User,
        previous: Option<&'a User>,
        ctx: &'a WriteContext,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move {
            if ctx.is_remote() || previous.is_some() || user.customer_id.is_some() {
                return Ok(());
            }
            match self.provisioner.ensure_customer(user).await {
                Ok(customer) => {
                    tracing::info!(user_id = %user.id, customer_id = %customer, "customer provisioned on signup");
                    Ok(())
                }
                Err(error) => {
                    let attempts = if error.is_retryable() {
                        self.provisioner.max_attempts()
                    } else {
                        1
                    };
                    let gave_up = GaveUp { error, attempts };
                    record_outbound_failure(
                        self.provisioner.store(),
                        Collection::Users,
                        user.id,
                        "ensure_customer",
                        &gave_up,
                    )
                    .await
                }
            }
        })
    }
}
