//! Mirrors platform product and price changes into local documents.
//!
//! Writes carry a remote-origin [`WriteContext`], so outbound sync hooks see
//! them and stay quiet.

use {
    crate::{
        domain::{
            error::SyncError,
            event::{CMS_ID_METADATA_KEY, PriceObject, ProductObject, VerifiedEvent},
            id::{PriceExtId, ProductExtId},
            money::{Currency, Money, MoneyAmount},
            outcome::ProcessResult,
            platform::BoxFuture,
            price::{Interval, NewPrice, Price, PricePatch, Recurring},
            product::{NewProduct, Product, ProductPatch, slugify},
            sync::WriteContext,
        },
        infra::store::DocumentStore,
        services::{
            dispatch::EventHandler,
            documents::{Documents, Written},
            locks::KeyedLocks,
        },
    },
    std::{collections::HashMap, sync::Arc},
    uuid::Uuid,
};

pub const WEBHOOK_ACTOR: &str = "webhook:stripe";

fn remote_ctx() -> WriteContext {
    WriteContext::remote(WEBHOOK_ACTOR)
}

fn cms_id(metadata: &HashMap<String, String>) -> Option<Uuid> {
    metadata
        .get(CMS_ID_METADATA_KEY)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn is_stale(remote_synced_at: Option<i64>, event_at: i64) -> bool {
    remote_synced_at.is_some_and(|applied| event_at < applied)
}

/// `fields_changed` separates a real edit from a write that only advanced
/// `remote_synced_at`.
fn written_result(written: &Written<impl HasId>, fields_changed: bool, stale: bool) -> ProcessResult {
    let id = written.doc.id();
    if written.changed && fields_changed {
        ProcessResult::Updated(id)
    } else if stale {
        ProcessResult::Stale(id)
    } else {
        ProcessResult::Unchanged(id)
    }
}

trait HasId {
    fn id(&self) -> Uuid;
}

impl HasId for Product {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for Price {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Find the local product mirroring `external_id`: by external id first,
/// then by the local id stamped into metadata by outbound create. A product
/// found through metadata gets its external id linked on the way.
async fn locate_product(
    store: &dyn DocumentStore,
    external_id: &ProductExtId,
    metadata: &HashMap<String, String>,
) -> Result<Option<Product>, SyncError> {
    if let Some(product) = store.product_by_external_id(external_id).await? {
        return Ok(Some(product));
    }
    let Some(local_id) = cms_id(metadata) else {
        return Ok(None);
    };
    match store.product(local_id).await? {
        Some(product) if product.external_id.is_none() => {
            store.set_product_external_id(product.id, external_id).await?;
            Ok(store.product(product.id).await?)
        }
        _ => Ok(None),
    }
}

/// A slug not yet taken, derived from the title or the external id.
async fn free_slug(
    store: &dyn DocumentStore,
    title: &str,
    external_id: &ProductExtId,
) -> Result<String, SyncError> {
    let suffix = slugify(external_id.as_str().trim_start_matches(ProductExtId::PREFIX));
    let base = match slugify(title) {
        base if base.is_empty() => format!("product-{suffix}"),
        base => base,
    };
    if store.product_by_slug(&base).await?.is_none() {
        return Ok(base);
    }
    Ok(format!("{base}-{suffix}"))
}

/// Create the local mirror of a platform product. A concurrent creator that
/// won the unique external id is picked up instead.
async fn create_product_mirror(
    documents: &Documents,
    new: NewProduct,
    external_id: &ProductExtId,
) -> Result<(Product, bool), SyncError> {
    match documents.create_product(new, &remote_ctx()).await {
        Ok(product) => Ok((product, true)),
        Err(SyncError::Conflict(reason)) => {
            let existing = documents
                .store()
                .product_by_external_id(external_id)
                .await?
                .ok_or(SyncError::Conflict(reason))?;
            Ok((existing, false))
        }
        Err(e) => Err(e),
    }
}

/// `product.created` / `product.updated`.
pub struct ProductSync {
    documents: Arc<Documents>,
    locks: KeyedLocks<String>,
}

impl ProductSync {
    pub fn new(documents: Arc<Documents>) -> Self {
        Self {
            documents,
            locks: KeyedLocks::new(),
        }
    }

    #[tracing::instrument(name = "product_sync", skip_all, fields(product = %object.id))]
    pub async fn apply(
        &self,
        object: &ProductObject,
        event_at: i64,
    ) -> Result<ProcessResult, SyncError> {
        let external_id = ProductExtId::new(&object.id)?;
        let _guard = self.locks.lock(external_id.as_str().to_string()).await;
        let store = &**self.documents.store();

        let existing = locate_product(store, &external_id, &object.metadata).await?;
        let product = match existing {
            Some(product) => product,
            None => {
                let slug = free_slug(store, &object.name, &external_id).await?;
                let new = NewProduct {
                    title: object.name.clone(),
                    slug: Some(slug),
                    description: object.description.clone(),
                    active: object.active,
                    external_id: Some(external_id.clone()),
                    remote_synced_at: Some(event_at),
                };
                let (product, created) = create_product_mirror(&self.documents, new, &external_id).await?;
                if created {
                    tracing::info!(product_id = %product.id, "mirrored product first seen on the platform");
                    return Ok(ProcessResult::Created(product.id));
                }
                product
            }
        };

        let mut stale = false;
        let mut fields_changed = false;
        let written = self
            .documents
            .update_product(product.id, &remote_ctx(), |current| {
                if is_stale(current.remote_synced_at, event_at) {
                    stale = true;
                    return Ok(None);
                }
                let mut patch = ProductPatch {
                    title: Some(object.name.clone()),
                    description: Some(object.description.clone()),
                    active: Some(object.active),
                    ..ProductPatch::default()
                };
                fields_changed = patch.changes(current);
                // The clock advances even when no field does.
                patch.remote_synced_at = Some(event_at);
                Ok(Some(patch))
            })
            .await?;

        if stale {
            tracing::info!(product_id = %product.id, event_at, "older product event, skipped");
        }
        Ok(written_result(&written, fields_changed, stale))
    }
}

impl EventHandler for ProductSync {
    fn handle<'a>(
        &'a self,
        event: &'a VerifiedEvent,
    ) -> BoxFuture<'a, Result<ProcessResult, SyncError>> {
        Box::pin(async move {
            let object: ProductObject = event.object_as()?;
            self.apply(&object, event.created()).await
        })
    }
}

struct PriceTerms {
    money: Money,
    recurring: Option<Recurring>,
}

impl TryFrom<&PriceObject> for PriceTerms {
    type Error = SyncError;

    fn try_from(object: &PriceObject) -> Result<Self, Self::Error> {
        let amount = object.unit_amount.ok_or_else(|| {
            SyncError::Validation(format!(
                "price {} has no unit_amount (tiered or custom pricing is not mirrored)",
                object.id
            ))
        })?;
        let money = Money::new(
            MoneyAmount::new(amount)?,
            Currency::try_from(object.currency.as_str())?,
        );
        let recurring = object
            .recurring
            .as_ref()
            .map(|r| {
                Ok::<_, SyncError>(Recurring {
                    interval: Interval::try_from(r.interval.as_str())?,
                    interval_count: r.interval_count.unwrap_or(1).max(1),
                })
            })
            .transpose()?;
        Ok(Self { money, recurring })
    }
}

/// `price.created` / `price.updated`.
pub struct PriceSync {
    documents: Arc<Documents>,
    locks: KeyedLocks<String>,
}

impl PriceSync {
    pub fn new(documents: Arc<Documents>) -> Self {
        Self {
            documents,
            locks: KeyedLocks::new(),
        }
    }

    /// Local product for the price's platform product. A product the CMS has
    /// never seen gets a stub mirror that its own product event fills in.
    async fn owning_product(&self, object: &PriceObject) -> Result<Product, SyncError> {
        let external_id = ProductExtId::new(object.product.id())?;
        let store = &**self.documents.store();
        if let Some(product) = locate_product(store, &external_id, &HashMap::new()).await? {
            return Ok(product);
        }

        let title = object
            .nickname
            .clone()
            .unwrap_or_else(|| external_id.as_str().to_string());
        let slug = free_slug(store, &title, &external_id).await?;
        let new = NewProduct {
            title,
            slug: Some(slug),
            description: None,
            active: true,
            external_id: Some(external_id.clone()),
            // Left unset so the product's own event is never considered stale.
            remote_synced_at: None,
        };
        let (product, created) = create_product_mirror(&self.documents, new, &external_id).await?;
        if created {
            tracing::warn!(
                product_id = %product.id,
                product = %external_id,
                "price references a product unknown locally, created stub mirror"
            );
        }
        Ok(product)
    }

    async fn locate(&self, object: &PriceObject, external_id: &PriceExtId) -> Result<Option<Price>, SyncError> {
        let store = &**self.documents.store();
        if let Some(price) = store.price_by_external_id(external_id).await? {
            return Ok(Some(price));
        }
        let Some(local_id) = cms_id(&object.metadata) else {
            return Ok(None);
        };
        match store.price(local_id).await? {
            Some(price) if price.external_id.is_none() => {
                store.set_price_external_id(price.id, external_id).await?;
                Ok(store.price(price.id).await?)
            }
            _ => Ok(None),
        }
    }

    #[tracing::instrument(name = "price_sync", skip_all, fields(price = %object.id))]
    pub async fn apply(
        &self,
        object: &PriceObject,
        event_at: i64,
    ) -> Result<ProcessResult, SyncError> {
        let external_id = PriceExtId::new(&object.id)?;
        let terms = PriceTerms::try_from(object)?;
        let _guard = self.locks.lock(external_id.as_str().to_string()).await;

        let price = match self.locate(object, &external_id).await? {
            Some(price) => price,
            None => {
                let product = self.owning_product(object).await?;
                let new = NewPrice {
                    product_id: product.id,
                    money: terms.money,
                    recurring: terms.recurring,
                    nickname: object.nickname.clone(),
                    active: object.active,
                    external_id: Some(external_id.clone()),
                    remote_synced_at: Some(event_at),
                };
                let price = self.documents.create_price(new, &remote_ctx()).await?;
                tracing::info!(price_id = %price.id, product_id = %product.id, "mirrored price first seen on the platform");
                return Ok(ProcessResult::Created(price.id));
            }
        };

        let mut stale = false;
        let mut fields_changed = false;
        let written = self
            .documents
            .update_price(price.id, &remote_ctx(), |current| {
                if is_stale(current.remote_synced_at, event_at) {
                    stale = true;
                    return Ok(None);
                }
                let mut patch = PricePatch {
                    money: Some(terms.money),
                    recurring: Some(terms.recurring),
                    nickname: Some(object.nickname.clone()),
                    active: Some(object.active),
                    ..PricePatch::default()
                };
                fields_changed = patch.changes(current);
                patch.remote_synced_at = Some(event_at);
                Ok(Some(patch))
            })
            .await?;

        if stale {
            tracing::info!(price_id = %price.id, event_at, "older price event, skipped");
        }
        Ok(written_result(&written, fields_changed, stale))
    }
}

impl EventHandler for PriceSync {
    fn handle<'a>(
        &'a self,
        event: &'a VerifiedEvent,
    ) -> BoxFuture<'a, Result<ProcessResult, SyncError>> {
        Box::pin(async move {
            let object: PriceObject = event.object_as()?;
            self.apply(&object, event.created()).await
        })
    }
}
