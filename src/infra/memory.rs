//! In-process document store for development and tests.
//!
//! Same contract as the Postgres store: version compare-and-swap on updates,
//! unique slugs and external ids, set-if-absent id links.

use {
    super::store::{DocumentStore, StoreResult},
    crate::domain::{
        audit::{NewAuditEntry, ProcessedEvent, SyncFailure},
        error::SyncError,
        id::{CustomerExtId, EventId, InvoiceId, PriceExtId, ProductExtId},
        order::Order,
        price::Price,
        product::Product,
        sync::SyncState,
        user::User,
    },
    chrono::Utc,
    std::{
        collections::HashMap,
        sync::{Mutex, PoisonError},
    },
    uuid::Uuid,
};

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    prices: HashMap<Uuid, Price>,
    users: HashMap<Uuid, User>,
    orders: HashMap<String, Order>,
    processed: HashMap<String, ProcessedEvent>,
    audit: Vec<NewAuditEntry>,
    failures: Vec<SyncFailure>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

fn ready<'a, T: Send + 'a>(value: Result<T, SyncError>) -> StoreResult<'a, T> {
    Box::pin(std::future::ready(value))
}

fn check_version(kind: &str, id: Uuid, stored: i64, expected: i64) -> Result<(), SyncError> {
    if stored != expected {
        return Err(SyncError::Conflict(format!(
            "{kind} {id} is at version {stored}, write expected {expected}"
        )));
    }
    Ok(())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T, SyncError>) -> Result<T, SyncError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Audit entries in insertion order.
    pub fn audit_entries(&self) -> Vec<NewAuditEntry> {
        self.with(|inner| Ok(inner.audit.clone())).unwrap_or_default()
    }

    pub fn order_count(&self) -> usize {
        self.with(|inner| Ok(inner.orders.len())).unwrap_or_default()
    }

    pub fn product_count(&self) -> usize {
        self.with(|inner| Ok(inner.products.len())).unwrap_or_default()
    }
}

impl DocumentStore for InMemoryStore {
    fn product(&self, id: Uuid) -> StoreResult<'_, Option<Product>> {
        ready(self.with(|inner| Ok(inner.products.get(&id).cloned())))
    }

    fn product_by_slug<'a>(&'a self, slug: &'a str) -> StoreResult<'a, Option<Product>> {
        ready(self.with(|inner| {
            Ok(inner.products.values().find(|p| p.slug == slug).cloned())
        }))
    }

    fn product_by_external_id<'a>(
        &'a self,
        id: &'a ProductExtId,
    ) -> StoreResult<'a, Option<Product>> {
        ready(self.with(|inner| {
            Ok(inner
                .products
                .values()
                .find(|p| p.external_id.as_ref() == Some(id))
                .cloned())
        }))
    }

    fn insert_product<'a>(&'a self, product: &'a Product) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            let clash = inner.products.values().any(|p| {
                p.id == product.id
                    || p.slug == product.slug
                    || (product.external_id.is_some() && p.external_id == product.external_id)
            });
            if clash {
                return Err(SyncError::Conflict(format!(
                    "product with slug {} or the same external id already exists",
                    product.slug
                )));
            }
            inner.products.insert(product.id, product.clone());
            Ok(())
        }))
    }

    fn update_product<'a>(&'a self, product: &'a Product) -> StoreResult<'a, Product> {
        ready(self.with(|inner| {
            let stored = inner
                .products
                .get(&product.id)
                .ok_or_else(|| SyncError::NotFound(format!("product {}", product.id)))?;
            check_version("product", product.id, stored.version, product.version)?;
            if inner
                .products
                .values()
                .any(|p| p.id != product.id && p.slug == product.slug)
            {
                return Err(SyncError::Validation(format!(
                    "slug {} is already taken",
                    product.slug
                )));
            }
            let mut next = product.clone();
            // External id only moves through set_product_external_id.
            next.external_id = stored.external_id.clone().or(next.external_id);
            next.version += 1;
            next.updated_at = Utc::now();
            inner.products.insert(next.id, next.clone());
            Ok(next)
        }))
    }

    fn set_product_external_id<'a>(
        &'a self,
        id: Uuid,
        external_id: &'a ProductExtId,
    ) -> StoreResult<'a, ProductExtId> {
        ready(self.with(|inner| {
            let taken = inner
                .products
                .values()
                .any(|p| p.id != id && p.external_id.as_ref() == Some(external_id));
            if taken {
                return Err(SyncError::Conflict(format!(
                    "{external_id} is mirrored by another product"
                )));
            }
            let product = inner
                .products
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(format!("product {id}")))?;
            Ok(product
                .external_id
                .get_or_insert_with(|| external_id.clone())
                .clone())
        }))
    }

    fn set_product_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            let product = inner
                .products
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(format!("product {id}")))?;
            product.sync_state = state;
            product.sync_error = error.map(str::to_string);
            Ok(())
        }))
    }

    fn mark_product_synced(&self, id: Uuid, version: i64) -> StoreResult<'_, bool> {
        ready(self.with(|inner| {
            let product = inner
                .products
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(format!("product {id}")))?;
            if product.version != version {
                return Ok(false);
            }
            product.sync_state = SyncState::Synced;
            product.sync_error = None;
            Ok(true)
        }))
    }

    fn price(&self, id: Uuid) -> StoreResult<'_, Option<Price>> {
        ready(self.with(|inner| Ok(inner.prices.get(&id).cloned())))
    }

    fn price_by_external_id<'a>(&'a self, id: &'a PriceExtId) -> StoreResult<'a, Option<Price>> {
        ready(self.with(|inner| {
            Ok(inner
                .prices
                .values()
                .find(|p| p.external_id.as_ref() == Some(id))
                .cloned())
        }))
    }

    fn prices_for_product(&self, product_id: Uuid) -> StoreResult<'_, Vec<Price>> {
        ready(self.with(|inner| {
            let mut prices: Vec<Price> = inner
                .prices
                .values()
                .filter(|p| p.product_id == product_id)
                .cloned()
                .collect();
            prices.sort_by_key(|p| p.created_at);
            Ok(prices)
        }))
    }

    fn insert_price<'a>(&'a self, price: &'a Price) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            if !inner.products.contains_key(&price.product_id) {
                return Err(SyncError::NotFound(format!("product {}", price.product_id)));
            }
            let clash = inner.prices.values().any(|p| {
                p.id == price.id
                    || (price.external_id.is_some() && p.external_id == price.external_id)
            });
            if clash {
                return Err(SyncError::Conflict(format!(
                    "price {} or its external id already exists",
                    price.id
                )));
            }
            inner.prices.insert(price.id, price.clone());
            Ok(())
        }))
    }

    fn update_price<'a>(&'a self, price: &'a Price) -> StoreResult<'a, Price> {
        ready(self.with(|inner| {
            let stored = inner
                .prices
                .get(&price.id)
                .ok_or_else(|| SyncError::NotFound(format!("price {}", price.id)))?;
            check_version("price", price.id, stored.version, price.version)?;
            let mut next = price.clone();
            next.external_id = stored.external_id.clone().or(next.external_id);
            next.version += 1;
            next.updated_at = Utc::now();
            inner.prices.insert(next.id, next.clone());
            Ok(next)
        }))
    }

    fn set_price_external_id<'a>(
        &'a self,
        id: Uuid,
        external_id: &'a PriceExtId,
    ) -> StoreResult<'a, PriceExtId> {
        ready(self.with(|inner| {
            let taken = inner
                .prices
                .values()
                .any(|p| p.id != id && p.external_id.as_ref() == Some(external_id));
            if taken {
                return Err(SyncError::Conflict(format!(
                    "{external_id} is mirrored by another price"
                )));
            }
            let price = inner
                .prices
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(format!("price {id}")))?;
            Ok(price
                .external_id
                .get_or_insert_with(|| external_id.clone())
                .clone())
        }))
    }

    fn set_price_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            let price = inner
                .prices
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(format!("price {id}")))?;
            price.sync_state = state;
            price.sync_error = error.map(str::to_string);
            Ok(())
        }))
    }

    fn mark_price_synced(&self, id: Uuid, version: i64) -> StoreResult<'_, bool> {
        ready(self.with(|inner| {
            let price = inner
                .prices
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(format!("price {id}")))?;
            if price.version != version {
                return Ok(false);
            }
            price.sync_state = SyncState::Synced;
            price.sync_error = None;
            Ok(true)
        }))
    }

    fn user(&self, id: Uuid) -> StoreResult<'_, Option<User>> {
        ready(self.with(|inner| Ok(inner.users.get(&id).cloned())))
    }

    fn user_by_customer<'a>(
        &'a self,
        customer: &'a CustomerExtId,
    ) -> StoreResult<'a, Option<User>> {
        ready(self.with(|inner| {
            Ok(inner
                .users
                .values()
                .find(|u| u.customer_id.as_ref() == Some(customer))
                .cloned())
        }))
    }

    fn insert_user<'a>(&'a self, user: &'a User) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            if inner
                .users
                .values()
                .any(|u| u.id == user.id || u.email == user.email)
            {
                return Err(SyncError::Conflict(format!(
                    "user with email {} already exists",
                    user.email
                )));
            }
            inner.users.insert(user.id, user.clone());
            Ok(())
        }))
    }

    fn update_user<'a>(&'a self, user: &'a User) -> StoreResult<'a, User> {
        ready(self.with(|inner| {
            let stored = inner
                .users
                .get(&user.id)
                .ok_or_else(|| SyncError::NotFound(format!("user {}", user.id)))?;
            check_version("user", user.id, stored.version, user.version)?;
            let mut next = user.clone();
            next.customer_id = stored.customer_id.clone().or(next.customer_id);
            next.version += 1;
            next.updated_at = Utc::now();
            inner.users.insert(next.id, next.clone());
            Ok(next)
        }))
    }

    fn link_customer<'a>(
        &'a self,
        user_id: Uuid,
        customer: &'a CustomerExtId,
    ) -> StoreResult<'a, CustomerExtId> {
        ready(self.with(|inner| {
            let user = inner
                .users
                .get_mut(&user_id)
                .ok_or_else(|| SyncError::NotFound(format!("user {user_id}")))?;
            Ok(user
                .customer_id
                .get_or_insert_with(|| customer.clone())
                .clone())
        }))
    }

    fn set_user_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            let user = inner
                .users
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(format!("user {id}")))?;
            user.sync_state = state;
            user.sync_error = error.map(str::to_string);
            Ok(())
        }))
    }

    fn order_by_invoice<'a>(&'a self, invoice: &'a InvoiceId) -> StoreResult<'a, Option<Order>> {
        ready(self.with(|inner| Ok(inner.orders.get(invoice.as_str()).cloned())))
    }

    fn insert_order<'a>(&'a self, order: &'a Order) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            if inner.orders.contains_key(order.invoice_id.as_str()) {
                return Err(SyncError::Conflict(format!(
                    "order for {} already exists",
                    order.invoice_id
                )));
            }
            inner
                .orders
                .insert(order.invoice_id.as_str().to_string(), order.clone());
            Ok(())
        }))
    }

    fn update_order<'a>(&'a self, order: &'a Order) -> StoreResult<'a, Order> {
        ready(self.with(|inner| {
            let stored = inner.orders.get(order.invoice_id.as_str()).ok_or_else(|| {
                SyncError::NotFound(format!("order for {}", order.invoice_id))
            })?;
            check_version("order", order.id, stored.version, order.version)?;
            let mut next = order.clone();
            // Creation line items and identity are frozen.
            next.id = stored.id;
            next.lines = stored.lines.clone();
            next.version += 1;
            next.updated_at = Utc::now();
            inner
                .orders
                .insert(next.invoice_id.as_str().to_string(), next.clone());
            Ok(next)
        }))
    }

    fn is_event_processed<'a>(&'a self, event_id: &'a EventId) -> StoreResult<'a, bool> {
        ready(self.with(|inner| Ok(inner.processed.contains_key(event_id.as_str()))))
    }

    fn mark_event_processed<'a>(&'a self, event: &'a ProcessedEvent) -> StoreResult<'a, bool> {
        ready(self.with(|inner| {
            let key = event.event_id.as_str().to_string();
            if inner.processed.contains_key(&key) {
                return Ok(false);
            }
            inner.processed.insert(key, event.clone());
            Ok(true)
        }))
    }

    fn insert_audit_entry<'a>(&'a self, entry: &'a NewAuditEntry) -> StoreResult<'a, bool> {
        ready(self.with(|inner| {
            if inner.audit.iter().any(|e| e.event_id == entry.event_id) {
                return Ok(false);
            }
            inner.audit.push(entry.clone());
            Ok(true)
        }))
    }

    fn record_sync_failure<'a>(&'a self, failure: &'a SyncFailure) -> StoreResult<'a, ()> {
        ready(self.with(|inner| {
            inner.failures.push(failure.clone());
            Ok(())
        }))
    }

    fn sync_failures(&self, limit: i64) -> StoreResult<'_, Vec<SyncFailure>> {
        ready(self.with(|inner| {
            let limit = usize::try_from(limit).unwrap_or(0);
            Ok(inner.failures.iter().rev().take(limit).cloned().collect())
        }))
    }
}
