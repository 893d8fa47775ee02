mod audit_repo;
mod order_repo;
mod price_repo;
mod product_repo;
mod user_repo;

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
    sqlx::{PgPool, postgres::PgPoolOptions},
    uuid::Uuid,
};

const UNIQUE_VIOLATION: &str = "23505";

/// Unique-key violations become `Conflict`; everything else stays a database error.
fn conflict_on_unique(err: sqlx::Error, message: String) -> SyncError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            SyncError::Conflict(message)
        }
        _ => SyncError::Database(err),
    }
}

fn stale_version(kind: &str, id: Uuid, expected: i64) -> SyncError {
    SyncError::Conflict(format!(
        "{kind} {id} is missing or no longer at version {expected}"
    ))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, SyncError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), SyncError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.into()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DocumentStore for PgStore {
    fn product(&self, id: Uuid) -> StoreResult<'_, Option<Product>> {
        Box::pin(product_repo::find(&self.pool, id))
    }

    fn product_by_slug<'a>(&'a self, slug: &'a str) -> StoreResult<'a, Option<Product>> {
        Box::pin(product_repo::find_by_slug(&self.pool, slug))
    }

    fn product_by_external_id<'a>(
        &'a self,
        id: &'a ProductExtId,
    ) -> StoreResult<'a, Option<Product>> {
        Box::pin(product_repo::find_by_external_id(&self.pool, id))
    }

    fn insert_product<'a>(&'a self, product: &'a Product) -> StoreResult<'a, ()> {
        Box::pin(product_repo::insert(&self.pool, product))
    }

    fn update_product<'a>(&'a self, product: &'a Product) -> StoreResult<'a, Product> {
        Box::pin(product_repo::update(&self.pool, product))
    }

    fn set_product_external_id<'a>(
        &'a self,
        id: Uuid,
        external_id: &'a ProductExtId,
    ) -> StoreResult<'a, ProductExtId> {
        Box::pin(product_repo::set_external_id(&self.pool, id, external_id))
    }

    fn set_product_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()> {
        Box::pin(product_repo::set_sync_state(&self.pool, id, state, error))
    }

    fn mark_product_synced(&self, id: Uuid, version: i64) -> StoreResult<'_, bool> {
        Box::pin(product_repo::mark_synced(&self.pool, id, version))
    }

    fn price(&self, id: Uuid) -> StoreResult<'_, Option<Price>> {
        Box::pin(price_repo::find(&self.pool, id))
    }

    fn price_by_external_id<'a>(&'a self, id: &'a PriceExtId) -> StoreResult<'a, Option<Price>> {
        Box::pin(price_repo::find_by_external_id(&self.pool, id))
    }

    fn prices_for_product(&self, product_id: Uuid) -> StoreResult<'_, Vec<Price>> {
        Box::pin(price_repo::for_product(&self.pool, product_id))
    }

    fn insert_price<'a>(&'a self, price: &'a Price) -> StoreResult<'a, ()> {
        Box::pin(price_repo::insert(&self.pool, price))
    }

    fn update_price<'a>(&'a self, price: &'a Price) -> StoreResult<'a, Price> {
        Box::pin(price_repo::update(&self.pool, price))
    }

    fn set_price_external_id<'a>(
        &'a self,
        id: Uuid,
        external_id: &'a PriceExtId,
    ) -> StoreResult<'a, PriceExtId> {
        Box::pin(price_repo::set_external_id(&self.pool, id, external_id))
    }

    fn set_price_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()> {
        Box::pin(price_repo::set_sync_state(&self.pool, id, state, error))
    }

    fn mark_price_synced(&self, id: Uuid, version: i64) -> StoreResult<'_, bool> {
        Box::pin(price_repo::mark_synced(&self.pool, id, version))
    }

    fn user(&self, id: Uuid) -> StoreResult<'_, Option<User>> {
        Box::pin(user_repo::find(&self.pool, id))
    }

    fn user_by_customer<'a>(
        &'a self,
        customer: &'a CustomerExtId,
    ) -> StoreResult<'a, Option<User>> {
        Box::pin(user_repo::find_by_customer(&self.pool, customer))
    }

    fn insert_user<'a>(&'a self, user: &'a User) -> StoreResult<'a, ()> {
        Box::pin(user_repo::insert(&self.pool, user))
    }

    fn update_user<'a>(&'a self, user: &'a User) -> StoreResult<'a, User> {
        Box::pin(user_repo::update(&self.pool, user))
    }

    fn link_customer<'a>(
        &'a self,
        user_id: Uuid,
        customer: &'a CustomerExtId,
    ) -> StoreResult<'a, CustomerExtId> {
        Box::pin(user_repo::link_customer(&self.pool, user_id, customer))
    }

    fn set_user_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()> {
        Box::pin(user_repo::set_sync_state(&self.pool, id, state, error))
    }

    fn order_by_invoice<'a>(&'a self, invoice: &'a InvoiceId) -> StoreResult<'a, Option<Order>> {
        Box::pin(order_repo::find_by_invoice(&self.pool, invoice))
    }

    fn insert_order<'a>(&'a self, order: &'a Order) -> StoreResult<'a, ()> {
        Box::pin(order_repo::insert(&self.pool, order))
    }

    fn update_order<'a>(&'a self, order: &'a Order) -> StoreResult<'a, Order> {
        Box::pin(order_repo::update(&self.pool, order))
    }

    fn is_event_processed<'a>(&'a self, event_id: &'a EventId) -> StoreResult<'a, bool> {
        Box::pin(audit_repo::is_event_processed(&self.pool, event_id))
    }

    fn mark_event_processed<'a>(&'a self, event: &'a ProcessedEvent) -> StoreResult<'a, bool> {
        Box::pin(audit_repo::mark_event_processed(&self.pool, event))
    }

    fn insert_audit_entry<'a>(&'a self, entry: &'a NewAuditEntry) -> StoreResult<'a, bool> {
        Box::pin(audit_repo::insert_audit_entry(&self.pool, entry))
    }

    fn record_sync_failure<'a>(&'a self, failure: &'a SyncFailure) -> StoreResult<'a, ()> {
        Box::pin(audit_repo::record_sync_failure(&self.pool, failure))
    }

    fn sync_failures(&self, limit: i64) -> StoreResult<'_, Vec<SyncFailure>> {
        Box::pin(audit_repo::sync_failures(&self.pool, limit))
    }
}
