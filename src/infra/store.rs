use {
    crate::domain::{
        audit::{NewAuditEntry, ProcessedEvent, SyncFailure},
        error::SyncError,
        id::{CustomerExtId, EventId, InvoiceId, PriceExtId, ProductExtId},
        order::Order,
        platform::BoxFuture,
        price::Price,
        product::Product,
        sync::SyncState,
        user::User,
    },
    uuid::Uuid,
};

pub type StoreResult<'a, T> = BoxFuture<'a, Result<T, SyncError>>;

/// Document store contract.
///
/// Every `update_*` is a compare-and-swap on `version`: it succeeds only if
/// the stored version equals the passed document's version, stores the
/// document with `version + 1` and returns it. A mismatch is
/// `SyncError::Conflict`; callers reread and reapply.
///
/// `set_*_external_id` and `link_customer` are set-if-absent and return the
/// id that ended up stored.
pub trait DocumentStore: Send + Sync {
    // Products
    fn product(&self, id: Uuid) -> StoreResult<'_, Option<Product>>;
    fn product_by_slug<'a>(&'a self, slug: &'a str) -> StoreResult<'a, Option<Product>>;
    fn product_by_external_id<'a>(
        &'a self,
        id: &'a ProductExtId,
    ) -> StoreResult<'a, Option<Product>>;
    fn insert_product<'a>(&'a self, product: &'a Product) -> StoreResult<'a, ()>;
    fn update_product<'a>(&'a self, product: &'a Product) -> StoreResult<'a, Product>;
    fn set_product_external_id<'a>(
        &'a self,
        id: Uuid,
        external_id: &'a ProductExtId,
    ) -> StoreResult<'a, ProductExtId>;
    fn set_product_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()>;
    /// Mark `Synced` only while the product is still at `version`. False
    /// when a newer edit has landed since, whose own push owns the state.
    fn mark_product_synced(&self, id: Uuid, version: i64) -> StoreResult<'_, bool>;

    // Prices
    fn price(&self, id: Uuid) -> StoreResult<'_, Option<Price>>;
    fn price_by_external_id<'a>(&'a self, id: &'a PriceExtId) -> StoreResult<'a, Option<Price>>;
    fn prices_for_product(&self, product_id: Uuid) -> StoreResult<'_, Vec<Price>>;
    fn insert_price<'a>(&'a self, price: &'a Price) -> StoreResult<'a, ()>;
    fn update_price<'a>(&'a self, price: &'a Price) -> StoreResult<'a, Price>;
    fn set_price_external_id<'a>(
        &'a self,
        id: Uuid,
        external_id: &'a PriceExtId,
    ) -> StoreResult<'a, PriceExtId>;
    fn set_price_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()>;
    fn mark_price_synced(&self, id: Uuid, version: i64) -> StoreResult<'_, bool>;

    // Users
    fn user(&self, id: Uuid) -> StoreResult<'_, Option<User>>;
    fn user_by_customer<'a>(&'a self, customer: &'a CustomerExtId)
    -> StoreResult<'a, Option<User>>;
    fn insert_user<'a>(&'a self, user: &'a User) -> StoreResult<'a, ()>;
    fn update_user<'a>(&'a self, user: &'a User) -> StoreResult<'a, User>;
    fn link_customer<'a>(
        &'a self,
        user_id: Uuid,
        customer: &'a CustomerExtId,
    ) -> StoreResult<'a, CustomerExtId>;
    fn set_user_sync_state<'a>(
        &'a self,
        id: Uuid,
        state: SyncState,
        error: Option<&'a str>,
    ) -> StoreResult<'a, ()>;

    // Orders
    fn order_by_invoice<'a>(&'a self, invoice: &'a InvoiceId) -> StoreResult<'a, Option<Order>>;
    /// `Conflict` if an order for the same invoice already exists.
    fn insert_order<'a>(&'a self, order: &'a Order) -> StoreResult<'a, ()>;
    fn update_order<'a>(&'a self, order: &'a Order) -> StoreResult<'a, Order>;

    // Ledgers
    fn is_event_processed<'a>(&'a self, event_id: &'a EventId) -> StoreResult<'a, bool>;
    /// Returns `false` if the event was already recorded.
    fn mark_event_processed<'a>(&'a self, event: &'a ProcessedEvent) -> StoreResult<'a, bool>;
    /// Returns `false` if an entry for the same event id already exists.
    fn insert_audit_entry<'a>(&'a self, entry: &'a NewAuditEntry) -> StoreResult<'a, bool>;
    fn record_sync_failure<'a>(&'a self, failure: &'a SyncFailure) -> StoreResult<'a, ()>;
    fn sync_failures(&self, limit: i64) -> StoreResult<'_, Vec<SyncFailure>>;
}
