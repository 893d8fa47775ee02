use {
    crate::{
        domain::{
            error::SyncError,
            price::{NewPrice, Price, PricePatch},
            product::{NewProduct, Product, ProductPatch},
            sync::{SyncOrigin, SyncState, WriteContext},
            user::{NewUser, User, UserPatch},
        },
        infra::store::DocumentStore,
        services::hooks::HookChain,
    },
    std::sync::Arc,
    uuid::Uuid,
};

/// Reread-and-reapply attempts before a version conflict is surfaced.
pub const MAX_CONFLICT_RETRIES: u32 = 5;

/// Result of an update: the stored document and whether anything was written.
#[derive(Debug, Clone)]
pub struct Written<D> {
    pub doc: D,
    pub changed: bool,
}

/// Write path for catalog and user documents.
///
/// Every write goes through the collection's hook chain with the caller's
/// [`WriteContext`]. Updates take an edit closure that runs against the
/// freshest stored copy on every attempt, so a lost version race is retried
/// by reapplying the edit rather than overwriting.
pub struct Documents {
    store: Arc<dyn DocumentStore>,
    products: HookChain<Product>,
    prices: HookChain<Price>,
    users: HookChain<User>,
}

impl Documents {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        products: HookChain<Product>,
        prices: HookChain<Price>,
        users: HookChain<User>,
    ) -> Self {
        Self {
            store,
            products,
            prices,
            users,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn create_product(
        &self,
        new: NewProduct,
        ctx: &WriteContext,
    ) -> Result<Product, SyncError> {
        let mut product = new.into_product(SyncState::for_origin(ctx.origin()));
        self.products.run_before(&mut product, None, ctx)?;
        self.store.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, slug = %product.slug, origin = ?ctx.origin(), "product created");

        self.products.run_after(&product, None, ctx).await;
        Ok(self.store.product(product.id).await?.unwrap_or(product))
    }

    /// `edit` returns `None` to leave the product as it is.
    pub async fn update_product<F>(
        &self,
        id: Uuid,
        ctx: &WriteContext,
        mut edit: F,
    ) -> Result<Written<Product>, SyncError>
    where
        F: FnMut(&Product) -> Result<Option<ProductPatch>, SyncError>,
    {
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let current = self
                .store
                .product(id)
                .await?
                .ok_or_else(|| SyncError::NotFound(format!("product {id}")))?;

            let Some(patch) = edit(&current)? else {
                return Ok(Written {
                    doc: current,
                    changed: false,
                });
            };
            if !patch.changes(&current) {
                return Ok(Written {
                    doc: current,
                    changed: false,
                });
            }

            let mut next = current.clone();
            patch.apply(&mut next);
            if ctx.origin() == SyncOrigin::Local {
                next.sync_state = SyncState::Syncing;
            }
            self.products.run_before(&mut next, Some(&current), ctx)?;

            let stored = match self.store.update_product(&next).await {
                Ok(stored) => stored,
                Err(SyncError::Conflict(reason)) => {
                    tracing::debug!(product_id = %id, attempt, %reason, "version conflict, rereading");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.products.run_after(&stored, Some(&current), ctx).await;
            let doc = self.store.product(id).await?.unwrap_or(stored);
            return Ok(Written { doc, changed: true });
        }
        Err(SyncError::Conflict(format!(
            "product {id} kept changing under {MAX_CONFLICT_RETRIES} attempts"
        )))
    }

    pub async fn patch_product(
        &self,
        id: Uuid,
        patch: ProductPatch,
        ctx: &WriteContext,
    ) -> Result<Written<Product>, SyncError> {
        self.update_product(id, ctx, |_| Ok(Some(patch.clone())))
            .await
    }

    pub async fn create_price(&self, new: NewPrice, ctx: &WriteContext) -> Result<Price, SyncError> {
        let mut price = new.into_price(SyncState::for_origin(ctx.origin()));
        self.prices.run_before(&mut price, None, ctx)?;
        self.store.insert_price(&price).await?;
        tracing::info!(price_id = %price.id, product_id = %price.product_id, origin = ?ctx.origin(), "price created");

        self.prices.run_after(&price, None, ctx).await;
        Ok(self.store.price(price.id).await?.unwrap_or(price))
    }

    pub async fn update_price<F>(
        &self,
        id: Uuid,
        ctx: &WriteContext,
        mut edit: F,
    ) -> Result<Written<Price>, SyncError>
    where
        F: FnMut(&Price) -> Result<Option<PricePatch>, SyncError>,
    {
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let current = self
                .store
                .price(id)
                .await?
                .ok_or_else(|| SyncError::NotFound(format!("price {id}")))?;

            let Some(patch) = edit(&current)? else {
                return Ok(Written {
                    doc: current,
                    changed: false,
                });
            };
            if !patch.changes(&current) {
                return Ok(Written {
                    doc: current,
                    changed: false,
                });
            }

            let mut next = current.clone();
            patch.apply(&mut next);
            if ctx.origin() == SyncOrigin::Local {
                next.sync_state = SyncState::Syncing;
            }
            self.prices.run_before(&mut next, Some(&current), ctx)?;

            let stored = match self.store.update_price(&next).await {
                Ok(stored) => stored,
                Err(SyncError::Conflict(reason)) => {
                    tracing::debug!(price_id = %id, attempt, %reason, "version conflict, rereading");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.prices.run_after(&stored, Some(&current), ctx).await;
            let doc = self.store.price(id).await?.unwrap_or(stored);
            return Ok(Written { doc, changed: true });
        }
        Err(SyncError::Conflict(format!(
            "price {id} kept changing under {MAX_CONFLICT_RETRIES} attempts"
        )))
    }

    pub async fn patch_price(
        &self,
        id: Uuid,
        patch: PricePatch,
        ctx: &WriteContext,
    ) -> Result<Written<Price>, SyncError> {
        self.update_price(id, ctx, |_| Ok(Some(patch.clone())))
            .await
    }

    pub async fn create_user(&self, new: NewUser, ctx: &WriteContext) -> Result<User, SyncError> {
        let mut user = new.into_user(SyncState::for_origin(ctx.origin()));
        self.users.run_before(&mut user, None, ctx)?;
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, "user created");

        self.users.run_after(&user, None, ctx).await;
        Ok(self.store.user(user.id).await?.unwrap_or(user))
    }

    pub async fn patch_user(
        &self,
        id: Uuid,
        patch: UserPatch,
        ctx: &WriteContext,
    ) -> Result<User, SyncError> {
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let current = self
                .store
                .user(id)
                .await?
                .ok_or_else(|| SyncError::NotFound(format!("user {id}")))?;

            let mut next = current.clone();
            patch.apply(&mut next);
            self.users.run_before(&mut next, Some(&current), ctx)?;

            match self.store.update_user(&next).await {
                Ok(stored) => {
                    self.users.run_after(&stored, Some(&current), ctx).await;
                    return Ok(stored);
                }
                Err(SyncError::Conflict(reason)) => {
                    tracing::debug!(user_id = %id, attempt, %reason, "version conflict, rereading");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SyncError::Conflict(format!(
            "user {id} kept changing under {MAX_CONFLICT_RETRIES} attempts"
        )))
    }
}
