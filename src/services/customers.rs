use {
    crate::{
        domain::{
            error::SyncError,
            id::CustomerExtId,
            platform::{CustomerDraft, PaymentPlatform},
            sync::SyncState,
            user::User,
        },
        infra::store::DocumentStore,
        services::{
            locks::KeyedLocks,
            retry::{BackoffPolicy, with_backoff},
        },
    },
    std::sync::Arc,
    uuid::Uuid,
};

/// Gives every user exactly one platform customer, created on first need.
pub struct CustomerProvisioner {
    store: Arc<dyn DocumentStore>,
    platform: Arc<dyn PaymentPlatform>,
    locks: KeyedLocks<Uuid>,
    policy: BackoffPolicy,
}

impl CustomerProvisioner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        platform: Arc<dyn PaymentPlatform>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            locks: KeyedLocks::new(),
            policy,
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        &*self.store
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Return the user's platform customer id, creating and linking one if
    /// the user has none yet.
    ///
    /// Calls for the same user are serialized; the stored link is
    /// set-if-absent, so a writer in another process that linked first wins
    /// and its id is returned.
    #[tracing::instrument(name = "ensure_customer", skip_all, fields(user_id = %user.id))]
    pub async fn ensure_customer(&self, user: &User) -> Result<CustomerExtId, SyncError> {
        if let Some(existing) = &user.customer_id {
            return Ok(existing.clone());
        }

        let _guard = self.locks.lock(user.id).await;

        // Whoever held the lock before us may have linked one already.
        let current = self
            .store
            .user(user.id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("user {}", user.id)))?;
        if let Some(existing) = &current.customer_id {
            return Ok(existing.clone());
        }

        let draft = &CustomerDraft::from(&current);
        let platform = &*self.platform;
        // Lookup runs on every attempt so a create that timed out but landed
        // is found instead of duplicated.
        let (customer, created) = with_backoff(&self.policy, "ensure_customer", || async move {
            if let Some(found) = platform.find_customer_by_email(&draft.email).await? {
                return Ok((found, false));
            }
            let created = platform.create_customer(draft).await?;
            Ok((created, true))
        })
        .await
        .map_err(|gave_up| gave_up.error)?;

        let stored = self.store.link_customer(current.id, &customer).await?;
        if stored != customer {
            tracing::warn!(
                kept = %stored,
                discarded = %customer,
                "user was linked to a customer concurrently"
            );
        }
        self.store
            .set_user_sync_state(current.id, SyncState::Synced, None)
            .await?;

        tracing::info!(customer_id = %stored, created, "customer linked");
        Ok(stored)
    }
}
