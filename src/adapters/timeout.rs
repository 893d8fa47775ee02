use {
    crate::domain::{
        error::SyncError,
        id::{CustomerExtId, PriceExtId, ProductExtId},
        platform::{
            BoxFuture, CheckoutSession, CheckoutSessionRequest, CustomerDraft, PaymentPlatform,
            PriceDraft, ProductDraft,
        },
    },
    std::{future::Future, sync::Arc, time::Duration},
};

/// Bounds every platform call. Expiry is a failure, never a success.
pub struct TimeoutPlatform {
    inner: Arc<dyn PaymentPlatform>,
    timeout: Duration,
}

impl TimeoutPlatform {
    pub fn new(inner: Arc<dyn PaymentPlatform>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    fn bounded<'a, T: Send + 'a>(
        &'a self,
        operation: &'static str,
        call: impl Future<Output = Result<T, SyncError>> + Send + 'a,
    ) -> BoxFuture<'a, Result<T, SyncError>> {
        let timeout = self.timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout(format!(
                    "{operation} exceeded {}ms",
                    timeout.as_millis()
                ))),
            }
        })
    }
}

impl PaymentPlatform for TimeoutPlatform {
    fn create_product<'a>(
        &'a self,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<ProductExtId, SyncError>> {
        self.bounded("create_product", self.inner.create_product(draft))
    }

    fn update_product<'a>(
        &'a self,
        id: &'a ProductExtId,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        self.bounded("update_product", self.inner.update_product(id, draft))
    }

    fn create_price<'a>(
        &'a self,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<PriceExtId, SyncError>> {
        self.bounded("create_price", self.inner.create_price(draft))
    }

    fn update_price<'a>(
        &'a self,
        id: &'a PriceExtId,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        self.bounded("update_price", self.inner.update_price(id, draft))
    }

    fn find_customer_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerExtId>, SyncError>> {
        self.bounded(
            "find_customer_by_email",
            self.inner.find_customer_by_email(email),
        )
    }

    fn create_customer<'a>(
        &'a self,
        draft: &'a CustomerDraft,
    ) -> BoxFuture<'a, Result<CustomerExtId, SyncError>> {
        self.bounded("create_customer", self.inner.create_customer(draft))
    }

    fn create_checkout_session<'a>(
        &'a self,
        request: &'a CheckoutSessionRequest,
    ) -> BoxFuture<'a, Result<CheckoutSession, SyncError>> {
        self.bounded(
            "create_checkout_session",
            self.inner.create_checkout_session(request),
        )
    }
}
