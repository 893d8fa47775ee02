use {
    crate::domain::{
        error::SyncError,
        event::CMS_ID_METADATA_KEY,
        id::{CustomerExtId, PriceExtId, ProductExtId},
        money::Currency,
        platform::{
            BoxFuture, CheckoutLine, CheckoutMode, CheckoutSession, CheckoutSessionRequest,
            CustomerDraft, PaymentPlatform, PriceDraft, ProductDraft,
        },
        price::Interval,
    },
    std::collections::HashMap,
    uuid::Uuid,
};

/// [`PaymentPlatform`] backed by the Stripe API.
pub struct StripePlatform {
    client: stripe::Client,
}

impl StripePlatform {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }
}

fn api_error(e: stripe::StripeError) -> SyncError {
    SyncError::Remote(format!("Stripe API: {e}"))
}

fn cms_metadata(local_id: Uuid) -> HashMap<String, String> {
    HashMap::from([(CMS_ID_METADATA_KEY.to_string(), local_id.to_string())])
}

pub fn convert_currency(c: Currency) -> stripe::Currency {
    match c {
        Currency::Usd => stripe::Currency::USD,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
        Currency::Jpy => stripe::Currency::JPY,
        Currency::Cad => stripe::Currency::CAD,
        Currency::Aud => stripe::Currency::AUD,
    }
}

fn convert_interval(interval: Interval) -> stripe::CreatePriceRecurringInterval {
    match interval {
        Interval::Day => stripe::CreatePriceRecurringInterval::Day,
        Interval::Week => stripe::CreatePriceRecurringInterval::Week,
        Interval::Month => stripe::CreatePriceRecurringInterval::Month,
        Interval::Year => stripe::CreatePriceRecurringInterval::Year,
    }
}

fn convert_mode(mode: CheckoutMode) -> stripe::CheckoutSessionMode {
    match mode {
        CheckoutMode::Payment => stripe::CheckoutSessionMode::Payment,
        CheckoutMode::Subscription => stripe::CheckoutSessionMode::Subscription,
    }
}

/// The platform cannot unset a product description, so an empty one is left
/// out and the outbound hook records the divergence.
fn product_update_params(draft: &ProductDraft) -> stripe::UpdateProduct<'_> {
    let mut params = stripe::UpdateProduct::new();
    params.name = Some(&draft.name);
    params.description = draft
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(str::to_string);
    params.active = Some(draft.active);
    params.metadata = Some(cms_metadata(draft.local_id));
    params
}

fn line_item(line: &CheckoutLine) -> stripe::CreateCheckoutSessionLineItems {
    stripe::CreateCheckoutSessionLineItems {
        price: Some(line.price.as_str().to_string()),
        quantity: Some(line.quantity),
        ..Default::default()
    }
}

impl StripePlatform {
    async fn create_product_inner(&self, draft: &ProductDraft) -> Result<ProductExtId, SyncError> {
        let mut params = stripe::CreateProduct::new(&draft.name);
        params.description = draft.description.as_deref();
        params.active = Some(draft.active);
        params.metadata = Some(cms_metadata(draft.local_id));

        let product = stripe::Product::create(&self.client, params)
            .await
            .map_err(api_error)?;
        ProductExtId::new(product.id.to_string())
    }

    async fn update_product_inner(
        &self,
        id: &ProductExtId,
        draft: &ProductDraft,
    ) -> Result<(), SyncError> {
        let product_id = id
            .as_str()
            .parse::<stripe::ProductId>()
            .map_err(|e| SyncError::Validation(format!("invalid Product id: {e}")))?;

        stripe::Product::update(&self.client, &product_id, product_update_params(draft))
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_price_inner(&self, draft: &PriceDraft) -> Result<PriceExtId, SyncError> {
        let mut params = stripe::CreatePrice::new(convert_currency(draft.money.currency()));
        params.product = Some(stripe::IdOrCreate::Id(draft.product.as_str()));
        params.unit_amount = Some(draft.money.amount().minor());
        params.nickname = draft.nickname.as_deref();
        params.active = Some(draft.active);
        params.metadata = Some(cms_metadata(draft.local_id));
        params.recurring = draft.recurring.map(|r| stripe::CreatePriceRecurring {
            interval: convert_interval(r.interval),
            interval_count: Some(u64::from(r.interval_count)),
            ..Default::default()
        });

        let price = stripe::Price::create(&self.client, params)
            .await
            .map_err(api_error)?;
        PriceExtId::new(price.id.to_string())
    }

    async fn update_price_inner(&self, id: &PriceExtId, draft: &PriceDraft) -> Result<(), SyncError> {
        let price_id = id
            .as_str()
            .parse::<stripe::PriceId>()
            .map_err(|e| SyncError::Validation(format!("invalid Price id: {e}")))?;

        let mut params = stripe::UpdatePrice::new();
        params.active = Some(draft.active);
        params.nickname = draft.nickname.as_deref();
        params.metadata = Some(cms_metadata(draft.local_id));

        stripe::Price::update(&self.client, &price_id, params)
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn find_customer_by_email_inner(
        &self,
        email: &str,
    ) -> Result<Option<CustomerExtId>, SyncError> {
        let mut params = stripe::ListCustomers::new();
        params.email = Some(email);
        params.limit = Some(1);

        let customers = stripe::Customer::list(&self.client, &params)
            .await
            .map_err(api_error)?;
        customers
            .data
            .into_iter()
            .next()
            .map(|c| CustomerExtId::new(c.id.to_string()))
            .transpose()
    }

    async fn create_customer_inner(&self, draft: &CustomerDraft) -> Result<CustomerExtId, SyncError> {
        let mut params = stripe::CreateCustomer::new();
        params.email = Some(&draft.email);
        params.name = draft.name.as_deref();
        params.metadata = Some(HashMap::from([(
            "user_id".to_string(),
            draft.user_id.to_string(),
        )]));

        let customer = stripe::Customer::create(&self.client, params)
            .await
            .map_err(api_error)?;
        CustomerExtId::new(customer.id.to_string())
    }

    async fn create_checkout_session_inner(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, SyncError> {
        let customer = request
            .customer
            .as_str()
            .parse::<stripe::CustomerId>()
            .map_err(|e| SyncError::Validation(format!("invalid Customer id: {e}")))?;

        let mut params = stripe::CreateCheckoutSession::new();
        params.customer = Some(customer);
        params.mode = Some(convert_mode(request.mode));
        params.line_items = Some(request.lines.iter().map(line_item).collect());
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.client_reference_id = Some(&request.client_reference_id);
        params.metadata = Some(HashMap::from([(
            "user_id".to_string(),
            request.client_reference_id.clone(),
        )]));
        // One-off payments only produce invoice events when asked to.
        if request.mode == CheckoutMode::Payment {
            params.invoice_creation = Some(stripe::CreateCheckoutSessionInvoiceCreation {
                enabled: true,
                ..Default::default()
            });
        }

        let session = stripe::CheckoutSession::create(&self.client, params)
            .await
            .map_err(api_error)?;
        let url = session
            .url
            .ok_or_else(|| SyncError::Remote("Stripe returned a session without a URL".into()))?;
        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }
}

impl PaymentPlatform for StripePlatform {
    fn create_product<'a>(
        &'a self,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<ProductExtId, SyncError>> {
        Box::pin(self.create_product_inner(draft))
    }

    fn update_product<'a>(
        &'a self,
        id: &'a ProductExtId,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(self.update_product_inner(id, draft))
    }

    fn create_price<'a>(
        &'a self,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<PriceExtId, SyncError>> {
        Box::pin(self.create_price_inner(draft))
    }

    fn update_price<'a>(
        &'a self,
        id: &'a PriceExtId,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(self.update_price_inner(id, draft))
    }

    fn find_customer_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerExtId>, SyncError>> {
        Box::pin(self.find_customer_by_email_inner(email))
    }

    fn create_customer<'a>(
        &'a self,
        draft: &'a CustomerDraft,
    ) -> BoxFuture<'a, Result<CustomerExtId, SyncError>> {
        Box::pin(self.create_customer_inner(draft))
    }

    fn create_checkout_session<'a>(
        &'a self,
        request: &'a CheckoutSessionRequest,
    ) -> BoxFuture<'a, Result<CheckoutSession, SyncError>> {
        Box::pin(self.create_checkout_session_inner(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(description: Option<&str>) -> ProductDraft {
        ProductDraft {
            local_id: Uuid::now_v7(),
            name: "Ceramic Mug".into(),
            description: description.map(str::to_string),
            active: true,
        }
    }

    #[test]
    fn product_update_sends_description() {
        let draft = draft(Some("Holds 350ml"));
        let params = product_update_params(&draft);
        assert_eq!(params.name, Some("Ceramic Mug"));
        assert_eq!(params.description.as_deref(), Some("Holds 350ml"));
        assert_eq!(params.active, Some(true));
        assert_eq!(
            params.metadata.unwrap().get(CMS_ID_METADATA_KEY),
            Some(&draft.local_id.to_string())
        );
    }

    #[test]
    fn product_update_omits_empty_description() {
        for description in [None, Some(""), Some("   ")] {
            let draft = draft(description);
            assert_eq!(product_update_params(&draft).description, None);
        }
    }
}
