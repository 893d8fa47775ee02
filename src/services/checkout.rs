use {
    crate::{
        domain::{
            error::SyncError,
            id::{PriceExtId, ProductExtId},
            money::Currency,
            platform::{
                CheckoutLine, CheckoutMode, CheckoutSessionRequest, PaymentPlatform,
            },
            price::Price,
            user::User,
        },
        infra::store::DocumentStore,
        services::customers::CustomerProvisioner,
    },
    serde::{Deserialize, Serialize},
    std::sync::Arc,
    uuid::Uuid,
};

/// One cart entry as posted by the storefront.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    pub quantity: i64,
}

impl CartLine {
    pub fn price(price_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            price_id: Some(price_id.into()),
            product_id: None,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub id: String,
}

/// Turns a cart into a hosted checkout session.
///
/// Creates no order: orders only come from invoice events the platform
/// confirms.
pub struct CheckoutService {
    store: Arc<dyn DocumentStore>,
    platform: Arc<dyn PaymentPlatform>,
    provisioner: Arc<CustomerProvisioner>,
    app_url: String,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        platform: Arc<dyn PaymentPlatform>,
        provisioner: Arc<CustomerProvisioner>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            platform,
            provisioner,
            app_url: app_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Validates the whole cart against local documents before any platform
    /// call is made.
    #[tracing::instrument(name = "checkout", skip_all, fields(user_id = %user.id, lines = cart.len()))]
    pub async fn create_session(
        &self,
        user: &User,
        cart: &[CartLine],
    ) -> Result<CheckoutResponse, SyncError> {
        let (lines, mode) = self.resolve_cart(cart).await?;

        let customer = self.provisioner.ensure_customer(user).await?;
        let request = CheckoutSessionRequest {
            customer,
            client_reference_id: user.id.to_string(),
            lines,
            mode,
            success_url: format!(
                "{}/order-confirmation?session_id={{CHECKOUT_SESSION_ID}}",
                self.app_url
            ),
            cancel_url: format!("{}/cart", self.app_url),
        };
        let session = self.platform.create_checkout_session(&request).await?;

        tracing::info!(session_id = %session.id, mode = ?request.mode, "checkout session created");
        Ok(CheckoutResponse {
            url: session.url,
            id: session.id,
        })
    }

    async fn resolve_cart(
        &self,
        cart: &[CartLine],
    ) -> Result<(Vec<CheckoutLine>, CheckoutMode), SyncError> {
        if cart.is_empty() {
            return Err(SyncError::Validation("cart is empty".into()));
        }

        let mut lines = Vec::with_capacity(cart.len());
        let mut currency: Option<Currency> = None;
        let mut recurring = false;

        for (index, line) in cart.iter().enumerate() {
            let quantity = u64::try_from(line.quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    SyncError::Validation(format!(
                        "cart line {index}: quantity must be positive, got {}",
                        line.quantity
                    ))
                })?;

            let price = self.resolve_price(index, line).await?;
            if !price.active {
                return Err(SyncError::Validation(format!(
                    "cart line {index}: price {} is no longer available",
                    price.id
                )));
            }
            let external_id = price.external_id.clone().ok_or_else(|| {
                SyncError::Validation(format!(
                    "cart line {index}: price {} is not available for purchase yet",
                    price.id
                ))
            })?;

            let line_currency = price.money.currency();
            match currency {
                Some(c) if c != line_currency => {
                    return Err(SyncError::Validation(format!(
                        "cart mixes {c} and {line_currency} prices"
                    )));
                }
                _ => currency = Some(line_currency),
            }
            recurring |= price.is_recurring();

            lines.push(CheckoutLine {
                price: external_id,
                quantity,
            });
        }

        let mode = if recurring {
            CheckoutMode::Subscription
        } else {
            CheckoutMode::Payment
        };
        Ok((lines, mode))
    }

    async fn resolve_price(&self, index: usize, line: &CartLine) -> Result<Price, SyncError> {
        let not_found =
            |what: &str| SyncError::Validation(format!("cart line {index}: {what} not found"));

        match (line.price_id.as_deref(), line.product_id.as_deref()) {
            (Some(reference), None) => {
                let price = match Uuid::parse_str(reference) {
                    Ok(id) => self.store.price(id).await?,
                    Err(_) => match PriceExtId::new(reference) {
                        Ok(id) => self.store.price_by_external_id(&id).await?,
                        Err(_) => None,
                    },
                };
                price.ok_or_else(|| not_found(&format!("price {reference}")))
            }
            (None, Some(reference)) => {
                let product = match Uuid::parse_str(reference) {
                    Ok(id) => self.store.product(id).await?,
                    Err(_) => match ProductExtId::new(reference) {
                        Ok(id) => self.store.product_by_external_id(&id).await?,
                        Err(_) => None,
                    },
                };
                let product = product.ok_or_else(|| not_found(&format!("product {reference}")))?;
                if !product.active {
                    return Err(SyncError::Validation(format!(
                        "cart line {index}: product {reference} is no longer available"
                    )));
                }
                let mut active: Vec<Price> = self
                    .store
                    .prices_for_product(product.id)
                    .await?
                    .into_iter()
                    .filter(|p| p.active)
                    .collect();
                match active.len() {
                    1 => Ok(active.remove(0)),
                    0 => Err(SyncError::Validation(format!(
                        "cart line {index}: product {reference} has no active price"
                    ))),
                    n => Err(SyncError::Validation(format!(
                        "cart line {index}: product {reference} has {n} active prices, reference one by priceId"
                    ))),
                }
            }
            _ => Err(SyncError::Validation(format!(
                "cart line {index}: exactly one of priceId or productId is required"
            ))),
        }
    }
}
