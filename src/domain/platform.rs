use {
    super::{
        error::SyncError,
        id::{CustomerExtId, PriceExtId, ProductExtId},
        money::Money,
        price::{Price, Recurring},
        product::Product,
        user::User,
    },
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Product fields mirrored to the platform.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub local_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

impl From<&Product> for ProductDraft {
    fn from(product: &Product) -> Self {
        Self {
            local_id: product.id,
            name: product.title.clone(),
            description: product.description.clone(),
            active: product.active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceDraft {
    pub local_id: Uuid,
    pub product: ProductExtId,
    pub money: Money,
    pub recurring: Option<Recurring>,
    pub nickname: Option<String>,
    pub active: bool,
}

impl PriceDraft {
    pub fn new(price: &Price, product: ProductExtId) -> Self {
        Self {
            local_id: price.id,
            product,
            money: price.money,
            recurring: price.recurring,
            nickname: price.nickname.clone(),
            active: price.active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CustomerDraft {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

impl From<&User> for CustomerDraft {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub price: PriceExtId,
    pub quantity: u64,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub customer: CustomerExtId,
    pub client_reference_id: String,
    pub lines: Vec<CheckoutLine>,
    pub mode: CheckoutMode,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Calls this service makes against the payment platform.
pub trait PaymentPlatform: Send + Sync {
    fn create_product<'a>(
        &'a self,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<ProductExtId, SyncError>>;

    fn update_product<'a>(
        &'a self,
        id: &'a ProductExtId,
        draft: &'a ProductDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>>;

    fn create_price<'a>(
        &'a self,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<PriceExtId, SyncError>>;

    /// Only mutable fields (active, nickname) travel; terms are fixed at creation.
    fn update_price<'a>(
        &'a self,
        id: &'a PriceExtId,
        draft: &'a PriceDraft,
    ) -> BoxFuture<'a, Result<(), SyncError>>;

    fn find_customer_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerExtId>, SyncError>>;

    fn create_customer<'a>(
        &'a self,
        draft: &'a CustomerDraft,
    ) -> BoxFuture<'a, Result<CustomerExtId, SyncError>>;

    fn create_checkout_session<'a>(
        &'a self,
        request: &'a CheckoutSessionRequest,
    ) -> BoxFuture<'a, Result<CheckoutSession, SyncError>>;
}
