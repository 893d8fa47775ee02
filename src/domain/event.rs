use {
    super::{error::SyncError, id::EventId},
    serde::{Deserialize, de::DeserializeOwned},
    std::{collections::HashMap, fmt, str::FromStr},
};

/// Event types this service knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InvoiceCreated,
    InvoiceUpdated,
    ProductCreated,
    ProductUpdated,
    PriceCreated,
    PriceUpdated,
    ChargeRefunded,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        Self::InvoiceCreated,
        Self::InvoiceUpdated,
        Self::ProductCreated,
        Self::ProductUpdated,
        Self::PriceCreated,
        Self::PriceUpdated,
        Self::ChargeRefunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoiceCreated => "invoice.created",
            Self::InvoiceUpdated => "invoice.updated",
            Self::ProductCreated => "product.created",
            Self::ProductUpdated => "product.updated",
            Self::PriceCreated => "price.created",
            Self::PriceUpdated => "price.updated",
            Self::ChargeRefunded => "charge.refunded",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SyncError::Config(format!("unsupported webhook event type: {s}")))
    }
}

/// An event whose signature and timestamp have been checked.
///
/// Only the verifier constructs these, so every handler that takes one sits
/// behind the trust boundary.
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    id: EventId,
    event_type: String,
    kind: Option<EventKind>,
    created: i64,
    livemode: bool,
    object: serde_json::Value,
}

impl VerifiedEvent {
    pub(crate) fn new(
        id: EventId,
        event_type: String,
        created: i64,
        livemode: bool,
        object: serde_json::Value,
    ) -> Self {
        let kind = event_type.parse().ok();
        Self {
            id,
            event_type,
            kind,
            created,
            livemode,
            object,
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn kind(&self) -> Option<EventKind> {
        self.kind
    }

    /// Platform timestamp; the logical clock for last-write-wins.
    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn livemode(&self) -> bool {
        self.livemode
    }

    pub fn object(&self) -> &serde_json::Value {
        &self.object
    }

    /// Decode `data.object` into the payload type of this event family.
    pub fn object_as<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        T::deserialize(&self.object).map_err(|e| {
            SyncError::Validation(format!("{} payload: {e}", self.event_type))
        })
    }
}

/// Wire shape of an event envelope.
#[derive(Debug, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: RawEventData,
}

#[derive(Debug, Deserialize)]
pub struct RawEventData {
    pub object: serde_json::Value,
}

/// A reference the platform sends either as a bare id or an expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdOrObject {
    Id(String),
    Object { id: String },
}

impl IdOrObject {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object { id } => id,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecurringObject {
    pub interval: String,
    #[serde(default)]
    pub interval_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceObject {
    pub id: String,
    pub product: IdOrObject,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    pub currency: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub recurring: Option<RecurringObject>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<IdOrObject>,
    #[serde(default)]
    pub status: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub lines: InvoiceLines,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLineObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLineObject {
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<InvoiceLinePrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLinePrice {
    pub id: String,
    #[serde(default)]
    pub product: Option<IdOrObject>,
    #[serde(default)]
    pub unit_amount: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    #[serde(default)]
    pub invoice: Option<IdOrObject>,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub amount_refunded: i64,
}

/// Local document id stamped on platform objects by outbound create.
pub const CMS_ID_METADATA_KEY: &str = "cms_id";
