use {
    super::{
        audit::NewAuditEntry,
        error::SyncError,
        id::{CustomerExtId, EventId, InvoiceId},
        money::{CurrencyCode, MoneyAmount, SignedAmount},
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Maps a platform invoice status onto the order lifecycle.
    pub fn from_invoice_status(status: Option<&str>) -> Result<Self, SyncError> {
        match status {
            None | Some("draft") | Some("open") => Ok(Self::Pending),
            Some("paid") => Ok(Self::Paid),
            Some("uncollectible") | Some("void") => Ok(Self::Failed),
            Some(other) => Err(SyncError::Validation(format!(
                "unknown invoice status: {other}"
            ))),
        }
    }

    /// Valid state machine transitions. A failed invoice can still be paid
    /// later; refund is the only way out of `Paid`.
    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Refunded)
                | (Self::Failed, Self::Paid)
                | (Self::Paid, Self::Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = SyncError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(SyncError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// Snapshot of one purchased item, frozen when the order is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Option<Uuid>,
    pub price_id: Option<Uuid>,
    pub external_product_id: Option<String>,
    pub external_price_id: Option<String>,
    pub title: String,
    pub unit_amount: Option<SignedAmount>,
    pub quantity: u64,
    /// Negative for discount and proration lines.
    pub amount: SignedAmount,
    /// False when the catalog item was unknown locally and the line was
    /// built from the event payload alone.
    pub resolved: bool,
}

/// Materialized order. Keyed by invoice id; never authored by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub invoice_id: InvoiceId,
    pub user_id: Option<Uuid>,
    pub customer_id: Option<CustomerExtId>,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub total: SignedAmount,
    pub currency: CurrencyCode,
    pub amount_paid: MoneyAmount,
    pub last_event_id: EventId,
    pub last_event_at: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an invoice event says about an order, independent of storage.
#[derive(Debug, Clone)]
pub struct InvoiceUpdate {
    pub invoice_id: InvoiceId,
    pub event_id: EventId,
    pub event_type: String,
    pub event_at: i64,
    pub status: OrderStatus,
    pub total: SignedAmount,
    pub currency: CurrencyCode,
    pub amount_paid: MoneyAmount,
    pub customer_id: Option<CustomerExtId>,
    pub lines: Vec<InvoiceLineRef>,
}

/// Invoice line as referenced by the event, before local resolution.
#[derive(Debug, Clone)]
pub struct InvoiceLineRef {
    pub external_price_id: Option<String>,
    pub external_product_id: Option<String>,
    pub description: Option<String>,
    pub unit_amount: Option<SignedAmount>,
    pub quantity: u64,
    pub amount: SignedAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    /// Event is older than what we've already applied.
    Stale,
    /// Status unchanged; amounts may still move.
    SameStatus,
    Advance { old_status: OrderStatus },
    LogAnomaly { current: OrderStatus },
}

impl Order {
    /// Decide how an incoming invoice event relates to this order.
    ///
    /// Strict `<` on timestamps: events within the same second share one, so
    /// equal timestamps fall through to the state machine.
    pub fn decide(&self, incoming_status: OrderStatus, event_at: i64) -> OrderAction {
        if event_at < self.last_event_at {
            OrderAction::Stale
        } else if incoming_status == self.status {
            OrderAction::SameStatus
        } else if self.status.can_transition_to(&incoming_status) {
            OrderAction::Advance {
                old_status: self.status,
            }
        } else {
            OrderAction::LogAnomaly {
                current: self.status,
            }
        }
    }

    /// Apply mutable invoice fields. Lines and invoice id never change.
    pub fn apply_invoice(&mut self, update: &InvoiceUpdate) {
        self.status = update.status;
        self.total = update.total;
        self.currency = update.currency.clone();
        self.amount_paid = update.amount_paid;
        if self.customer_id.is_none() {
            self.customer_id = update.customer_id.clone();
        }
        self.touch_event(&update.event_id, update.event_at);
    }

    pub fn touch_event(&mut self, event_id: &EventId, event_at: i64) {
        self.last_event_id = event_id.clone();
        self.last_event_at = self.last_event_at.max(event_at);
    }

    pub fn audit_entry(&self, event_id: &EventId, actor: &str, action: &str) -> NewAuditEntry {
        NewAuditEntry {
            id: Uuid::now_v7(),
            entity_type: "order".to_string(),
            entity_id: Some(self.id),
            external_id: Some(self.invoice_id.as_str().to_string()),
            event_id: event_id.as_str().to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            detail: serde_json::json!({
                "status": self.status.as_str(),
                "total": self.total.minor(),
                "currency": self.currency.as_str(),
            }),
        }
    }
}

impl InvoiceUpdate {
    pub fn new_order(&self, user_id: Option<Uuid>, lines: Vec<OrderLine>) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::now_v7(),
            invoice_id: self.invoice_id.clone(),
            user_id,
            customer_id: self.customer_id.clone(),
            status: self.status,
            lines,
            total: self.total,
            currency: self.currency.clone(),
            amount_paid: self.amount_paid,
            last_event_id: self.event_id.clone(),
            last_event_at: self.event_at,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
