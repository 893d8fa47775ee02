use {
    crate::{
        domain::{
            error::SyncError,
            event::{ChargeObject, EventKind, InvoiceObject, VerifiedEvent},
            id::{CustomerExtId, EventId, InvoiceId, PriceExtId, ProductExtId},
            money::{CurrencyCode, MoneyAmount, SignedAmount},
            order::{InvoiceLineRef, InvoiceUpdate, Order, OrderAction, OrderLine, OrderStatus},
            outcome::ProcessResult,
            platform::BoxFuture,
        },
        infra::store::DocumentStore,
        services::{
            dispatch::EventHandler, documents::MAX_CONFLICT_RETRIES, inbound::WEBHOOK_ACTOR,
            locks::KeyedLocks,
        },
    },
    std::sync::Arc,
};

/// Read an invoice event into the update it implies for the order.
pub fn invoice_update(event: &VerifiedEvent) -> Result<InvoiceUpdate, SyncError> {
    let invoice: InvoiceObject = event.object_as()?;
    let currency = CurrencyCode::new(&invoice.currency)?;
    if currency.known().is_none() {
        tracing::warn!(
            invoice = %invoice.id,
            currency = %currency,
            "invoice billed in a currency the catalog does not price in, keeping it as reported"
        );
    }
    let lines = invoice
        .lines
        .data
        .iter()
        .map(|line| {
            let quantity = line.quantity.unwrap_or(1);
            InvoiceLineRef {
                external_price_id: line.price.as_ref().map(|p| p.id.clone()),
                external_product_id: line
                    .price
                    .as_ref()
                    .and_then(|p| p.product.as_ref())
                    .map(|p| p.id().to_string()),
                description: line.description.clone(),
                unit_amount: line
                    .price
                    .as_ref()
                    .and_then(|p| p.unit_amount)
                    .map(SignedAmount::new),
                quantity,
                amount: SignedAmount::new(line.amount),
            }
        })
        .collect::<Vec<_>>();

    Ok(InvoiceUpdate {
        invoice_id: InvoiceId::new(invoice.id)?,
        event_id: event.id().clone(),
        event_type: event.event_type().to_string(),
        event_at: event.created(),
        status: OrderStatus::from_invoice_status(invoice.status.as_deref())?,
        total: SignedAmount::new(invoice.total),
        currency,
        amount_paid: MoneyAmount::new(invoice.amount_paid)?,
        customer_id: invoice
            .customer
            .as_ref()
            .map(|c| CustomerExtId::new(c.id()))
            .transpose()?,
        lines,
    })
}

/// A status change requested by an event, whatever its source.
struct Transition<'a> {
    status: OrderStatus,
    event_id: &'a EventId,
    event_type: &'a str,
    event_at: i64,
    invoice: Option<&'a InvoiceUpdate>,
}

/// Turns invoice events into exactly one order per invoice id.
pub struct OrderMaterializer {
    store: Arc<dyn DocumentStore>,
    locks: KeyedLocks<String>,
}

impl OrderMaterializer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Create or advance the order for `update.invoice_id`.
    ///
    /// Same-invoice work is serialized in-process; the version check on
    /// the order row catches writers in other processes, and a lost race
    /// rereads and decides again.
    #[tracing::instrument(
        name = "materialize_order",
        skip_all,
        fields(invoice_id = %update.invoice_id, status = %update.status)
    )]
    pub async fn apply_invoice(&self, update: &InvoiceUpdate) -> Result<ProcessResult, SyncError> {
        let _guard = self.locks.lock(update.invoice_id.as_str().to_string()).await;
        let transition = Transition {
            status: update.status,
            event_id: &update.event_id,
            event_type: &update.event_type,
            event_at: update.event_at,
            invoice: Some(update),
        };

        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let existing = self.store.order_by_invoice(&update.invoice_id).await?;
            let outcome = match existing {
                None => self.create(update).await,
                Some(order) => self.advance(order, &transition).await,
            };
            match outcome {
                Err(SyncError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "order changed concurrently, rereading");
                }
                other => return other,
            }
        }
        Err(SyncError::Conflict(format!(
            "order for {} kept changing under {MAX_CONFLICT_RETRIES} attempts",
            update.invoice_id
        )))
    }

    /// Move the charge's order to `refunded`.
    #[tracing::instrument(name = "refund_order", skip_all, fields(charge = %charge.id))]
    pub async fn apply_refund(
        &self,
        charge: &ChargeObject,
        event_id: &EventId,
        event_type: &str,
        event_at: i64,
    ) -> Result<ProcessResult, SyncError> {
        if !charge.refunded {
            return Ok(ProcessResult::Ignored("charge is only partially refunded".into()));
        }
        let Some(invoice) = charge.invoice.as_ref() else {
            return Ok(ProcessResult::Ignored("charge has no invoice".into()));
        };
        let invoice_id = InvoiceId::new(invoice.id())?;
        let _guard = self.locks.lock(invoice_id.as_str().to_string()).await;
        let transition = Transition {
            status: OrderStatus::Refunded,
            event_id,
            event_type,
            event_at,
            invoice: None,
        };

        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let Some(order) = self.store.order_by_invoice(&invoice_id).await? else {
                tracing::warn!(invoice_id = %invoice_id, "refund for an invoice with no local order");
                return Ok(ProcessResult::Ignored(format!("no order for {invoice_id}")));
            };
            match self.advance(order, &transition).await {
                Err(SyncError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "order changed concurrently, rereading");
                }
                other => return other,
            }
        }
        Err(SyncError::Conflict(format!(
            "order for {invoice_id} kept changing under {MAX_CONFLICT_RETRIES} attempts"
        )))
    }

    async fn create(&self, update: &InvoiceUpdate) -> Result<ProcessResult, SyncError> {
        let mut lines = Vec::with_capacity(update.lines.len());
        for line in &update.lines {
            lines.push(self.resolve_line(line).await?);
        }
        let user_id = match &update.customer_id {
            Some(customer) => self.store.user_by_customer(customer).await?.map(|u| u.id),
            None => None,
        };
        if user_id.is_none() {
            tracing::warn!(customer = ?update.customer_id, "invoice customer is not linked to a local user");
        }

        let order = update.new_order(user_id, lines);
        self.store.insert_order(&order).await?;

        let mut audit = order.audit_entry(&update.event_id, WEBHOOK_ACTOR, "created");
        audit.detail["event_type"] = update.event_type.clone().into();
        self.store.insert_audit_entry(&audit).await?;

        tracing::info!(order_id = %order.id, lines = order.lines.len(), "order materialized");
        Ok(ProcessResult::Created(order.id))
    }

    async fn advance(
        &self,
        existing: Order,
        transition: &Transition<'_>,
    ) -> Result<ProcessResult, SyncError> {
        let id = existing.id;
        match existing.decide(transition.status, transition.event_at) {
            OrderAction::Stale => {
                let mut audit = existing.audit_entry(transition.event_id, WEBHOOK_ACTOR, "stale");
                audit.detail = serde_json::json!({
                    "event_type": transition.event_type,
                    "event_at": transition.event_at,
                    "last_event_at": existing.last_event_at,
                    "incoming_status": transition.status.as_str(),
                });
                self.store.insert_audit_entry(&audit).await?;
                tracing::info!(order_id = %id, "older event, order left unchanged");
                Ok(ProcessResult::Stale(id))
            }
            OrderAction::SameStatus => {
                let mut next = existing.clone();
                self.apply(&mut next, transition);
                let changed = next.total != existing.total
                    || next.currency != existing.currency
                    || next.amount_paid != existing.amount_paid;
                self.store.update_order(&next).await?;
                if changed {
                    Ok(ProcessResult::Updated(id))
                } else {
                    Ok(ProcessResult::Unchanged(id))
                }
            }
            OrderAction::Advance { old_status } => {
                let mut next = existing.clone();
                self.apply(&mut next, transition);
                let stored = self.store.update_order(&next).await?;

                let action = if transition.status == OrderStatus::Refunded {
                    "refunded"
                } else {
                    "status_changed"
                };
                let mut audit = stored.audit_entry(transition.event_id, WEBHOOK_ACTOR, action);
                audit.detail = serde_json::json!({
                    "event_type": transition.event_type,
                    "old_status": old_status.as_str(),
                    "new_status": stored.status.as_str(),
                });
                self.store.insert_audit_entry(&audit).await?;
                tracing::info!(order_id = %id, from = %old_status, to = %stored.status, "order status advanced");
                Ok(ProcessResult::Updated(id))
            }
            OrderAction::LogAnomaly { current } => {
                let mut next = existing.clone();
                next.touch_event(transition.event_id, transition.event_at);
                self.store.update_order(&next).await?;

                let mut audit = existing.audit_entry(transition.event_id, WEBHOOK_ACTOR, "anomaly");
                audit.detail = serde_json::json!({
                    "event_type": transition.event_type,
                    "current_status": current.as_str(),
                    "incoming_status": transition.status.as_str(),
                    "anomaly": true,
                });
                self.store.insert_audit_entry(&audit).await?;
                tracing::warn!(
                    order_id = %id,
                    from = %current,
                    to = %transition.status,
                    "invalid status transition, logged as anomaly"
                );
                Ok(ProcessResult::Anomaly(id))
            }
        }
    }

    fn apply(&self, order: &mut Order, transition: &Transition<'_>) {
        match transition.invoice {
            Some(update) => order.apply_invoice(update),
            None => {
                order.status = transition.status;
                order.touch_event(transition.event_id, transition.event_at);
            }
        }
    }

    /// Snapshot one invoice line. Catalog items unknown locally are kept as
    /// whatever the event says about them rather than failing the order.
    async fn resolve_line(&self, line: &InvoiceLineRef) -> Result<OrderLine, SyncError> {
        let price = match line.external_price_id.as_deref().map(PriceExtId::new) {
            Some(Ok(id)) => self.store.price_by_external_id(&id).await?,
            _ => None,
        };
        let product = match &price {
            Some(price) => self.store.product(price.product_id).await?,
            None => match line.external_product_id.as_deref().map(ProductExtId::new) {
                Some(Ok(id)) => self.store.product_by_external_id(&id).await?,
                _ => None,
            },
        };

        let resolved = price.is_some() && product.is_some();
        if !resolved {
            tracing::warn!(
                price = ?line.external_price_id,
                product = ?line.external_product_id,
                "invoice line references a catalog item unknown locally, keeping event snapshot"
            );
        }

        let title = product
            .as_ref()
            .map(|p| p.title.clone())
            .or_else(|| line.description.clone())
            .unwrap_or_else(|| "Unknown item".to_string());

        Ok(OrderLine {
            product_id: product.as_ref().map(|p| p.id),
            price_id: price.as_ref().map(|p| p.id),
            external_product_id: product
                .as_ref()
                .and_then(|p| p.external_id.as_ref().map(|id| id.as_str().to_string()))
                .or_else(|| line.external_product_id.clone()),
            external_price_id: line.external_price_id.clone(),
            title,
            unit_amount: price
                .as_ref()
                .map(|p| SignedAmount::from(p.money.amount()))
                .or(line.unit_amount),
            quantity: line.quantity,
            amount: line.amount,
            resolved,
        })
    }
}

impl EventHandler for OrderMaterializer {
    fn handle<'a>(
        &'a self,
        event: &'a VerifiedEvent,
    ) -> BoxFuture<'a, Result<ProcessResult, SyncError>> {
        Box::pin(async move {
            match event.kind() {
                Some(EventKind::InvoiceCreated | EventKind::InvoiceUpdated) => {
                    let update = invoice_update(event)?;
                    self.apply_invoice(&update).await
                }
                Some(EventKind::ChargeRefunded) => {
                    let charge: ChargeObject = event.object_as()?;
                    self.apply_refund(&charge, event.id(), event.event_type(), event.created())
                        .await
                }
                _ => Ok(ProcessResult::Ignored(format!(
                    "{} is not an order event",
                    event.event_type()
                ))),
            }
        })
    }
}
