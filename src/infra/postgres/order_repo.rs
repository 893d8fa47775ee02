use {
    super::{conflict_on_unique, stale_version},
    crate::domain::{
        error::SyncError,
        id::{CustomerExtId, EventId, InvoiceId},
        money::{CurrencyCode, MoneyAmount, SignedAmount},
        order::{Order, OrderLine, OrderStatus},
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, types::Json},
    uuid::Uuid,
};

const COLUMNS: &str = "id, invoice_id, user_id, customer_id, status, lines, total, currency, \
     amount_paid, last_event_id, last_event_at, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    invoice_id: String,
    user_id: Option<Uuid>,
    customer_id: Option<String>,
    status: String,
    lines: Json<Vec<OrderLine>>,
    total: i64,
    currency: String,
    amount_paid: i64,
    last_event_id: String,
    last_event_at: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = SyncError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            invoice_id: InvoiceId::new(row.invoice_id)?,
            user_id: row.user_id,
            customer_id: row.customer_id.map(CustomerExtId::new).transpose()?,
            status: OrderStatus::try_from(row.status.as_str())?,
            lines: row.lines.0,
            total: SignedAmount::new(row.total),
            currency: CurrencyCode::new(&row.currency)?,
            amount_paid: MoneyAmount::new(row.amount_paid)?,
            last_event_id: EventId::new(row.last_event_id)?,
            last_event_at: row.last_event_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn find_by_invoice(
    pool: &PgPool,
    invoice: &InvoiceId,
) -> Result<Option<Order>, SyncError> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {COLUMNS} FROM orders WHERE invoice_id = $1"
    ))
    .bind(invoice.as_str())
    .fetch_optional(pool)
    .await?
    .map(Order::try_from)
    .transpose()
}

/// Unique on `invoice_id`: the loser of a concurrent first-insert gets
/// `Conflict` and rereads.
pub async fn insert(pool: &PgPool, order: &Order) -> Result<(), SyncError> {
    sqlx::query(
        r#"
        INSERT INTO orders
            (id, invoice_id, user_id, customer_id, status, lines, total, currency,
             amount_paid, last_event_id, last_event_at, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(order.id)
    .bind(order.invoice_id.as_str())
    .bind(order.user_id)
    .bind(order.customer_id.as_ref().map(CustomerExtId::as_str))
    .bind(order.status.as_str())
    .bind(Json(&order.lines))
    .bind(order.total.minor())
    .bind(order.currency.as_str())
    .bind(order.amount_paid.minor())
    .bind(order.last_event_id.as_str())
    .bind(order.last_event_at)
    .bind(order.version)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("order for {} already exists", order.invoice_id)))?;
    Ok(())
}

/// Version-checked update of the mutable invoice fields. Lines are frozen.
pub async fn update(pool: &PgPool, order: &Order) -> Result<Order, SyncError> {
    let sql = format!(
        r#"
        UPDATE orders
        SET status = $2, total = $3, currency = $4, amount_paid = $5,
            customer_id = COALESCE(customer_id, $6), last_event_id = $7,
            last_event_at = GREATEST(last_event_at, $8),
            version = version + 1, updated_at = now()
        WHERE invoice_id = $1 AND version = $9
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order.invoice_id.as_str())
        .bind(order.status.as_str())
        .bind(order.total.minor())
        .bind(order.currency.as_str())
        .bind(order.amount_paid.minor())
        .bind(order.customer_id.as_ref().map(CustomerExtId::as_str))
        .bind(order.last_event_id.as_str())
        .bind(order.last_event_at)
        .bind(order.version)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Order::try_from(row),
        None => Err(stale_version("order", order.id, order.version)),
    }
}
