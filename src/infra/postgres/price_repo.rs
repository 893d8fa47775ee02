use {
    super::{conflict_on_unique, stale_version},
    crate::domain::{
        error::SyncError,
        id::PriceExtId,
        money::{Currency, Money, MoneyAmount},
        price::{Interval, Price, Recurring},
        sync::SyncState,
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

const COLUMNS: &str = "id, product_id, external_id, amount, currency, interval, interval_count, \
     nickname, active, sync_state, sync_error, remote_synced_at, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PriceRow {
    id: Uuid,
    product_id: Uuid,
    external_id: Option<String>,
    amount: i64,
    currency: String,
    interval: Option<String>,
    interval_count: Option<i32>,
    nickname: Option<String>,
    active: bool,
    sync_state: String,
    sync_error: Option<String>,
    remote_synced_at: Option<i64>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PriceRow> for Price {
    type Error = SyncError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        let recurring = match row.interval {
            Some(interval) => Some(Recurring {
                interval: Interval::try_from(interval.as_str())?,
                interval_count: row
                    .interval_count
                    .and_then(|c| u32::try_from(c).ok())
                    .unwrap_or(1),
            }),
            None => None,
        };
        Ok(Price {
            id: row.id,
            product_id: row.product_id,
            external_id: row.external_id.map(PriceExtId::new).transpose()?,
            money: Money::new(
                MoneyAmount::new(row.amount)?,
                Currency::try_from(row.currency.as_str())?,
            ),
            recurring,
            nickname: row.nickname,
            active: row.active,
            sync_state: SyncState::try_from(row.sync_state.as_str())?,
            sync_error: row.sync_error,
            remote_synced_at: row.remote_synced_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn select(clause: &str) -> String {
    format!("SELECT {COLUMNS} FROM prices WHERE {clause}")
}

fn interval_count(price: &Price) -> Option<i32> {
    price
        .recurring
        .map(|r| i32::try_from(r.interval_count).unwrap_or(i32::MAX))
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Price>, SyncError> {
    sqlx::query_as::<_, PriceRow>(&select("id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Price::try_from)
        .transpose()
}

pub async fn find_by_external_id(
    pool: &PgPool,
    external_id: &PriceExtId,
) -> Result<Option<Price>, SyncError> {
    sqlx::query_as::<_, PriceRow>(&select("external_id = $1"))
        .bind(external_id.as_str())
        .fetch_optional(pool)
        .await?
        .map(Price::try_from)
        .transpose()
}

pub async fn for_product(pool: &PgPool, product_id: Uuid) -> Result<Vec<Price>, SyncError> {
    sqlx::query_as::<_, PriceRow>(&select("product_id = $1 ORDER BY created_at"))
        .bind(product_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Price::try_from)
        .collect()
}

pub async fn insert(pool: &PgPool, price: &Price) -> Result<(), SyncError> {
    sqlx::query(
        r#"
        INSERT INTO prices
            (id, product_id, external_id, amount, currency, interval, interval_count,
             nickname, active, sync_state, sync_error, remote_synced_at, version,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(price.id)
    .bind(price.product_id)
    .bind(price.external_id.as_ref().map(PriceExtId::as_str))
    .bind(price.money.amount().minor())
    .bind(price.money.currency().as_str())
    .bind(price.recurring.map(|r| r.interval.as_str()))
    .bind(interval_count(price))
    .bind(price.nickname.as_deref())
    .bind(price.active)
    .bind(price.sync_state.as_str())
    .bind(price.sync_error.as_deref())
    .bind(price.remote_synced_at)
    .bind(price.version)
    .bind(price.created_at)
    .bind(price.updated_at)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("price {} already exists", price.id)))?;
    Ok(())
}

pub async fn update(pool: &PgPool, price: &Price) -> Result<Price, SyncError> {
    let sql = format!(
        r#"
        UPDATE prices
        SET amount = $2, currency = $3, interval = $4, interval_count = $5, nickname = $6,
            active = $7, sync_state = $8, sync_error = $9, remote_synced_at = $10,
            version = version + 1, updated_at = now()
        WHERE id = $1 AND version = $11
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, PriceRow>(&sql)
        .bind(price.id)
        .bind(price.money.amount().minor())
        .bind(price.money.currency().as_str())
        .bind(price.recurring.map(|r| r.interval.as_str()))
        .bind(interval_count(price))
        .bind(price.nickname.as_deref())
        .bind(price.active)
        .bind(price.sync_state.as_str())
        .bind(price.sync_error.as_deref())
        .bind(price.remote_synced_at)
        .bind(price.version)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Price::try_from(row),
        None => Err(stale_version("price", price.id, price.version)),
    }
}

pub async fn set_external_id(
    pool: &PgPool,
    id: Uuid,
    external_id: &PriceExtId,
) -> Result<PriceExtId, SyncError> {
    let stored: Option<Option<String>> = sqlx::query_scalar(
        r#"
        UPDATE prices
        SET external_id = COALESCE(external_id, $2), updated_at = now()
        WHERE id = $1
        RETURNING external_id
        "#,
    )
    .bind(id)
    .bind(external_id.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("{external_id} is mirrored by another price")))?;

    match stored.flatten() {
        Some(stored) => PriceExtId::new(stored),
        None => Err(SyncError::NotFound(format!("price {id}"))),
    }
}

pub async fn set_sync_state(
    pool: &PgPool,
    id: Uuid,
    state: SyncState,
    error: Option<&str>,
) -> Result<(), SyncError> {
    sqlx::query("UPDATE prices SET sync_state = $2, sync_error = $3 WHERE id = $1")
        .bind(id)
        .bind(state.as_str())
        .bind(error)
        .execute(pool)
        .await?;
    Ok(())
}

/// Version-guarded: an older push never overwrites the state of a newer edit.
pub async fn mark_synced(pool: &PgPool, id: Uuid, version: i64) -> Result<bool, SyncError> {
    let result = sqlx::query(
        "UPDATE prices SET sync_state = $3, sync_error = NULL WHERE id = $1 AND version = $2",
    )
    .bind(id)
    .bind(version)
    .bind(SyncState::Synced.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
