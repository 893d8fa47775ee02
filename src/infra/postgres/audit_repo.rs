use {
    crate::domain::{
        audit::{NewAuditEntry, ProcessedEvent, SyncFailure},
        error::SyncError,
        id::EventId,
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

pub async fn insert_audit_entry(pool: &PgPool, entry: &NewAuditEntry) -> Result<bool, SyncError> {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_type, entity_id, external_id, event_id, action, actor, detail)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(entry.id)
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.external_id.as_deref())
    .bind(&entry.event_id)
    .bind(&entry.action)
    .bind(&entry.actor)
    .bind(&entry.detail)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_event_processed(pool: &PgPool, event_id: &EventId) -> Result<bool, SyncError> {
    let found: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM processed_events WHERE event_id = $1")
            .bind(event_id.as_str())
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn mark_event_processed(
    pool: &PgPool,
    event: &ProcessedEvent,
) -> Result<bool, SyncError> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_events (event_id, event_type, provider_ts, outcome)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event.event_id.as_str())
    .bind(&event.event_type)
    .bind(event.provider_ts)
    .bind(&event.outcome)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn record_sync_failure(pool: &PgPool, failure: &SyncFailure) -> Result<(), SyncError> {
    sqlx::query(
        r#"
        INSERT INTO sync_failures (id, collection, document_id, operation, error, attempts, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(failure.id)
    .bind(&failure.collection)
    .bind(failure.document_id)
    .bind(&failure.operation)
    .bind(&failure.error)
    .bind(i32::try_from(failure.attempts).unwrap_or(i32::MAX))
    .bind(failure.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct SyncFailureRow {
    id: Uuid,
    collection: String,
    document_id: Uuid,
    operation: String,
    error: String,
    attempts: i32,
    created_at: DateTime<Utc>,
}

pub async fn sync_failures(pool: &PgPool, limit: i64) -> Result<Vec<SyncFailure>, SyncError> {
    let rows = sqlx::query_as::<_, SyncFailureRow>(
        r#"
        SELECT id, collection, document_id, operation, error, attempts, created_at
        FROM sync_failures
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SyncFailure {
            id: row.id,
            collection: row.collection,
            document_id: row.document_id,
            operation: row.operation,
            error: row.error,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            created_at: row.created_at,
        })
        .collect())
}
