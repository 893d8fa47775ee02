use {
    super::{conflict_on_unique, stale_version},
    crate::domain::{
        error::SyncError, id::ProductExtId, product::Product, sync::SyncState,
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

const COLUMNS: &str = "id, slug, title, description, active, external_id, sync_state, \
     sync_error, remote_synced_at, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    slug: String,
    title: String,
    description: Option<String>,
    active: bool,
    external_id: Option<String>,
    sync_state: String,
    sync_error: Option<String>,
    remote_synced_at: Option<i64>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = SyncError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id,
            slug: row.slug,
            title: row.title,
            description: row.description,
            active: row.active,
            external_id: row.external_id.map(ProductExtId::new).transpose()?,
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
    format!("SELECT {COLUMNS} FROM products WHERE {clause}")
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Product>, SyncError> {
    sqlx::query_as::<_, ProductRow>(&select("id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Product::try_from)
        .transpose()
}

pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Product>, SyncError> {
    sqlx::query_as::<_, ProductRow>(&select("slug = $1"))
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .map(Product::try_from)
        .transpose()
}

pub async fn find_by_external_id(
    pool: &PgPool,
    external_id: &ProductExtId,
) -> Result<Option<Product>, SyncError> {
    sqlx::query_as::<_, ProductRow>(&select("external_id = $1"))
        .bind(external_id.as_str())
        .fetch_optional(pool)
        .await?
        .map(Product::try_from)
        .transpose()
}

pub async fn insert(pool: &PgPool, product: &Product) -> Result<(), SyncError> {
    sqlx::query(
        r#"
        INSERT INTO products
            (id, slug, title, description, active, external_id, sync_state,
             sync_error, remote_synced_at, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(product.id)
    .bind(&product.slug)
    .bind(&product.title)
    .bind(product.description.as_deref())
    .bind(product.active)
    .bind(product.external_id.as_ref().map(ProductExtId::as_str))
    .bind(product.sync_state.as_str())
    .bind(product.sync_error.as_deref())
    .bind(product.remote_synced_at)
    .bind(product.version)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("product slug {} taken", product.slug)))?;
    Ok(())
}

/// Version-checked update. External id is left alone; it only moves through
/// [`set_external_id`].
pub async fn update(pool: &PgPool, product: &Product) -> Result<Product, SyncError> {
    let sql = format!(
        r#"
        UPDATE products
        SET slug = $2, title = $3, description = $4, active = $5, sync_state = $6,
            sync_error = $7, remote_synced_at = $8, version = version + 1, updated_at = now()
        WHERE id = $1 AND version = $9
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(product.id)
        .bind(&product.slug)
        .bind(&product.title)
        .bind(product.description.as_deref())
        .bind(product.active)
        .bind(product.sync_state.as_str())
        .bind(product.sync_error.as_deref())
        .bind(product.remote_synced_at)
        .bind(product.version)
        .fetch_optional(pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("slug {} taken", product.slug)))?;

    match row {
        Some(row) => Product::try_from(row),
        None => Err(stale_version("product", product.id, product.version)),
    }
}

pub async fn set_external_id(
    pool: &PgPool,
    id: Uuid,
    external_id: &ProductExtId,
) -> Result<ProductExtId, SyncError> {
    let stored: Option<Option<String>> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET external_id = COALESCE(external_id, $2), updated_at = now()
        WHERE id = $1
        RETURNING external_id
        "#,
    )
    .bind(id)
    .bind(external_id.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("{external_id} is mirrored by another product")))?;

    match stored.flatten() {
        Some(stored) => ProductExtId::new(stored),
        None => Err(SyncError::NotFound(format!("product {id}"))),
    }
}

pub async fn set_sync_state(
    pool: &PgPool,
    id: Uuid,
    state: SyncState,
    error: Option<&str>,
) -> Result<(), SyncError> {
    sqlx::query("UPDATE products SET sync_state = $2, sync_error = $3 WHERE id = $1")
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
        "UPDATE products SET sync_state = $3, sync_error = NULL WHERE id = $1 AND version = $2",
    )
    .bind(id)
    .bind(version)
    .bind(SyncState::Synced.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
