use {
    super::{conflict_on_unique, stale_version},
    crate::domain::{error::SyncError, id::CustomerExtId, sync::SyncState, user::User},
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

const COLUMNS: &str =
    "id, email, name, customer_id, sync_state, sync_error, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    customer_id: Option<String>,
    sync_state: String,
    sync_error: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = SyncError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            customer_id: row.customer_id.map(CustomerExtId::new).transpose()?,
            sync_state: SyncState::try_from(row.sync_state.as_str())?,
            sync_error: row.sync_error,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<User>, SyncError> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(User::try_from)
        .transpose()
}

pub async fn find_by_customer(
    pool: &PgPool,
    customer: &CustomerExtId,
) -> Result<Option<User>, SyncError> {
    sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {COLUMNS} FROM users WHERE customer_id = $1"
    ))
    .bind(customer.as_str())
    .fetch_optional(pool)
    .await?
    .map(User::try_from)
    .transpose()
}

pub async fn insert(pool: &PgPool, user: &User) -> Result<(), SyncError> {
    sqlx::query(
        r#"
        INSERT INTO users
            (id, email, name, customer_id, sync_state, sync_error, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(user.name.as_deref())
    .bind(user.customer_id.as_ref().map(CustomerExtId::as_str))
    .bind(user.sync_state.as_str())
    .bind(user.sync_error.as_deref())
    .bind(user.version)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("user with email {} already exists", user.email)))?;
    Ok(())
}

pub async fn update(pool: &PgPool, user: &User) -> Result<User, SyncError> {
    let sql = format!(
        r#"
        UPDATE users
        SET email = $2, name = $3, sync_state = $4, sync_error = $5,
            version = version + 1, updated_at = now()
        WHERE id = $1 AND version = $6
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(user.id)
        .bind(&user.email)
        .bind(user.name.as_deref())
        .bind(user.sync_state.as_str())
        .bind(user.sync_error.as_deref())
        .bind(user.version)
        .fetch_optional(pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("email {} taken", user.email)))?;

    match row {
        Some(row) => User::try_from(row),
        None => Err(stale_version("user", user.id, user.version)),
    }
}

/// Set-if-absent; returns whichever customer id ends up stored.
pub async fn link_customer(
    pool: &PgPool,
    user_id: Uuid,
    customer: &CustomerExtId,
) -> Result<CustomerExtId, SyncError> {
    let stored: Option<Option<String>> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET customer_id = COALESCE(customer_id, $2), updated_at = now()
        WHERE id = $1
        RETURNING customer_id
        "#,
    )
    .bind(user_id)
    .bind(customer.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| conflict_on_unique(e, format!("{customer} is linked to another user")))?;

    match stored.flatten() {
        Some(stored) => CustomerExtId::new(stored),
        None => Err(SyncError::NotFound(format!("user {user_id}"))),
    }
}

pub async fn set_sync_state(
    pool: &PgPool,
    id: Uuid,
    state: SyncState,
    error: Option<&str>,
) -> Result<(), SyncError> {
    sqlx::query("UPDATE users SET sync_state = $2, sync_error = $3 WHERE id = $1")
        .bind(id)
        .bind(state.as_str())
        .bind(error)
        .execute(pool)
        .await?;
    Ok(())
}
