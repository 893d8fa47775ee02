use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("verification: {0}")]
    Verification(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden origin: {0}")]
    ForbiddenOrigin(String),

    #[error("payment platform: {0}")]
    Remote(String),

    #[error("payment platform timeout: {0}")]
    Timeout(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("config: {0}")]
    Config(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Remote failures and timeouts are worth another attempt; everything
    /// else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Timeout(_))
    }
}
