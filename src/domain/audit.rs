use {
    super::id::EventId,
    chrono::{DateTime, Utc},
    serde::Serialize,
    uuid::Uuid,
};

/// One audit row per applied event (unique on `event_id`).
#[derive(Debug, Clone, Serialize)]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub event_id: String,
    pub action: String,
    pub actor: String,
    pub detail: serde_json::Value,
}

/// Ledger row marking a webhook event as fully applied.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub provider_ts: i64,
    pub outcome: String,
}

/// Durable record of an outbound sync that gave up.
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub id: Uuid,
    pub collection: String,
    pub document_id: Uuid,
    pub operation: String,
    pub error: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl SyncFailure {
    pub fn new(
        collection: &str,
        document_id: Uuid,
        operation: &str,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            collection: collection.to_string(),
            document_id,
            operation: operation.to_string(),
            error: error.into(),
            attempts,
            created_at: Utc::now(),
        }
    }
}
