use {
    super::{api_errors::ApiError, verifier::SIGNATURE_HEADER},
    crate::{AppState, domain::outcome::ProcessResult},
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
};

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn wh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sig = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let event = state.verifier.verify(&body, sig)?;

    // Add event context to the span so all subsequent logs are correlated.
    tracing::Span::current()
        .record("event_id", tracing::field::display(event.id()))
        .record("event_type", tracing::field::display(event.event_type()));

    let result = state.events.process(&event).await?;
    match &result {
        ProcessResult::Created(id) => tracing::info!(document_id = %id, "document created"),
        ProcessResult::Updated(id) => tracing::info!(document_id = %id, "document updated"),
        ProcessResult::Unchanged(id) => tracing::debug!(document_id = %id, "nothing to change"),
        ProcessResult::Stale(id) => tracing::info!(document_id = %id, "stale event, skipped"),
        ProcessResult::Anomaly(id) => {
            tracing::warn!(document_id = %id, "anomalous transition, logged")
        }
        ProcessResult::Duplicate => tracing::info!("duplicate event, already processed"),
        ProcessResult::Ignored(reason) => tracing::info!(reason = %reason, "event ignored"),
    }
    Ok(Json(serde_json::json!({"status": result.status()})))
}
