use {
    super::api_errors::ApiError,
    crate::{
        AppState,
        domain::error::SyncError,
        services::checkout::{CartLine, CheckoutResponse},
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
};

#[tracing::instrument(name = "checkout_request", skip_all, fields(user_id = tracing::field::Empty))]
pub async fn checkout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let user = state.sessions.resolve(&headers).await?;
    tracing::Span::current().record("user_id", tracing::field::display(user.id));

    // Parsed by hand so a malformed cart is a validation error, not axum's 422.
    let cart: Vec<CartLine> = serde_json::from_slice(&body)
        .map_err(|e| SyncError::Validation(format!("malformed cart: {e}")))?;

    let response = state.checkout.create_session(&user, &cart).await?;
    Ok(Json(response))
}
