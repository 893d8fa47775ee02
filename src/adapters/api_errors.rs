use crate::domain::error::SyncError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype so the domain error can be returned from axum handlers.
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

fn internal(kind: &str, err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!("{kind} error: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            SyncError::Verification(msg) => {
                tracing::warn!("webhook rejected: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "webhook_error",
                    "invalid webhook signature or payload".to_string(),
                )
            }
            SyncError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            SyncError::NotFound(msg) => (StatusCode::BAD_REQUEST, "not_found", msg.clone()),
            SyncError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "authentication required".to_string(),
            ),
            SyncError::ForbiddenOrigin(origin) => {
                tracing::warn!(origin = %origin, "cross-origin request rejected");
                (
                    StatusCode::FORBIDDEN,
                    "forbidden_origin",
                    "origin not allowed".to_string(),
                )
            }
            SyncError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            SyncError::Remote(msg) => {
                tracing::error!("payment platform error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "payment_platform_error",
                    "payment platform request failed".to_string(),
                )
            }
            SyncError::Timeout(msg) => {
                tracing::error!("payment platform timeout: {msg}");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "payment_platform_timeout",
                    "payment platform did not respond in time".to_string(),
                )
            }
            SyncError::Config(msg) => internal("config", msg),
            SyncError::Database(err) => internal("database", err),
            SyncError::Serialization(err) => internal("serialization", err),
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: SyncError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn maps_error_kinds_to_status() {
        assert_eq!(status_of(SyncError::Verification("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(SyncError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(SyncError::NotFound("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(SyncError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(SyncError::ForbiddenOrigin("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(SyncError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(SyncError::Remote("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(SyncError::Timeout("x".into())), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_of(SyncError::Config("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
