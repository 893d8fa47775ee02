use {
    super::api_errors::ApiError,
    crate::{AppState, domain::error::SyncError},
    axum::{
        extract::{Request, State},
        http::header::ORIGIN,
        middleware::Next,
        response::{IntoResponse, Response},
    },
};

/// Rejects browser requests from any origin but the storefront.
///
/// Requests without an `Origin` header (same-origin navigations, server
/// clients) pass through.
pub async fn require_app_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(origin) = request.headers().get(ORIGIN) {
        let allowed = origin
            .to_str()
            .is_ok_and(|o| o.trim_end_matches('/') == state.app_url.as_ref());
        if !allowed {
            let origin = String::from_utf8_lossy(origin.as_bytes()).into_owned();
            return ApiError(SyncError::ForbiddenOrigin(origin)).into_response();
        }
    }
    next.run(request).await
}
