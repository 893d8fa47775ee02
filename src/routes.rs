use {
    crate::{
        AppState,
        adapters::{checkout::checkout_handler, origin::require_app_origin, stripe_webhook::wh_handler},
    },
    axum::{
        Router,
        extract::DefaultBodyLimit,
        http::{HeaderName, HeaderValue, Method, header::CONTENT_TYPE},
        middleware,
        routing::{get, post},
    },
    tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer},
};

const STRIPE_CHECKOUT_ORIGIN: &str = "https://checkout.stripe.com";

fn cors(app_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = [app_url, STRIPE_CHECKOUT_ORIGIN]
        .into_iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-user-id")])
}

pub fn router(state: AppState) -> Router {
    let checkout = post(checkout_handler).route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_app_origin,
    ));

    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/checkout", checkout)
        .route("/webhooks/stripe", post(wh_handler))
        // Events and carts are small.
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors(&state.app_url))
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
