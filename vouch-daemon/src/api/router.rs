//! API router configuration.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/whitelist/start",
            get(handlers::start_form).post(handlers::start),
        )
        .route("/whitelist/finish", get(handlers::finish))
        .route("/whitelist/check", get(handlers::check))
        .route("/whitelist/check_json", get(handlers::check_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
