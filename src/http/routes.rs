use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Capture control
        .route("/capture/start", post(handlers::start_capture))
        .route("/capture/stop", post(handlers::stop_capture))
        .route("/capture/cancel", post(handlers::cancel_capture))
        .route("/capture/reset", post(handlers::reset_capture))
        // Queries
        .route("/capture/status", get(handlers::capture_status))
        .route("/capture/form", get(handlers::listing_form))
        .route("/capture/navigation", get(handlers::navigation_targets))
        // Request logging
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
