use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/session/start", post(handlers::start_session))
        .route("/session/stop", post(handlers::stop_session))
        // Session queries
        .route("/session", get(handlers::get_session))
        .route("/session/messages", get(handlers::get_messages))
        .route("/session/stats", get(handlers::get_stats))
        .route("/session/levels", get(handlers::get_levels))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Let a browser UI on another origin poll the session
        .layer(CorsLayer::permissive())
        .with_state(state)
}
