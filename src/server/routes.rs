//! Router configuration for the trigger server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Queue triggers
        .route("/tasks/:family/enqueue", post(handlers::enqueue_tasks))
        .route("/tasks/:family/drain", post(handlers::drain_tasks))
        .route("/tasks/:family/status", get(handlers::family_status))
        // Progress polling
        .route("/progress/:id", get(handlers::get_progress))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
