//! Shared state and router construction for the HTTP service.
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::handler::JobHandler;

pub struct AppState {
    pub job_handler: JobHandler,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/run", post(handlers::run_job))
        .route("/render", post(handlers::render))
        .route("/workflows", get(handlers::list_workflows))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
