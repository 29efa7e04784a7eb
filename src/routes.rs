//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod audit;
mod decisions;
mod items;
mod policy;

use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .layer(trace_layer)
        .layer(build_cors_layer());

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Item routes
        .route("/api/items", post(items::ingest_item).get(items::list_items))
        .route("/api/items/{id}", get(items::get_item))
        .route("/api/items/{id}/review", post(items::review_item))
        // Decision routes
        .route("/api/decisions", post(decisions::request_decision))
        // Audit routes
        .route("/api/audit", get(audit::query_audit))
        // Policy routes
        .route("/api/policy/validate", post(policy::validate_policy))
        .route("/api/policy/interpret", post(policy::interpret_policy))
        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
