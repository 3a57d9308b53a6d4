//! API Route Configuration

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use super::handlers::{self, AppState};
use super::middleware::{
    auth_middleware, envelope_middleware, logging_middleware, rate_limit_middleware,
};

/// Room for the JSON envelope around the source text
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state
        .scanner
        .config()
        .max_source_bytes
        .saturating_add(BODY_OVERHEAD_BYTES);

    let api_v1 = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .route("/checklist", get(handlers::get_checklist))
        .route("/scan/source", post(handlers::scan_source))
        .route("/scan/bytecode", post(handlers::scan_bytecode))
        .route("/scan/address", post(handlers::scan_address))
        .route("/scan/batch", post(handlers::batch_scan));

    Router::new()
        .nest("/v1", api_v1)
        .route("/health", get(handlers::health_check))
        // Middleware (order matters - bottom runs first)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::from_fn(envelope_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
