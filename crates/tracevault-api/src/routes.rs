//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // The ingress surface is consumed by a separate frontend origin, so
    // CORS is open for methods and headers the endpoints use.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let max_upload = state.config.api.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/api/status/{evidence_id}", get(handlers::evidence_status))
        .route("/api/report/{evidence_id}", get(handlers::evidence_report))
        .route("/api/jobs/{job_id}", get(handlers::job_status))
        .route(
            "/api/evidence/{evidence_id}",
            delete(handlers::delete_evidence),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
