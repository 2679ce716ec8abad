//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Returns status, module name, version and the active storage backend
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub backend: String,
}

/// GET /health
///
/// Does NOT require authentication.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "peal-ui".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.storage.backend_name().to_string(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
