//! Health check handler

use axum::{Json, extract::State};
use serde::Serialize;

use crate::services::ServiceStats;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub stats: ServiceStats,
}

/// Service status plus cache and worker pool counters
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.service.stats().await;
    let status = if stats.shutting_down {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        stats,
    })
}
