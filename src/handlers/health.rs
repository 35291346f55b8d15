use axum::{extract::State, Json};
use serde::Serialize;
use tracing::debug;

use crate::orchestrator::HealthState;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthState,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub active_sessions: usize,
    pub timestamp: String,
}

/// Handler for health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let units = state.orchestrator.get_unit_status().await;
    let now = chrono::Utc::now();
    debug!(status = ?units.overall_health, "Health check");

    Json(HealthResponse {
        status: units.overall_health,
        service: "defi-risk-orchestrator",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (now - state.started_at).num_seconds(),
        active_sessions: state.orchestrator.store().len().await,
        timestamp: now.to_rfc3339(),
    })
}
