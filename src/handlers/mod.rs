pub mod assessment;
pub mod health;
pub mod metrics;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub use assessment::{assess_protocol, list_protocols, unit_status};
pub use health::health_check;
pub use metrics::metrics_handler;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/assess/:protocol", get(assess_protocol))
        .route("/api/v1/units/status", get(unit_status))
        .route("/api/v1/protocols", get(list_protocols))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
