use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::models::{AssessmentOutcome, ErrorKind};
use crate::orchestrator::UnitStatusReport;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProtocolListResponse {
    pub protocols: Vec<String>,
    pub count: usize,
}

fn status_for(outcome: &AssessmentOutcome) -> StatusCode {
    match outcome {
        AssessmentOutcome::Assessment(_) | AssessmentOutcome::InsufficientData(_) => StatusCode::OK,
        AssessmentOutcome::Error(error) => match error.error_kind {
            ErrorKind::UnsupportedSubject => StatusCode::BAD_REQUEST,
            ErrorKind::WorkflowFailure | ErrorKind::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        },
        AssessmentOutcome::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /api/v1/assess/:protocol
pub async fn assess_protocol(State(state): State<AppState>, Path(protocol): Path<String>) -> Response {
    info!(protocol = %protocol, "Assessment requested");
    let outcome = state.orchestrator.assess(&protocol).await;
    (status_for(&outcome), Json(outcome)).into_response()
}

/// GET /api/v1/units/status
pub async fn unit_status(State(state): State<AppState>) -> Json<UnitStatusReport> {
    Json(state.orchestrator.get_unit_status().await)
}

/// GET /api/v1/protocols
pub async fn list_protocols(State(state): State<AppState>) -> Json<ProtocolListResponse> {
    let protocols = state.orchestrator.validator().supported_protocols().to_vec();
    Json(ProtocolListResponse {
        count: protocols.len(),
        protocols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CancelledResult, ErrorAssessment, Phase};

    #[test]
    fn test_status_codes_follow_outcome() {
        let unsupported = AssessmentOutcome::Error(Box::new(ErrorAssessment::new(
            "Foo",
            None,
            ErrorKind::UnsupportedSubject,
            "nope",
        )));
        assert_eq!(status_for(&unsupported), StatusCode::BAD_REQUEST);

        let failed = AssessmentOutcome::Error(Box::new(ErrorAssessment::new(
            "Foo",
            None,
            ErrorKind::WorkflowFailure,
            "boom",
        )));
        assert_eq!(status_for(&failed), StatusCode::INTERNAL_SERVER_ERROR);

        let cancelled = AssessmentOutcome::Cancelled(CancelledResult {
            subject_name: "Foo".into(),
            run_id: "run".into(),
            phase: Phase::Analysis,
            completed_units: vec![],
            cancelled_at: chrono::Utc::now(),
        });
        assert_eq!(status_for(&cancelled), StatusCode::SERVICE_UNAVAILABLE);
    }
}
