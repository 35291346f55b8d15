// Risk synthesis error types
use thiserror::Error;

use crate::error::AppError;
use crate::units::UnitError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Invalid weight set: {reason}")]
    InvalidWeights { reason: String },

    #[error("Weights must sum to 1.0, got {sum}")]
    WeightSum { sum: f64 },

    #[error("Malformed payload from {unit_id}: expected {expected}")]
    MalformedPayload { unit_id: String, expected: String },

    #[error("Risk calculation failed: {message}")]
    CalculationError { message: String },
}

impl From<RiskError> for AppError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::InvalidWeights { .. } | RiskError::WeightSum { .. } => AppError::ConfigError(err.to_string()),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl From<RiskError> for UnitError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::InvalidWeights { .. } | RiskError::WeightSum { .. } => UnitError::Configuration {
                message: err.to_string(),
            },
            other => UnitError::Compilation {
                message: other.to_string(),
            },
        }
    }
}
