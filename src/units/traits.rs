use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;
use crate::models::{RunContext, UnitId, UnitKind, UnitPayload};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Missing required data: {field}")]
    MissingData { field: String },

    #[error("Upstream source failed: {source_name} - {message}")]
    Upstream { source_name: String, message: String },

    #[error("Analysis failed: {message}")]
    AnalysisFailed { message: String },

    #[error("Unit misconfigured: {message}")]
    Configuration { message: String },

    #[error("Synthesis compilation failed: {message}")]
    Compilation { message: String },

    #[error("Unit timed out")]
    Timeout,

    #[error("Unit cancelled")]
    Cancelled,
}

impl UnitError {
    /// Whether another attempt could plausibly succeed
    pub fn retryable(&self) -> bool {
        matches!(self, UnitError::Upstream { .. } | UnitError::AnalysisFailed { .. })
    }
}

impl From<AppError> for UnitError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Cancelled(_) => UnitError::Cancelled,
            AppError::ConfigError(message) => UnitError::Configuration { message },
            AppError::ExternalServiceError(message) | AppError::ExternalApiError(message) => UnitError::Upstream {
                source_name: "external".to_string(),
                message,
            },
            other => UnitError::AnalysisFailed { message: other.to_string() },
        }
    }
}

/// What a unit hands back to the executor on success
#[derive(Debug, Clone, PartialEq)]
pub struct UnitAnalysis {
    pub payload: UnitPayload,
    /// Unit's own estimate of how complete its analysis is, in [0, 1]
    pub completeness: f64,
    pub reasoning: String,
    pub warnings: Vec<String>,
}

impl UnitAnalysis {
    pub fn new(payload: UnitPayload, completeness: f64, reasoning: impl Into<String>) -> Self {
        Self {
            payload,
            completeness: completeness.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// An independent analysis task run once per assessment
#[async_trait]
pub trait AnalysisUnit: Send + Sync {
    fn unit_id(&self) -> UnitId;

    fn kind(&self) -> UnitKind;

    /// Report fields whose presence drives the data-quality part of confidence
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    async fn analyze(&self, ctx: &RunContext) -> Result<UnitAnalysis, UnitError>;
}
