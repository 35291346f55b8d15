use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Phase, UnitId};

/// Risk categories the synthesis engine scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Security,
    Financial,
    Technical,
    Governance,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Security,
        RiskCategory::Financial,
        RiskCategory::Technical,
        RiskCategory::Governance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Security => "security",
            RiskCategory::Financial => "financial",
            RiskCategory::Technical => "technical",
            RiskCategory::Governance => "governance",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskCategory::Security => "Security Risk",
            RiskCategory::Financial => "Financial Risk",
            RiskCategory::Technical => "Technical Risk",
            RiskCategory::Governance => "Governance Risk",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse risk classification. `Critical` is reserved for error stand-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

pub const LOW_TIER_MAX: f64 = 30.0;
pub const MEDIUM_TIER_MAX: f64 = 70.0;

impl RiskTier {
    pub fn from_score(score: f64) -> Self {
        if score <= LOW_TIER_MAX {
            RiskTier::Low
        } else if score <= MEDIUM_TIER_MAX {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a component came from a unit's output or a conservative substitute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentSource {
    Derived,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskComponent {
    pub category: RiskCategory,
    pub score: f64,
    pub weight: f64,
    pub confidence: f64,
    pub contribution: f64,
    pub contributing_factors: Vec<String>,
    pub source_unit_id: Option<UnitId>,
    pub source: ComponentSource,
    pub details: String,
}

impl RiskComponent {
    pub fn is_default(&self) -> bool {
        self.source == ComponentSource::Default
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Medium,
    Low,
}

impl Reliability {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            Reliability::High
        } else if confidence > 0.5 {
            Reliability::Medium
        } else {
            Reliability::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReliability {
    pub score: f64,
    pub confidence: f64,
    pub reliability: Reliability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub overall_consensus: f64,
    pub per_component_reliability: BTreeMap<RiskCategory, ComponentReliability>,
    pub agreements: Vec<String>,
    pub conflicts: Vec<String>,
    /// Sample variance of the confidences behind non-default components
    pub confidence_variance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub immediate_actions: Vec<String>,
    pub risk_mitigation: Vec<String>,
    pub monitoring_suggestions: Vec<String>,
    pub long_term_considerations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDriver {
    pub category: RiskCategory,
    pub score: f64,
    pub contribution: f64,
    pub confidence: f64,
    pub top_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionShare {
    pub percentage: f64,
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightConfidence {
    pub level: ConfidenceLevel,
    pub reasoning: String,
    pub consensus_score: f64,
    pub data_coverage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskInsights {
    pub summary: String,
    pub primary_risk_drivers: Vec<RiskDriver>,
    pub risk_distribution: BTreeMap<RiskCategory, DistributionShare>,
    pub confidence_assessment: InsightConfidence,
    pub uncertainty_factors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Success,
    Failed,
}

/// Headline numbers of one unit, kept for transparency in the final verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit_id: UnitId,
    pub status: UnitStatus,
    pub confidence: f64,
    pub headline: BTreeMap<String, f64>,
}

/// The run's terminal artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAssessment {
    pub subject_name: String,
    pub final_score: f64,
    pub risk_tier: RiskTier,
    pub confidence: f64,
    pub components: Vec<RiskComponent>,
    pub consensus: ConsensusReport,
    pub critical_findings: Vec<String>,
    pub major_findings: Vec<String>,
    pub minor_findings: Vec<String>,
    pub recommendations: Recommendations,
    pub insights: RiskInsights,
    pub executive_summary: String,
    pub unit_summaries: Vec<UnitSummary>,
    pub run_id: String,
    pub computed_at: DateTime<Utc>,
}

impl FinalAssessment {
    pub fn component(&self, category: RiskCategory) -> Option<&RiskComponent> {
        self.components.iter().find(|c| c.category == category)
    }
}

/// Returned instead of a verdict when too few units succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientDataResult {
    pub subject_name: String,
    pub run_id: String,
    pub available_units: Vec<UnitId>,
    pub missing_units: Vec<UnitId>,
    pub minimum_requirements_met: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedSubject,
    WorkflowFailure,
    GeneralFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedSubject => "unsupported_protocol",
            ErrorKind::WorkflowFailure => "workflow_failure",
            ErrorKind::GeneralFailure => "general_failure",
        }
    }
}

/// Well-formed stand-in returned when a run fails outright
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAssessment {
    pub subject_name: String,
    pub run_id: Option<String>,
    pub final_score: f64,
    pub risk_tier: RiskTier,
    pub confidence: f64,
    pub components: Vec<RiskComponent>,
    pub error_kind: ErrorKind,
    pub error: String,
    pub summary: String,
    pub suggestions: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl ErrorAssessment {
    pub fn new(subject_name: &str, run_id: Option<String>, error_kind: ErrorKind, error: impl Into<String>) -> Self {
        let components = RiskCategory::ALL
            .iter()
            .map(|category| RiskComponent {
                category: *category,
                score: 100.0,
                weight: 0.0,
                confidence: 0.0,
                contribution: 0.0,
                contributing_factors: Vec::new(),
                source_unit_id: None,
                source: ComponentSource::Default,
                details: "Assessment failed".to_string(),
            })
            .collect();

        Self {
            subject_name: subject_name.to_string(),
            run_id,
            final_score: 100.0,
            risk_tier: RiskTier::Critical,
            confidence: 0.0,
            components,
            error_kind,
            error: error.into(),
            summary: format!("Risk assessment for {} failed: {}", subject_name, error_kind.as_str()),
            suggestions: Vec::new(),
            computed_at: Utc::now(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledResult {
    pub subject_name: String,
    pub run_id: String,
    pub phase: Phase,
    pub completed_units: Vec<UnitId>,
    pub cancelled_at: DateTime<Utc>,
}

/// What the synthesis unit produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisOutcome {
    Assessment(FinalAssessment),
    InsufficientData(InsufficientDataResult),
}

/// What callers of the orchestrator receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssessmentOutcome {
    Assessment(Box<FinalAssessment>),
    InsufficientData(InsufficientDataResult),
    Error(Box<ErrorAssessment>),
    Cancelled(CancelledResult),
}

impl AssessmentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AssessmentOutcome::Assessment(_) => "assessment",
            AssessmentOutcome::InsufficientData(_) => "insufficient_data",
            AssessmentOutcome::Error(_) => "error",
            AssessmentOutcome::Cancelled(_) => "cancelled",
        }
    }

    pub fn assessment(&self) -> Option<&FinalAssessment> {
        match self {
            AssessmentOutcome::Assessment(assessment) => Some(assessment),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(RiskTier::from_score(0.0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(30.0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(30.01), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(70.0), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(70.01), RiskTier::High);
        assert_eq!(RiskTier::from_score(100.0), RiskTier::High);
    }

    #[test]
    fn test_reliability_bands() {
        assert_eq!(Reliability::from_confidence(0.81), Reliability::High);
        assert_eq!(Reliability::from_confidence(0.8), Reliability::Medium);
        assert_eq!(Reliability::from_confidence(0.5), Reliability::Low);
    }

    #[test]
    fn test_error_assessment_shape() {
        let error = ErrorAssessment::new("Foo", None, ErrorKind::WorkflowFailure, "boom");
        assert_eq!(error.final_score, 100.0);
        assert_eq!(error.risk_tier, RiskTier::Critical);
        assert_eq!(error.confidence, 0.0);
        assert_eq!(error.components.len(), 4);
        assert!(error.components.iter().all(|c| c.score == 100.0));
        assert_eq!(error.summary, "Risk assessment for Foo failed: workflow_failure");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = AssessmentOutcome::Error(Box::new(ErrorAssessment::new(
            "Foo",
            None,
            ErrorKind::UnsupportedSubject,
            "unknown",
        )));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["risk_tier"], "CRITICAL");
        assert_eq!(json["error_kind"], "unsupported_subject");
    }
}
