use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SourceKind, SourceSnapshots};

/// Severity bucket a unit assigns to one of its risk findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    /// Impact of a finding judged from the score of the factor it came from
    pub fn from_factor_score(score: f64) -> Self {
        if score < 40.0 {
            Impact::High
        } else if score < 70.0 {
            Impact::Medium
        } else {
            Impact::Low
        }
    }
}

/// One scored facet of a unit's analysis (e.g. `contract_verification`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorAssessment {
    pub name: String,
    pub score: f64,
    pub details: Vec<String>,
    pub risks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FactorAssessment {
    pub fn new(name: &str, score: f64, details: Vec<String>, risks: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            score: score.clamp(0.0, 100.0),
            details,
            risks,
            label: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

/// A group of factors averaged into one overall score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisGroup {
    pub overall_score: f64,
    pub components: Vec<FactorAssessment>,
}

impl AnalysisGroup {
    pub fn from_components(components: Vec<FactorAssessment>) -> Self {
        let overall_score = if components.is_empty() {
            0.0
        } else {
            components.iter().map(|c| c.score).sum::<f64>() / components.len() as f64
        };
        Self { overall_score, components }
    }

    pub fn component(&self, name: &str) -> Option<&FactorAssessment> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// A risk statement with the category it was found in and its severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRisk {
    pub category: String,
    pub subcategory: String,
    pub description: String,
    pub severity: Severity,
    pub impact: Impact,
}

/// Risk statements bucketed by severity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl RiskFactors {
    pub fn push(&mut self, severity: Severity, description: &str) {
        let bucket = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
        };
        bucket.push(description.to_string());
    }

    pub fn len(&self) -> usize {
        self.critical.len() + self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Availability and quality of one upstream source as judged by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAssessment {
    pub source: SourceKind,
    pub available: bool,
    pub reliability: f64,
    pub completeness: f64,
    pub freshness: f64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub consistency_checks: Vec<String>,
    pub data_conflicts: Vec<String>,
    pub validation_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapImpact {
    High,
    Moderate,
}

/// A source discovery could not obtain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGap {
    pub missing_source: SourceKind,
    pub impact: GapImpact,
    pub description: String,
    pub alternatives: Vec<String>,
}

impl DataGap {
    pub fn for_source(source: SourceKind) -> Self {
        let (impact, description, alternatives) = match source {
            SourceKind::Github => (
                GapImpact::Moderate,
                "moderate - limits development health assessment",
                vec!["manual repository search", "documentation analysis"],
            ),
            SourceKind::DefiData => (
                GapImpact::High,
                "high - critical for financial health analysis",
                vec!["direct protocol APIs", "alternative aggregators"],
            ),
            SourceKind::Blockchain => (
                GapImpact::Moderate,
                "moderate - reduces on-chain verification confidence",
                vec!["direct RPC calls", "alternative explorers"],
            ),
        };
        Self {
            missing_source: source,
            impact,
            description: description.to_string(),
            alternatives: alternatives.into_iter().map(String::from).collect(),
        }
    }

    /// Finding text used when the gap surfaces in a final assessment
    pub fn finding(&self) -> String {
        format!("Missing {} data source", self.missing_source)
    }
}

/// Payload of the discovery unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub sources: Vec<SourceAssessment>,
    pub sources_found: usize,
    pub overall_quality_score: f64,
    pub freshness_score: f64,
    pub cross_validation: CrossValidation,
    pub optimal_sources: Vec<SourceKind>,
    pub fallback_sources: Vec<SourceKind>,
    pub data_gaps: Vec<DataGap>,
    pub data_risks: Vec<String>,
    pub snapshots: SourceSnapshots,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecuritySourcesUsed {
    pub github: bool,
    pub onchain: bool,
}

/// Payload of the protocol analyst unit. Scores are health scores, higher is safer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub security_score: f64,
    pub technical: AnalysisGroup,
    pub governance: AnalysisGroup,
    pub risks: Vec<ClassifiedRisk>,
    pub risk_factors: RiskFactors,
    pub key_findings: Vec<String>,
    pub security_rating: String,
    pub recommendations: Vec<String>,
    pub sources_used: SecuritySourcesUsed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSourcesUsed {
    pub defi_data: bool,
    pub tvl: bool,
    pub price: bool,
}

/// Payload of the market intelligence unit. Scores are health scores, higher is healthier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub financial_health_score: f64,
    pub financial: AnalysisGroup,
    pub market: AnalysisGroup,
    pub liquidity: AnalysisGroup,
    pub sustainability: AnalysisGroup,
    pub risks: Vec<ClassifiedRisk>,
    pub risk_factors: RiskFactors,
    pub financial_rating: String,
    pub recommendations: Vec<String>,
    pub sources_used: MarketSourcesUsed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_average() {
        let group = AnalysisGroup::from_components(vec![
            FactorAssessment::new("a", 40.0, vec![], vec![]),
            FactorAssessment::new("b", 80.0, vec![], vec![]),
        ]);
        assert_eq!(group.overall_score, 60.0);
        assert!(group.component("b").is_some());
        assert_eq!(AnalysisGroup::from_components(vec![]).overall_score, 0.0);
    }

    #[test]
    fn test_factor_score_is_clamped() {
        assert_eq!(FactorAssessment::new("x", 140.0, vec![], vec![]).score, 100.0);
        assert_eq!(FactorAssessment::new("x", -5.0, vec![], vec![]).score, 0.0);
    }

    #[test]
    fn test_data_gap_impacts() {
        assert_eq!(DataGap::for_source(SourceKind::DefiData).impact, GapImpact::High);
        assert_eq!(DataGap::for_source(SourceKind::Github).impact, GapImpact::Moderate);
        assert_eq!(
            DataGap::for_source(SourceKind::Blockchain).finding(),
            "Missing blockchain data source"
        );
    }
}
