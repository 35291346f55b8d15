use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info};

use crate::models::{
    CrossValidation, DataGap, DiscoveryReport, RunContext, SourceAssessment, SourceKind, SourceResponse,
    SourceSnapshots, UnitId, UnitKind, UnitPayload,
};
use crate::services::{DataSourceClient, NarrativeGenerator};
use crate::units::traits::{AnalysisUnit, UnitAnalysis, UnitError};
use crate::utils::math::{mean, round_to};
use crate::utils::time::banded_freshness;

const OPTIMAL_RELIABILITY: f64 = 0.7;
const FALLBACK_RELIABILITY: f64 = 0.5;

/// Fetch every given source concurrently
pub(crate) async fn fetch_all(
    sources: &[Arc<dyn DataSourceClient>],
    subject: &str,
    timeout: Duration,
) -> Vec<SourceResponse> {
    join_all(sources.iter().map(|source| source.fetch(subject, timeout))).await
}

/// Fetch only the given kinds and parse them into snapshots
pub(crate) async fn fetch_snapshots(
    sources: &[Arc<dyn DataSourceClient>],
    kinds: &[SourceKind],
    subject: &str,
    timeout: Duration,
) -> SourceSnapshots {
    let wanted: Vec<Arc<dyn DataSourceClient>> = sources
        .iter()
        .filter(|source| kinds.contains(&source.source()))
        .cloned()
        .collect();
    let mut snapshots = SourceSnapshots::default();
    for response in fetch_all(&wanted, subject, timeout).await {
        snapshots.absorb(&response);
    }
    snapshots
}

/// Discovery unit: finds, validates and scores the upstream data for a subject
pub struct DataHunter {
    sources: Vec<Arc<dyn DataSourceClient>>,
    fetch_timeout: Duration,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
}

impl DataHunter {
    pub fn new(sources: Vec<Arc<dyn DataSourceClient>>, fetch_timeout: Duration) -> Self {
        Self {
            sources,
            fetch_timeout,
            narrator: None,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    fn assess_sources(responses: &[SourceResponse]) -> Vec<SourceAssessment> {
        let now = Utc::now();
        SourceKind::ALL
            .iter()
            .map(|kind| match responses.iter().find(|r| r.source == *kind && r.success) {
                Some(response) => SourceAssessment {
                    source: *kind,
                    available: true,
                    reliability: response.confidence_hint,
                    completeness: response.completeness(),
                    freshness: banded_freshness(response.fetched_at, now),
                    errors: Vec::new(),
                },
                None => SourceAssessment {
                    source: *kind,
                    available: false,
                    reliability: 0.0,
                    completeness: 0.0,
                    freshness: 0.0,
                    errors: responses
                        .iter()
                        .filter(|r| r.source == *kind)
                        .flat_map(|r| r.errors.clone())
                        .collect(),
                },
            })
            .collect()
    }

    fn cross_validate(responses: &[SourceResponse]) -> CrossValidation {
        let mut validation = CrossValidation::default();
        let successful: Vec<&SourceResponse> = responses.iter().filter(|r| r.success).collect();

        let names: HashSet<&str> = successful.iter().filter_map(|r| r.protocol_name()).collect();
        if names.len() <= 1 {
            validation
                .consistency_checks
                .push("Protocol names consistent across sources".to_string());
            validation.validation_score += 0.3;
        } else {
            validation
                .data_conflicts
                .push("Inconsistent protocol names across sources".to_string());
        }

        let timestamps = successful.iter().filter(|r| r.last_updated().is_some()).count();
        if timestamps > 1 {
            validation
                .consistency_checks
                .push("Data timestamps are reasonably consistent".to_string());
            validation.validation_score += 0.2;
        }

        if validation.data_conflicts.is_empty() {
            validation.validation_score += 0.5;
        }
        validation.validation_score = validation.validation_score.min(1.0);
        validation
    }

    fn data_risks(report: &DiscoveryReport) -> Vec<String> {
        let mut risks = Vec::new();
        let available = |kind: SourceKind| report.sources.iter().any(|s| s.source == kind && s.available);

        if report.sources_found < 2 {
            risks.push("Limited data source diversity increases analysis risk".to_string());
        }
        if report.overall_quality_score < 50.0 {
            risks.push("Low data quality may compromise analysis accuracy".to_string());
        }
        if report.cross_validation.validation_score < 0.5 {
            risks.push("Poor cross-validation reduces confidence in data consistency".to_string());
        }
        if report.freshness_score < 0.5 {
            risks.push("Stale data may not reflect current protocol state".to_string());
        }
        if !available(SourceKind::DefiData) {
            risks.push("Missing financial data limits comprehensive risk assessment".to_string());
        }
        if !available(SourceKind::Github) {
            risks.push("Missing development data reduces technical risk assessment capability".to_string());
        }
        risks
    }

    fn key_findings(report: &DiscoveryReport) -> Vec<String> {
        let mut findings = vec![format!("{}/3 primary data sources are accessible", report.sources_found)];

        findings.push(
            if report.overall_quality_score > 80.0 {
                "Excellent data quality across available sources"
            } else if report.overall_quality_score > 60.0 {
                "Good data quality with minor limitations"
            } else {
                "Data quality concerns identified"
            }
            .to_string(),
        );

        let validation = report.cross_validation.validation_score;
        findings.push(
            if validation > 0.8 {
                "Strong cross-validation between data sources"
            } else if validation > 0.5 {
                "Moderate cross-validation success"
            } else {
                "Limited cross-validation capability"
            }
            .to_string(),
        );
        findings
    }

    /// Discovery's own confidence: availability, quality, validation and freshness
    fn discovery_confidence(report: &DiscoveryReport) -> f64 {
        let availability = report.sources_found as f64 / SourceKind::ALL.len() as f64;
        let confidence = availability * 0.3
            + (report.overall_quality_score / 100.0) * 0.4
            + report.cross_validation.validation_score * 0.2
            + report.freshness_score * 0.1;
        confidence.clamp(0.0, 1.0)
    }

    pub fn build_report(responses: &[SourceResponse]) -> DiscoveryReport {
        let sources = Self::assess_sources(responses);
        let available: Vec<&SourceAssessment> = sources.iter().filter(|s| s.available).collect();
        let sources_found = available.len();

        let overall_quality_score = if sources_found > 0 {
            let reliabilities: Vec<f64> = available.iter().map(|s| s.reliability).collect();
            let avg_reliability = mean(&reliabilities).unwrap_or(0.0);
            let coverage = sources_found as f64 / SourceKind::ALL.len() as f64;
            round_to((avg_reliability * 0.7 + coverage * 0.3) * 100.0, 2)
        } else {
            0.0
        };
        let freshness: Vec<f64> = available.iter().map(|s| s.freshness).collect();
        let freshness_score = mean(&freshness).unwrap_or(0.0);

        let mut ranked: Vec<&SourceAssessment> = available
            .iter()
            .copied()
            .filter(|s| s.reliability > FALLBACK_RELIABILITY)
            .collect();
        ranked.sort_by(|a, b| b.reliability.total_cmp(&a.reliability));
        let optimal_sources = ranked
            .iter()
            .filter(|s| s.reliability > OPTIMAL_RELIABILITY)
            .map(|s| s.source)
            .collect();
        let fallback_sources = ranked
            .iter()
            .filter(|s| s.reliability <= OPTIMAL_RELIABILITY)
            .map(|s| s.source)
            .collect();

        let data_gaps = sources
            .iter()
            .filter(|s| !s.available)
            .map(|s| DataGap::for_source(s.source))
            .collect();

        let mut snapshots = SourceSnapshots::default();
        for response in responses {
            snapshots.absorb(response);
        }

        let mut report = DiscoveryReport {
            sources,
            sources_found,
            overall_quality_score,
            freshness_score,
            cross_validation: Self::cross_validate(responses),
            optimal_sources,
            fallback_sources,
            data_gaps,
            data_risks: Vec::new(),
            snapshots,
            narrative: None,
            observed_at: Utc::now(),
        };
        report.data_risks = Self::data_risks(&report);
        report
    }
}

#[async_trait]
impl AnalysisUnit for DataHunter {
    fn unit_id(&self) -> UnitId {
        UnitId::from(UnitId::DATA_HUNTER)
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Discovery
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["sources", "overall_quality_score", "cross_validation", "snapshots"]
    }

    async fn analyze(&self, ctx: &RunContext) -> Result<UnitAnalysis, UnitError> {
        info!(protocol = %ctx.subject_name, run_id = %ctx.run_id, "Discovering data sources");

        let responses = fetch_all(&self.sources, &ctx.subject_name, self.fetch_timeout).await;
        let warnings: Vec<String> = responses
            .iter()
            .filter(|r| !r.success)
            .map(|r| format!("{}: {}", r.source, r.errors.join("; ")))
            .collect();

        let mut report = Self::build_report(&responses);
        if report.sources_found == 0 {
            return Err(UnitError::Upstream {
                source_name: "all".to_string(),
                message: format!("no data source answered for {}", ctx.subject_name),
            });
        }

        if let Some(narrator) = &self.narrator {
            let prompt = format!(
                "Summarize data availability for {} in two sentences, noting any reliability concerns.",
                ctx.subject_name
            );
            let context = json!({
                "sources_found": report.sources_found,
                "overall_quality_score": report.overall_quality_score,
                "data_risks": report.data_risks,
            });
            report.narrative = narrator.generate(&prompt, &context).await.ok();
        }

        let completeness = Self::discovery_confidence(&report);
        let reasoning = Self::key_findings(&report).join(". ");
        debug!(
            protocol = %ctx.subject_name,
            sources_found = report.sources_found,
            quality = report.overall_quality_score,
            "Discovery finished"
        );

        Ok(UnitAnalysis::new(UnitPayload::Discovery(Box::new(report)), completeness, reasoning).with_warnings(warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn github() -> SourceResponse {
        SourceResponse::ok(
            SourceKind::Github,
            json!({
                "protocol_name": "Lido",
                "health_score": 80,
                "repository_metrics": {"commits_30d": 40},
                "health_components": {"community_engagement": 75},
                "last_updated": "2024-01-01T00:00:00Z"
            }),
            0.9,
        )
    }

    fn defi() -> SourceResponse {
        SourceResponse::ok(
            SourceKind::DefiData,
            json!({
                "protocol_name": "Lido",
                "financial_health_score": 70,
                "tvl_metrics": {"current_tvl_usd": 1.0e10},
                "price_metrics": {"current_price_usd": 2000.0},
                "last_updated": "2024-01-01T00:00:00Z"
            }),
            0.7,
        )
    }

    #[test]
    fn test_quality_score_blends_reliability_and_coverage() {
        let report = DataHunter::build_report(&[
            github(),
            defi(),
            SourceResponse::failed(SourceKind::Blockchain, "timeout"),
        ]);
        assert_eq!(report.sources_found, 2);
        // (0.8 * 0.7 + 2/3 * 0.3) * 100
        assert!((report.overall_quality_score - 76.0).abs() < 0.01);
        assert_eq!(report.optimal_sources, vec![SourceKind::Github]);
        assert_eq!(report.fallback_sources, vec![SourceKind::DefiData]);
        assert_eq!(report.data_gaps.len(), 1);
        assert_eq!(report.data_gaps[0].missing_source, SourceKind::Blockchain);
        assert!(report.snapshots.github.is_some());
        assert!(report.snapshots.market.is_some());
        assert_eq!(report.cross_validation.validation_score, 1.0);
        assert!(report.data_risks.is_empty());
    }

    #[test]
    fn test_name_conflict_lowers_validation() {
        let mut other = defi();
        other.payload["protocol_name"] = json!("Lido Finance");
        let report = DataHunter::build_report(&[github(), other]);
        assert_eq!(report.cross_validation.validation_score, 0.2);
        assert!(report
            .data_risks
            .contains(&"Poor cross-validation reduces confidence in data consistency".to_string()));
    }

    #[test]
    fn test_no_sources_reports_every_gap() {
        let report = DataHunter::build_report(&[]);
        assert_eq!(report.sources_found, 0);
        assert_eq!(report.overall_quality_score, 0.0);
        assert_eq!(report.data_gaps.len(), 3);
        assert!(report
            .data_risks
            .contains(&"Missing financial data limits comprehensive risk assessment".to_string()));
    }
}
