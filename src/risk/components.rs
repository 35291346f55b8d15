use crate::models::{
    ComponentSource, DiscoveryReport, FinancialReport, RiskCategory, RiskComponent, RunContext, SecurityReport,
    UnitKind, UnitPayload, UnitResult,
};
use crate::risk::errors::RiskError;
use crate::risk::weights::WeightSet;
use crate::utils::math::clamp_score;

/// Successful unit outputs the synthesis engine works from
#[derive(Debug, Default)]
pub struct UnitOutputs<'a> {
    pub discovery: Option<(&'a UnitResult, &'a DiscoveryReport)>,
    pub security: Option<(&'a UnitResult, &'a SecurityReport)>,
    pub financial: Option<(&'a UnitResult, &'a FinancialReport)>,
    /// Successful discovery and analysis results, in unit id order
    pub successes: Vec<&'a UnitResult>,
}

impl<'a> UnitOutputs<'a> {
    /// Collect the typed reports from a run. A successful unit whose payload
    /// does not match its kind is a compilation fault.
    pub fn from_context(ctx: &'a RunContext) -> Result<Self, RiskError> {
        let mut outputs = UnitOutputs::default();

        for result in ctx.successful_results() {
            match (result.kind, &result.payload) {
                (UnitKind::Synthesis, _) => continue,
                (UnitKind::Discovery, UnitPayload::Discovery(report)) => {
                    outputs.discovery.get_or_insert((result, report.as_ref()));
                }
                (UnitKind::Analysis, UnitPayload::Security(report)) => {
                    outputs.security.get_or_insert((result, report.as_ref()));
                }
                (UnitKind::Analysis, UnitPayload::Financial(report)) => {
                    outputs.financial.get_or_insert((result, report.as_ref()));
                }
                (UnitKind::Discovery, _) => {
                    return Err(RiskError::MalformedPayload {
                        unit_id: result.unit_id.to_string(),
                        expected: "discovery report".to_string(),
                    })
                }
                (UnitKind::Analysis, _) => {
                    return Err(RiskError::MalformedPayload {
                        unit_id: result.unit_id.to_string(),
                        expected: "security or financial report".to_string(),
                    })
                }
            }
            outputs.successes.push(result);
        }
        Ok(outputs)
    }

    pub fn has_analysis(&self) -> bool {
        self.successes.iter().any(|result| result.kind == UnitKind::Analysis)
    }
}

fn derived(category: RiskCategory, score: f64, result: &UnitResult, factors: Vec<String>, details: String) -> RiskComponent {
    RiskComponent {
        category,
        score: clamp_score(score),
        weight: 0.0,
        confidence: result.confidence,
        contribution: 0.0,
        contributing_factors: factors,
        source_unit_id: Some(result.unit_id.clone()),
        source: ComponentSource::Derived,
        details,
    }
}

/// Conservative stand-in used when the unit behind a category did not succeed
pub fn default_component(category: RiskCategory) -> RiskComponent {
    let (score, confidence, factor, details) = match category {
        RiskCategory::Security => (75.0, 0.2, "Missing security analysis", "No security analysis available"),
        RiskCategory::Financial => (60.0, 0.3, "Missing financial analysis", "No financial analysis available"),
        RiskCategory::Technical => (
            70.0,
            0.1,
            "Missing data quality assessment",
            "No data quality analysis available",
        ),
        RiskCategory::Governance => (65.0, 0.2, "Missing governance analysis", "No governance analysis available"),
    };
    RiskComponent {
        category,
        score,
        weight: 0.0,
        confidence,
        contribution: 0.0,
        contributing_factors: vec![factor.to_string()],
        source_unit_id: None,
        source: ComponentSource::Default,
        details: details.to_string(),
    }
}

fn security_component(result: &UnitResult, report: &SecurityReport) -> RiskComponent {
    let factors = report
        .risk_factors
        .critical
        .iter()
        .take(3)
        .chain(report.risk_factors.high.iter().take(2))
        .cloned()
        .collect();
    let details = report
        .narrative
        .clone()
        .unwrap_or_else(|| "Security analysis completed".to_string());
    derived(RiskCategory::Security, 100.0 - report.security_score, result, factors, details)
}

fn financial_component(result: &UnitResult, report: &FinancialReport) -> RiskComponent {
    let factors = report
        .risk_factors
        .critical
        .iter()
        .take(2)
        .chain(report.risk_factors.high.iter().take(2))
        .cloned()
        .collect();
    let details = report
        .narrative
        .clone()
        .unwrap_or_else(|| "Financial analysis completed".to_string());
    derived(
        RiskCategory::Financial,
        100.0 - report.financial_health_score,
        result,
        factors,
        details,
    )
}

fn technical_component(result: &UnitResult, report: &DiscoveryReport) -> RiskComponent {
    let factors = report
        .data_gaps
        .iter()
        .take(3)
        .map(|gap| gap.missing_source.as_str().to_string())
        .collect();
    derived(
        RiskCategory::Technical,
        100.0 - report.overall_quality_score,
        result,
        factors,
        format!("Data quality score: {:.1}/100", report.overall_quality_score),
    )
}

fn governance_component(result: &UnitResult, report: &SecurityReport) -> RiskComponent {
    let factors = report
        .governance
        .components
        .iter()
        .flat_map(|component| component.risks.iter().take(2))
        .take(4)
        .cloned()
        .collect();
    derived(
        RiskCategory::Governance,
        100.0 - report.governance.overall_score,
        result,
        factors,
        format!("Governance score: {:.1}/100", report.governance.overall_score),
    )
}

/// One component per weighted category, in weight-set order, with weight and
/// contribution (`score × weight`) filled in
pub fn score_components(outputs: &UnitOutputs, weights: &WeightSet) -> Vec<RiskComponent> {
    weights
        .iter()
        .map(|(category, weight)| {
            let mut component = match category {
                RiskCategory::Security => outputs.security.map(|(r, report)| security_component(r, report)),
                RiskCategory::Financial => outputs.financial.map(|(r, report)| financial_component(r, report)),
                RiskCategory::Technical => outputs.discovery.map(|(r, report)| technical_component(r, report)),
                RiskCategory::Governance => outputs.security.map(|(r, report)| governance_component(r, report)),
            }
            .unwrap_or_else(|| default_component(category));
            component.weight = weight;
            component.contribution = component.score * weight;
            component
        })
        .collect()
}

/// Confidence-discounted weighted mean of component scores, falling back to
/// the simple mean when no component carries effective weight
pub fn weighted_score(components: &[RiskComponent]) -> f64 {
    let (weighted_sum, total_weight) = components.iter().fold((0.0, 0.0), |(sum, total), component| {
        let effective = component.weight * component.confidence;
        (sum + component.score * effective, total + effective)
    });

    let score = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else if components.is_empty() {
        50.0
    } else {
        components.iter().map(|c| c.score).sum::<f64>() / components.len() as f64
    };
    clamp_score(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(category: RiskCategory, score: f64, weight: f64, confidence: f64) -> RiskComponent {
        RiskComponent {
            category,
            score,
            weight,
            confidence,
            contribution: score * weight,
            contributing_factors: vec![],
            source_unit_id: None,
            source: ComponentSource::Derived,
            details: String::new(),
        }
    }

    #[test]
    fn test_confidence_discounted_weighting() {
        let components = vec![
            component(RiskCategory::Security, 40.0, 0.6, 1.0),
            component(RiskCategory::Financial, 60.0, 0.4, 1.0),
        ];
        assert!((weighted_score(&components) - 48.0).abs() < 1e-9);

        // a zero-confidence component carries no weight
        let components = vec![
            component(RiskCategory::Security, 40.0, 0.5, 1.0),
            component(RiskCategory::Financial, 90.0, 0.5, 0.0),
        ];
        assert_eq!(weighted_score(&components), 40.0);
    }

    #[test]
    fn test_simple_mean_fallback() {
        let components = vec![
            component(RiskCategory::Security, 20.0, 0.5, 0.0),
            component(RiskCategory::Financial, 80.0, 0.5, 0.0),
        ];
        assert_eq!(weighted_score(&components), 50.0);
        assert_eq!(weighted_score(&[]), 50.0);
    }

    #[test]
    fn test_defaults_skew_high_with_low_confidence() {
        for category in RiskCategory::ALL {
            let component = default_component(category);
            assert!(component.score >= 60.0 && component.score <= 75.0);
            assert!(component.confidence <= 0.3);
            assert!(component.is_default());
        }
    }

    #[test]
    fn test_every_weighted_category_is_represented() {
        let ctx = RunContext::new("run", "Lido");
        let outputs = UnitOutputs::from_context(&ctx).unwrap();
        let components = score_components(&outputs, &WeightSet::default());
        assert_eq!(components.len(), 4);
        assert!(components.iter().all(RiskComponent::is_default));
        let security = &components[0];
        assert_eq!(security.contribution, 75.0 * 0.35);
    }
}
