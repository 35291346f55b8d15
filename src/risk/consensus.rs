use std::collections::BTreeMap;

use crate::models::{ComponentReliability, ConsensusReport, Reliability, RiskComponent};
use crate::utils::math::{clamp_unit, mean, sample_variance};

pub const NEUTRAL_CONSENSUS: f64 = 0.5;
/// Consensus when fewer than two derived components can be compared
pub const NO_CONSENSUS: f64 = 0.0;
const STRONG_RANGE: f64 = 20.0;
const MODERATE_RANGE: f64 = 40.0;

/// Agreement between the components that came from real unit output.
/// Conservative defaults never take part.
pub fn assess_consensus(components: &[RiskComponent]) -> ConsensusReport {
    let derived: Vec<&RiskComponent> = components.iter().filter(|c| !c.is_default()).collect();

    let per_component_reliability: BTreeMap<_, _> = components
        .iter()
        .map(|c| {
            (
                c.category,
                ComponentReliability {
                    score: c.score,
                    confidence: c.confidence,
                    reliability: Reliability::from_confidence(c.confidence),
                },
            )
        })
        .collect();

    let mut report = ConsensusReport {
        overall_consensus: NO_CONSENSUS,
        per_component_reliability,
        agreements: Vec::new(),
        conflicts: Vec::new(),
        confidence_variance: None,
    };
    if derived.len() < 2 {
        return report;
    }

    let scores: Vec<f64> = derived.iter().map(|c| c.score).collect();
    let confidences: Vec<f64> = derived.iter().map(|c| c.confidence).collect();

    let score_mean = mean(&scores).unwrap_or(0.0);
    let score_variance = sample_variance(&scores).unwrap_or(0.0);
    report.overall_consensus = if score_mean > 0.0 {
        clamp_unit(1.0 - score_variance / score_mean.powi(2))
    } else {
        NEUTRAL_CONSENSUS
    };
    report.confidence_variance = sample_variance(&confidences);

    let max = scores.iter().cloned().fold(f64::MIN, f64::max);
    let min = scores.iter().cloned().fold(f64::MAX, f64::min);
    let range = max - min;
    if range < STRONG_RANGE {
        report
            .agreements
            .push(format!("Strong consensus on risk level (range: {:.1} points)", range));
    } else if range < MODERATE_RANGE {
        report
            .agreements
            .push(format!("Moderate consensus on risk level (range: {:.1} points)", range));
    } else {
        report
            .conflicts
            .push(format!("Significant disagreement on risk level (range: {:.1} points)", range));
    }
    report
}

/// Wording used in summaries for a consensus value
pub fn describe_consensus(consensus: f64) -> &'static str {
    if consensus > 0.8 {
        "strong consensus"
    } else if consensus > 0.6 {
        "moderate consensus"
    } else {
        "limited consensus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentSource, RiskCategory};

    fn component(category: RiskCategory, score: f64, source: ComponentSource) -> RiskComponent {
        RiskComponent {
            category,
            score,
            weight: 0.25,
            confidence: 0.9,
            contribution: score * 0.25,
            contributing_factors: vec![],
            source_unit_id: None,
            source,
            details: String::new(),
        }
    }

    #[test]
    fn test_identical_scores_reach_full_consensus() {
        let components = vec![
            component(RiskCategory::Security, 42.0, ComponentSource::Derived),
            component(RiskCategory::Financial, 42.0, ComponentSource::Derived),
            component(RiskCategory::Technical, 42.0, ComponentSource::Derived),
        ];
        let report = assess_consensus(&components);
        assert_eq!(report.overall_consensus, 1.0);
        assert_eq!(report.agreements, vec!["Strong consensus on risk level (range: 0.0 points)".to_string()]);
        assert_eq!(report.confidence_variance, Some(0.0));
    }

    #[test]
    fn test_wide_spread_is_a_conflict() {
        let components = vec![
            component(RiskCategory::Security, 20.0, ComponentSource::Derived),
            component(RiskCategory::Financial, 80.0, ComponentSource::Derived),
        ];
        let report = assess_consensus(&components);
        // variance 1800 over mean² 2500
        assert!((report.overall_consensus - 0.28).abs() < 1e-9);
        assert!(report.agreements.is_empty());
        assert_eq!(
            report.conflicts,
            vec!["Significant disagreement on risk level (range: 60.0 points)".to_string()]
        );
    }

    #[test]
    fn test_defaults_are_excluded() {
        let components = vec![
            component(RiskCategory::Security, 30.0, ComponentSource::Derived),
            component(RiskCategory::Financial, 60.0, ComponentSource::Default),
        ];
        let report = assess_consensus(&components);
        assert_eq!(report.overall_consensus, NO_CONSENSUS);
        assert_eq!(report.confidence_variance, None);
        assert!(report.agreements.is_empty() && report.conflicts.is_empty());
        assert_eq!(report.per_component_reliability.len(), 2);
    }

    #[test]
    fn test_zero_mean_is_neutral() {
        let components = vec![
            component(RiskCategory::Security, 0.0, ComponentSource::Derived),
            component(RiskCategory::Financial, 0.0, ComponentSource::Derived),
        ];
        assert_eq!(assess_consensus(&components).overall_consensus, NEUTRAL_CONSENSUS);
    }
}
