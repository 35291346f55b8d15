use std::collections::BTreeMap;

use crate::models::{
    ConfidenceLevel, ConsensusReport, DistributionShare, InsightConfidence, Recommendations, RiskCategory,
    RiskComponent, RiskDriver, RiskInsights, RiskTier, UnitId, UnitStatus, UnitSummary,
};
use crate::risk::components::UnitOutputs;
use crate::risk::consensus::describe_consensus;
use crate::utils::math::round_to;

const DRIVER_CONTRIBUTION_MIN: f64 = 5.0;
const MITIGATION_SCORE_MIN: f64 = 70.0;
const REASSESS_CONFIDENCE_MAX: f64 = 0.6;
const LOW_CONFIDENCE_MAX: f64 = 0.5;
const DISAGREEMENT_CONSENSUS_MAX: f64 = 0.6;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn category_list<'a>(components: impl Iterator<Item = &'a RiskComponent>) -> String {
    components.map(|c| c.category.as_str()).collect::<Vec<_>>().join(", ")
}

pub fn build_recommendations(components: &[RiskComponent], tier: RiskTier) -> Recommendations {
    let immediate_actions = match tier {
        RiskTier::High | RiskTier::Critical => strings(&[
            "Exercise extreme caution before interacting with this protocol",
            "Consider avoiding this protocol until risk factors are addressed",
            "If already exposed, consider reducing position size",
        ]),
        RiskTier::Medium => strings(&[
            "Proceed with caution and limit exposure",
            "Thoroughly understand the risk factors before investing",
            "Consider dollar-cost averaging for gradual exposure",
        ]),
        RiskTier::Low => strings(&[
            "Protocol appears relatively safe for interaction",
            "Standard due diligence still recommended",
            "Monitor for any changes in risk factors",
        ]),
    };

    let risk_mitigation = components
        .iter()
        .filter(|c| c.score > MITIGATION_SCORE_MIN)
        .map(|c| {
            match c.category {
                RiskCategory::Security => "Review smart contract audits and security practices",
                RiskCategory::Financial => "Monitor TVL and market metrics closely",
                RiskCategory::Technical => "Verify data sources and protocol transparency",
                RiskCategory::Governance => "Assess governance token distribution and decision-making processes",
            }
            .to_string()
        })
        .collect();

    let monitoring_suggestions = strings(&[
        "Set up alerts for significant TVL changes",
        "Monitor governance proposals and voting outcomes",
        "Track security audit updates and vulnerability disclosures",
        "Watch for changes in development activity",
        "Follow official announcements and community discussions",
    ]);

    let mut long_term_considerations = Vec::new();
    let low_confidence: Vec<&RiskComponent> = components
        .iter()
        .filter(|c| c.confidence < REASSESS_CONFIDENCE_MAX)
        .collect();
    if !low_confidence.is_empty() {
        long_term_considerations.push(format!(
            "Reassess when better data becomes available for {}",
            category_list(low_confidence.into_iter())
        ));
    }
    long_term_considerations.extend(strings(&[
        "Consider protocol evolution and ecosystem development",
        "Monitor competitive landscape and market position",
        "Evaluate protocol's response to market stress events",
    ]));

    Recommendations {
        immediate_actions,
        risk_mitigation,
        monitoring_suggestions,
        long_term_considerations,
    }
}

fn primary_drivers(components: &[RiskComponent]) -> Vec<RiskDriver> {
    let mut sorted: Vec<&RiskComponent> = components.iter().collect();
    sorted.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
    sorted
        .into_iter()
        .filter(|c| c.contribution > DRIVER_CONTRIBUTION_MIN)
        .map(|c| RiskDriver {
            category: c.category,
            score: c.score,
            contribution: c.contribution,
            confidence: c.confidence,
            top_factors: c.contributing_factors.iter().take(3).cloned().collect(),
        })
        .collect()
}

fn risk_distribution(components: &[RiskComponent]) -> BTreeMap<RiskCategory, DistributionShare> {
    let total: f64 = components.iter().map(|c| c.contribution).sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    components
        .iter()
        .map(|c| {
            (
                c.category,
                DistributionShare {
                    percentage: round_to(c.contribution / total * 100.0, 1),
                    score: c.score,
                    weight: c.weight,
                },
            )
        })
        .collect()
}

fn insight_confidence(consensus: f64, successes: usize, expected: usize) -> InsightConfidence {
    let (level, reasoning) = if successes >= expected && consensus > 0.8 {
        (ConfidenceLevel::High, "All units successful with strong consensus")
    } else if successes >= 2 && consensus > 0.6 {
        (ConfidenceLevel::Medium, "Multiple units with moderate consensus")
    } else if successes >= 2 {
        (ConfidenceLevel::Medium, "Multiple units but some disagreement")
    } else {
        (ConfidenceLevel::Low, "Limited unit data available")
    };
    InsightConfidence {
        level,
        reasoning: reasoning.to_string(),
        consensus_score: consensus,
        data_coverage: format!("{}/{} units", successes, expected),
    }
}

fn uncertainty_factors(consensus: &ConsensusReport, components: &[RiskComponent]) -> Vec<String> {
    let mut factors = Vec::new();
    if consensus.overall_consensus < DISAGREEMENT_CONSENSUS_MAX {
        factors.push("Significant disagreement between risk assessment methods".to_string());
    }

    let low_confidence: Vec<&RiskComponent> = components.iter().filter(|c| c.confidence < LOW_CONFIDENCE_MAX).collect();
    if !low_confidence.is_empty() {
        factors.push(format!(
            "Low confidence in {} assessment",
            category_list(low_confidence.into_iter())
        ));
    }

    let defaults: Vec<&RiskComponent> = components.iter().filter(|c| c.is_default()).collect();
    if !defaults.is_empty() {
        factors.push(format!("Missing primary data for {}", category_list(defaults.into_iter())));
    }

    factors.extend(consensus.conflicts.iter().cloned());
    factors
}

pub fn fallback_summary(subject_name: &str, tier: RiskTier) -> String {
    format!(
        "Comprehensive risk analysis completed for {} with {} risk level",
        subject_name, tier
    )
}

pub fn build_insights(
    subject_name: &str,
    tier: RiskTier,
    components: &[RiskComponent],
    consensus: &ConsensusReport,
    successes: usize,
    expected: usize,
) -> RiskInsights {
    RiskInsights {
        summary: fallback_summary(subject_name, tier),
        primary_risk_drivers: primary_drivers(components),
        risk_distribution: risk_distribution(components),
        confidence_assessment: insight_confidence(consensus.overall_consensus, successes, expected),
        uncertainty_factors: uncertainty_factors(consensus, components),
    }
}

pub fn executive_summary(
    subject_name: &str,
    final_score: f64,
    tier: RiskTier,
    components: &[RiskComponent],
    consensus: &ConsensusReport,
) -> String {
    let consensus_desc = describe_consensus(consensus.overall_consensus);
    let highest = components
        .iter()
        .fold(None::<&RiskComponent>, |best, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        });
    let reliable_sources = consensus
        .per_component_reliability
        .values()
        .filter(|r| r.reliability != crate::models::Reliability::Low)
        .count();

    let mut lines = vec![
        format!("Risk Assessment Summary for {}:", subject_name),
        String::new(),
        format!("OVERALL RISK: {} ({:.2}/100)", tier, final_score),
        String::new(),
        format!(
            "Multi-unit analysis indicates {} risk with {} between assessment methods.",
            tier.as_str().to_lowercase(),
            consensus_desc
        ),
    ];
    if let Some(highest) = highest {
        lines.push(format!(
            "The primary risk driver is {} with a score of {:.1}/100.",
            highest.category.label().to_lowercase(),
            highest.score
        ));
    }
    lines.push(String::new());
    lines.push("Key findings:".to_string());
    for component in components {
        lines.push(format!("- {}: {:.1}/100", component.category.label(), component.score));
    }
    lines.push(String::new());
    lines.push(format!(
        "Assessment confidence: {} based on {} high-quality data sources.",
        consensus_desc, reliable_sources
    ));
    lines.join("\n")
}

/// Per-unit status and headline numbers for every expected unit
pub fn unit_summaries(outputs: &UnitOutputs, expected: &[UnitId]) -> Vec<UnitSummary> {
    expected
        .iter()
        .map(|unit_id| {
            let result = outputs.successes.iter().find(|r| &r.unit_id == unit_id);
            let mut headline = BTreeMap::new();
            match result {
                Some(result) => {
                    if let Some((_, report)) = outputs.discovery.filter(|(r, _)| &r.unit_id == unit_id) {
                        headline.insert("data_quality".to_string(), report.overall_quality_score);
                        headline.insert("sources_found".to_string(), report.sources_found as f64);
                    }
                    if let Some((_, report)) = outputs.security.filter(|(r, _)| &r.unit_id == unit_id) {
                        headline.insert("security_score".to_string(), report.security_score);
                        headline.insert("governance_score".to_string(), report.governance.overall_score);
                    }
                    if let Some((_, report)) = outputs.financial.filter(|(r, _)| &r.unit_id == unit_id) {
                        headline.insert("financial_health_score".to_string(), report.financial_health_score);
                        headline.insert("market_score".to_string(), report.market.overall_score);
                    }
                    UnitSummary {
                        unit_id: unit_id.clone(),
                        status: UnitStatus::Success,
                        confidence: result.confidence,
                        headline,
                    }
                }
                None => UnitSummary {
                    unit_id: unit_id.clone(),
                    status: UnitStatus::Failed,
                    confidence: 0.0,
                    headline,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ComponentSource;

    fn component(category: RiskCategory, score: f64, weight: f64, confidence: f64) -> RiskComponent {
        RiskComponent {
            category,
            score,
            weight,
            confidence,
            contribution: score * weight,
            contributing_factors: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            source_unit_id: None,
            source: ComponentSource::Derived,
            details: String::new(),
        }
    }

    #[test]
    fn test_recommendations_follow_tier_and_scores() {
        let components = vec![
            component(RiskCategory::Security, 80.0, 0.5, 0.9),
            component(RiskCategory::Financial, 20.0, 0.5, 0.4),
        ];
        let recs = build_recommendations(&components, RiskTier::High);
        assert_eq!(recs.immediate_actions.len(), 3);
        assert_eq!(
            recs.risk_mitigation,
            vec!["Review smart contract audits and security practices".to_string()]
        );
        assert_eq!(recs.monitoring_suggestions.len(), 5);
        assert_eq!(
            recs.long_term_considerations[0],
            "Reassess when better data becomes available for financial"
        );
    }

    #[test]
    fn test_drivers_sorted_and_filtered() {
        let components = vec![
            component(RiskCategory::Security, 20.0, 0.2, 0.9),
            component(RiskCategory::Financial, 60.0, 0.5, 0.9),
            component(RiskCategory::Technical, 10.0, 0.3, 0.9),
        ];
        let drivers = primary_drivers(&components);
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].category, RiskCategory::Financial);
        assert_eq!(drivers[0].top_factors.len(), 3);

        let distribution = risk_distribution(&components);
        // contributions 4, 30, 3
        assert_eq!(distribution[&RiskCategory::Financial].percentage, 81.1);
    }

    #[test]
    fn test_insight_confidence_levels() {
        assert_eq!(insight_confidence(0.9, 3, 3).level, ConfidenceLevel::High);
        assert_eq!(insight_confidence(0.9, 2, 3).level, ConfidenceLevel::Medium);
        assert_eq!(insight_confidence(0.3, 2, 3).reasoning, "Multiple units but some disagreement");
        assert_eq!(insight_confidence(0.9, 1, 3).level, ConfidenceLevel::Low);
        assert_eq!(insight_confidence(0.9, 1, 3).data_coverage, "1/3 units");
    }
}
