use chrono::{Duration, Utc};
use proptest::prelude::*;
use quickcheck_macros::quickcheck;

use defi_risk_orchestrator::models::{ComponentSource, RiskCategory, RiskComponent, RiskTier};
use defi_risk_orchestrator::risk::{assess_consensus, weighted_score, WeightSet};
use defi_risk_orchestrator::units::{compute_confidence, ConfidenceInputs};
use defi_risk_orchestrator::utils::math::{clamp_score, round_to};

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

fn components_strategy() -> impl Strategy<Value = Vec<RiskComponent>> {
    (
        prop::array::uniform4(0.0f64..=100.0),
        prop::array::uniform4(0.01f64..=1.0),
        prop::array::uniform4(0.0f64..=1.0),
    )
        .prop_map(|(scores, raw_weights, confidences)| {
            let total: f64 = raw_weights.iter().sum();
            RiskCategory::ALL
                .iter()
                .enumerate()
                .map(|(i, category)| component(*category, scores[i], raw_weights[i] / total, confidences[i]))
                .collect()
        })
}

proptest! {
    #[test]
    fn weighted_score_stays_within_component_range(components in components_strategy()) {
        let score = weighted_score(&components);
        let min = components.iter().map(|c| c.score).fold(f64::MAX, f64::min);
        let max = components.iter().map(|c| c.score).fold(f64::MIN, f64::max);

        prop_assert!((0.0..=100.0).contains(&score));
        prop_assert!(score >= min - 1e-9 && score <= max + 1e-9);
    }

    #[test]
    fn identical_scores_give_that_score_and_full_consensus(
        score in 1.0f64..=100.0,
        confidence in 0.05f64..=1.0,
    ) {
        let components: Vec<RiskComponent> = RiskCategory::ALL
            .iter()
            .map(|category| component(*category, score, 0.25, confidence))
            .collect();

        prop_assert!((weighted_score(&components) - score).abs() < 1e-9);
        prop_assert!((assess_consensus(&components).overall_consensus - 1.0).abs() < 1e-12);
    }

    #[test]
    fn consensus_is_a_unit_interval(components in components_strategy()) {
        let consensus = assess_consensus(&components);
        prop_assert!((0.0..=1.0).contains(&consensus.overall_consensus));
        prop_assert_eq!(consensus.per_component_reliability.len(), 4);
    }

    #[test]
    fn normalized_weights_sum_to_one(raw in prop::array::uniform4(0.01f64..=10.0)) {
        let entries = RiskCategory::ALL.iter().copied().zip(raw.iter().copied()).collect();
        let weights = WeightSet::normalized(entries).unwrap();
        prop_assert!((weights.total() - 1.0).abs() < 1e-6);
        prop_assert!(WeightSet::new(weights.iter().collect()).is_ok());
    }

    #[test]
    fn tiers_are_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(RiskTier::from_score(low) <= RiskTier::from_score(high));
    }

    #[test]
    fn confidence_is_bounded_and_rounded(
        field_presence in 0.0f64..=1.0,
        completeness in -0.5f64..=1.5,
        age_hours in 0i64..=200,
        history in prop::option::of(0.0f64..=1.0),
        calibration in 0.0f64..=2.0,
        has_warnings in any::<bool>(),
    ) {
        let now = Utc::now();
        let inputs = ConfidenceInputs {
            field_presence,
            observed_at: Some(now - Duration::hours(age_hours)),
            has_warnings,
            completeness,
            historical_success: history,
            calibration_factor: calibration,
        };
        let confidence = compute_confidence(&inputs, now);
        prop_assert!((0.0..=1.0).contains(&confidence));
        prop_assert_eq!(round_to(confidence, 3), confidence);
    }
}

#[quickcheck]
fn clamp_score_is_in_range(value: f64) -> bool {
    (0.0..=100.0).contains(&clamp_score(value))
}

#[quickcheck]
fn round_to_is_idempotent(value: i32) -> bool {
    let v = value as f64 / 1000.0;
    round_to(round_to(v, 2), 2) == round_to(v, 2)
}
