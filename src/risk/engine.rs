use tracing::{debug, info};

use crate::models::{
    FinalAssessment, InsufficientDataResult, RunContext, RiskTier, SynthesisOutcome, UnitId,
};
use crate::risk::components::{score_components, weighted_score, UnitOutputs};
use crate::risk::consensus::assess_consensus;
use crate::risk::errors::RiskError;
use crate::risk::findings::extract_findings;
use crate::risk::insights::{build_insights, build_recommendations, executive_summary, unit_summaries};
use crate::risk::weights::WeightSet;
use crate::utils::math::{clamp_unit, mean, round_to};

pub const MIN_SUCCESSFUL_UNITS: usize = 2;

const UNIT_CONFIDENCE_WEIGHT: f64 = 0.25;
const CONSENSUS_WEIGHT: f64 = 0.25;
const COMPLETENESS_WEIGHT: f64 = 0.25;
const CERTAINTY_WEIGHT: f64 = 0.25;
const CONFIDENCE_FLOOR: f64 = 0.1;

/// Combines the unit outputs of a run into one verdict. Pure: the same
/// context always compiles to the same outcome.
#[derive(Debug, Clone)]
pub struct SynthesisEngine {
    weights: WeightSet,
    expected_units: Vec<UnitId>,
}

impl SynthesisEngine {
    pub fn new(weights: WeightSet, expected_units: Vec<UnitId>) -> Self {
        Self { weights, expected_units }
    }

    pub fn weights(&self) -> &WeightSet {
        &self.weights
    }

    pub fn expected_units(&self) -> &[UnitId] {
        &self.expected_units
    }

    fn expected_count(&self) -> usize {
        self.expected_units.len().max(1)
    }

    fn insufficient(&self, ctx: &RunContext, outputs: &UnitOutputs) -> InsufficientDataResult {
        let available_units: Vec<UnitId> = outputs.successes.iter().map(|r| r.unit_id.clone()).collect();
        let missing_units: Vec<UnitId> = self
            .expected_units
            .iter()
            .filter(|id| !available_units.contains(id))
            .cloned()
            .collect();
        let missing_list = missing_units.iter().map(UnitId::as_str).collect::<Vec<_>>().join(", ");

        InsufficientDataResult {
            subject_name: ctx.subject_name.clone(),
            run_id: ctx.run_id.clone(),
            minimum_requirements_met: outputs.has_analysis(),
            message: format!(
                "Insufficient unit data for comprehensive risk synthesis. Successful units: {}/{}. Missing: [{}]",
                available_units.len(),
                self.expected_count(),
                missing_list
            ),
            available_units,
            missing_units,
        }
    }

    /// Insufficient-data report for `ctx` as it stands, used to end a run before synthesis
    pub fn insufficient_data(&self, ctx: &RunContext) -> Result<InsufficientDataResult, RiskError> {
        let outputs = UnitOutputs::from_context(ctx)?;
        Ok(self.insufficient(ctx, &outputs))
    }

    /// Final verdict, or an insufficient-data report when fewer than two units
    /// succeeded or none of the successes is an analysis unit
    pub fn synthesize(&self, ctx: &RunContext) -> Result<SynthesisOutcome, RiskError> {
        let outputs = UnitOutputs::from_context(ctx)?;
        let successes = outputs.successes.len();

        if successes < MIN_SUCCESSFUL_UNITS || !outputs.has_analysis() {
            info!(
                protocol = %ctx.subject_name,
                run_id = %ctx.run_id,
                successful_units = successes,
                "Insufficient unit data for synthesis"
            );
            return Ok(SynthesisOutcome::InsufficientData(self.insufficient(ctx, &outputs)));
        }

        let components = score_components(&outputs, &self.weights);
        let consensus = assess_consensus(&components);
        let final_score = round_to(weighted_score(&components), 2);
        if !final_score.is_finite() {
            return Err(RiskError::CalculationError {
                message: "final score is not finite".to_string(),
            });
        }
        let risk_tier = RiskTier::from_score(final_score);

        let unit_confidence = mean(&outputs.successes.iter().map(|r| r.confidence).collect::<Vec<_>>()).unwrap_or(0.0);
        let completeness = (successes as f64 / self.expected_count() as f64).min(1.0);
        let certainty = (1.0 - consensus.confidence_variance.unwrap_or(0.0)).max(0.0);
        let confidence = round_to(
            (unit_confidence * UNIT_CONFIDENCE_WEIGHT
                + consensus.overall_consensus * CONSENSUS_WEIGHT
                + completeness * COMPLETENESS_WEIGHT
                + certainty * CERTAINTY_WEIGHT)
                .clamp(CONFIDENCE_FLOOR, 1.0),
            3,
        );
        debug!(
            run_id = %ctx.run_id,
            unit_confidence = unit_confidence,
            consensus = consensus.overall_consensus,
            completeness = completeness,
            "Computed overall confidence"
        );

        let findings = extract_findings(&outputs);
        let recommendations = build_recommendations(&components, risk_tier);
        let insights = build_insights(
            &ctx.subject_name,
            risk_tier,
            &components,
            &consensus,
            successes,
            self.expected_count(),
        );
        let summary = executive_summary(&ctx.subject_name, final_score, risk_tier, &components, &consensus);
        let computed_at = outputs
            .successes
            .iter()
            .map(|r| r.completed_at)
            .max()
            .unwrap_or(ctx.started_at);

        info!(
            protocol = %ctx.subject_name,
            run_id = %ctx.run_id,
            final_score = final_score,
            risk_tier = %risk_tier,
            confidence = clamp_unit(confidence),
            "Risk synthesis completed"
        );

        Ok(SynthesisOutcome::Assessment(FinalAssessment {
            subject_name: ctx.subject_name.clone(),
            final_score,
            risk_tier,
            confidence,
            unit_summaries: unit_summaries(&outputs, &self.expected_units),
            components,
            consensus,
            critical_findings: findings.critical,
            major_findings: findings.major,
            minor_findings: findings.minor,
            recommendations,
            insights,
            executive_summary: summary,
            run_id: ctx.run_id.clone(),
            computed_at,
        }))
    }
}

impl Default for SynthesisEngine {
    fn default() -> Self {
        Self::new(
            WeightSet::default(),
            vec![
                UnitId::from(UnitId::DATA_HUNTER),
                UnitId::from(UnitId::PROTOCOL_ANALYST),
                UnitId::from(UnitId::MARKET_INTELLIGENCE),
            ],
        )
    }
}
