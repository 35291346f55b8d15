use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::models::{RunContext, SynthesisOutcome, UnitId, UnitKind, UnitPayload};
use crate::risk::SynthesisEngine;
use crate::services::NarrativeGenerator;
use crate::units::traits::{AnalysisUnit, UnitAnalysis, UnitError};

/// Synthesis unit: compiles every prior result into the run's verdict
pub struct RiskSynthesizer {
    engine: Arc<SynthesisEngine>,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
}

impl RiskSynthesizer {
    pub fn new(engine: Arc<SynthesisEngine>) -> Self {
        Self { engine, narrator: None }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn engine(&self) -> &Arc<SynthesisEngine> {
        &self.engine
    }
}

#[async_trait]
impl AnalysisUnit for RiskSynthesizer {
    fn unit_id(&self) -> UnitId {
        UnitId::from(UnitId::RISK_SYNTHESIZER)
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Synthesis
    }

    async fn analyze(&self, ctx: &RunContext) -> Result<UnitAnalysis, UnitError> {
        info!(protocol = %ctx.subject_name, run_id = %ctx.run_id, "Starting risk synthesis");

        match self.engine.synthesize(ctx)? {
            SynthesisOutcome::Assessment(mut assessment) => {
                if let Some(narrator) = &self.narrator {
                    let prompt = format!(
                        "Provide risk insights for {} based on the multi-unit analysis below.",
                        ctx.subject_name
                    );
                    let scores: serde_json::Map<String, serde_json::Value> = assessment
                        .components
                        .iter()
                        .map(|c| (c.category.as_str().to_string(), json!(c.score)))
                        .collect();
                    let context = json!({
                        "final_risk_score": assessment.final_score,
                        "risk_level": assessment.risk_tier,
                        "consensus_score": assessment.consensus.overall_consensus,
                        "component_scores": scores,
                    });
                    match narrator.generate(&prompt, &context).await {
                        Ok(text) => assessment.insights.summary = text,
                        Err(e) => warn!(run_id = %ctx.run_id, error = %e, "Narrative unavailable, keeping fallback summary"),
                    }
                }

                let confidence = assessment.confidence;
                let reasoning = assessment.executive_summary.clone();
                Ok(UnitAnalysis::new(
                    UnitPayload::Synthesis(Box::new(SynthesisOutcome::Assessment(assessment))),
                    confidence,
                    reasoning,
                ))
            }
            SynthesisOutcome::InsufficientData(report) => {
                let reasoning = report.message.clone();
                Ok(UnitAnalysis::new(
                    UnitPayload::Synthesis(Box::new(SynthesisOutcome::InsufficientData(report))),
                    0.0,
                    reasoning,
                ))
            }
        }
    }
}
