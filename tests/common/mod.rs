#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use defi_risk_orchestrator::error::RetryPolicy;
use defi_risk_orchestrator::models::*;
use defi_risk_orchestrator::orchestrator::{AssessmentOrchestrator, OrchestratorConfig, UnitRoster};
use defi_risk_orchestrator::risk::{SynthesisEngine, WeightSet};
use defi_risk_orchestrator::services::SessionStore;
use defi_risk_orchestrator::units::{
    AnalysisUnit, ExecutorConfig, RiskSynthesizer, UnitAnalysis, UnitError, UnitExecutor, UnitMemory,
};

/// Fixed observation time, old enough that every report sits on the freshness floor
pub fn observed_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn security_report(security_score: f64) -> SecurityReport {
    SecurityReport {
        security_score,
        technical: AnalysisGroup::from_components(vec![FactorAssessment::new(
            "contract_verification",
            security_score,
            vec![],
            vec![],
        )]),
        governance: AnalysisGroup::from_components(vec![FactorAssessment::new(
            "decentralization",
            security_score,
            vec![],
            vec![],
        )]),
        risks: vec![],
        risk_factors: RiskFactors::default(),
        key_findings: vec![],
        security_rating: "GOOD".to_string(),
        recommendations: vec![],
        sources_used: SecuritySourcesUsed::default(),
        narrative: None,
        observed_at: observed_at(),
    }
}

pub fn financial_report(financial_health_score: f64) -> FinancialReport {
    let group = || {
        AnalysisGroup::from_components(vec![FactorAssessment::new(
            "tvl_analysis",
            financial_health_score,
            vec![],
            vec![],
        )])
    };
    FinancialReport {
        financial_health_score,
        financial: group(),
        market: group(),
        liquidity: group(),
        sustainability: group(),
        risks: vec![],
        risk_factors: RiskFactors::default(),
        financial_rating: "FAIR".to_string(),
        recommendations: vec![],
        sources_used: MarketSourcesUsed::default(),
        narrative: None,
        observed_at: observed_at(),
    }
}

pub fn discovery_report(overall_quality_score: f64) -> DiscoveryReport {
    DiscoveryReport {
        sources: vec![],
        sources_found: 3,
        overall_quality_score,
        freshness_score: 1.0,
        cross_validation: CrossValidation::default(),
        optimal_sources: vec![],
        fallback_sources: vec![],
        data_gaps: vec![],
        data_risks: vec![],
        snapshots: SourceSnapshots::default(),
        narrative: None,
        observed_at: observed_at(),
    }
}

pub fn security_payload(score: f64) -> UnitPayload {
    UnitPayload::Security(Box::new(security_report(score)))
}

pub fn financial_payload(health: f64) -> UnitPayload {
    UnitPayload::Financial(Box::new(financial_report(health)))
}

pub fn discovery_payload(quality: f64) -> UnitPayload {
    UnitPayload::Discovery(Box::new(discovery_report(quality)))
}

/// A successful result as the executor would record it
pub fn success(unit_id: &str, kind: UnitKind, payload: UnitPayload, confidence: f64) -> UnitResult {
    UnitResult {
        unit_id: UnitId::from(unit_id),
        kind,
        succeeded: true,
        payload,
        confidence,
        reasoning: format!("{} finished", unit_id),
        duration_ms: 10,
        attempts: 1,
        completed_at: observed_at(),
        errors: vec![],
    }
}

pub fn failure(unit_id: &str, kind: UnitKind) -> UnitResult {
    UnitResult::failure(UnitId::from(unit_id), kind, vec!["boom".to_string()], 10, 1)
}

pub fn context_with(results: Vec<UnitResult>) -> RunContext {
    let mut ctx = RunContext::new("assessment_test_run", "Aave V3");
    ctx.started_at = observed_at();
    for result in results {
        ctx.append(result);
    }
    ctx
}

pub fn two_category_weights() -> WeightSet {
    WeightSet::new(vec![(RiskCategory::Security, 0.6), (RiskCategory::Financial, 0.4)]).unwrap()
}

pub fn expected_units() -> Vec<UnitId> {
    vec![
        UnitId::from(UnitId::DATA_HUNTER),
        UnitId::from(UnitId::PROTOCOL_ANALYST),
        UnitId::from(UnitId::MARKET_INTELLIGENCE),
    ]
}

#[derive(Clone)]
pub enum Behavior {
    Succeed(UnitPayload),
    Fail(UnitError),
    Hang,
    /// Index into an empty vector
    Panic,
    /// Wait at the barrier, then succeed with the payload
    Rendezvous(Arc<Barrier>, UnitPayload),
    /// Cancel the token, then succeed with the payload
    CancelRun(CancellationToken, UnitPayload),
}

/// Unit with scripted behavior that counts its invocations
pub struct StubUnit {
    id: &'static str,
    kind: UnitKind,
    behavior: Behavior,
    calls: AtomicU32,
}

impl StubUnit {
    pub fn new(id: &'static str, kind: UnitKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            behavior,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisUnit for StubUnit {
    fn unit_id(&self) -> UnitId {
        UnitId::from(self.id)
    }

    fn kind(&self) -> UnitKind {
        self.kind
    }

    async fn analyze(&self, _ctx: &RunContext) -> Result<UnitAnalysis, UnitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed(payload) => Ok(UnitAnalysis::new(payload.clone(), 1.0, format!("{} done", self.id))),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(UnitAnalysis::new(UnitPayload::Empty, 1.0, "late"))
            }
            Behavior::Panic => {
                let scores: Vec<f64> = Vec::new();
                Ok(UnitAnalysis::new(UnitPayload::Empty, scores[0], "unreachable"))
            }
            Behavior::Rendezvous(barrier, payload) => {
                barrier.wait().await;
                Ok(UnitAnalysis::new(payload.clone(), 1.0, format!("{} done", self.id)))
            }
            Behavior::CancelRun(token, payload) => {
                token.cancel();
                Ok(UnitAnalysis::new(payload.clone(), 1.0, format!("{} done", self.id)))
            }
        }
    }
}

pub fn discovery_unit(behavior: Behavior) -> Arc<StubUnit> {
    StubUnit::new(UnitId::DATA_HUNTER, UnitKind::Discovery, behavior)
}

pub fn security_unit(behavior: Behavior) -> Arc<StubUnit> {
    StubUnit::new(UnitId::PROTOCOL_ANALYST, UnitKind::Analysis, behavior)
}

pub fn market_unit(behavior: Behavior) -> Arc<StubUnit> {
    StubUnit::new(UnitId::MARKET_INTELLIGENCE, UnitKind::Analysis, behavior)
}

/// Orchestrator over stub discovery and analysis units with the real synthesizer
pub fn orchestrator_with(
    discovery: Arc<dyn AnalysisUnit>,
    analysis: Vec<Arc<dyn AnalysisUnit>>,
    weights: WeightSet,
    timeout: Duration,
) -> AssessmentOrchestrator {
    let engine = Arc::new(SynthesisEngine::new(weights, expected_units()));
    let roster = UnitRoster {
        discovery,
        analysis,
        synthesis: Arc::new(RiskSynthesizer::new(Arc::clone(&engine))),
    };
    let store = SessionStore::new(Duration::from_secs(3_600));
    let executor = UnitExecutor::new(
        ExecutorConfig {
            timeout,
            retry_policy: RetryPolicy::immediate(2),
        },
        store.clone(),
        Arc::new(UnitMemory::new()),
    );
    AssessmentOrchestrator::new(roster, engine, executor, store, OrchestratorConfig::default()).unwrap()
}
