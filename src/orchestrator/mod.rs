pub mod phases;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    AssessmentOutcome, CancelledResult, ErrorAssessment, ErrorKind, Phase, RunContext, SynthesisOutcome, UnitId,
    UnitKind, UnitPayload, UnitResult,
};
use crate::risk::{SynthesisEngine, MIN_SUCCESSFUL_UNITS};
use crate::services::{subject_slug, AssessmentCache, ProtocolValidator, SessionStore};
use crate::units::{AnalysisUnit, UnitExecutor, UnitMemory, UnitStats};
use crate::utils::{AssessmentMetrics, CacheStats};

pub use phases::PhaseRunner;

const HEALTHY_SUCCESS_RATE: f64 = 0.5;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub validate_subjects: bool,
    /// Cap on analysis units in flight; `None` launches every unit at once
    pub max_concurrent_units: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            validate_subjects: true,
            max_concurrent_units: None,
        }
    }
}

/// The units an orchestrator schedules, one slot per phase
#[derive(Clone)]
pub struct UnitRoster {
    pub discovery: Arc<dyn AnalysisUnit>,
    pub analysis: Vec<Arc<dyn AnalysisUnit>>,
    pub synthesis: Arc<dyn AnalysisUnit>,
}

impl UnitRoster {
    pub fn all(&self) -> Vec<&Arc<dyn AnalysisUnit>> {
        let mut units = vec![&self.discovery];
        units.extend(self.analysis.iter());
        units.push(&self.synthesis);
        units
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitHealth {
    pub kind: UnitKind,
    #[serde(flatten)]
    pub stats: UnitStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitStatusReport {
    pub units: Vec<UnitHealth>,
    pub overall_health: HealthState,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatistics {
    pub total_runs: u64,
    pub cache_hits: u64,
    pub assessments: u64,
    pub insufficient_data: u64,
    pub errors: u64,
    pub cancelled: u64,
    pub active_sessions: usize,
    pub cache: Option<CacheStats>,
}

/// Runs assessments: validation, cache, then Discovery, Analysis and Synthesis
pub struct AssessmentOrchestrator {
    roster: UnitRoster,
    engine: Arc<SynthesisEngine>,
    executor: UnitExecutor,
    store: SessionStore,
    memory: Arc<UnitMemory>,
    cache: Option<AssessmentCache>,
    validator: ProtocolValidator,
    metrics: Arc<AssessmentMetrics>,
    config: OrchestratorConfig,
    total_runs: AtomicU64,
    cache_hits: AtomicU64,
}

impl AssessmentOrchestrator {
    pub fn new(
        roster: UnitRoster,
        engine: Arc<SynthesisEngine>,
        executor: UnitExecutor,
        store: SessionStore,
        config: OrchestratorConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            roster,
            engine,
            memory: Arc::clone(executor.memory()),
            executor,
            store,
            cache: None,
            validator: ProtocolValidator::default(),
            metrics: Arc::new(AssessmentMetrics::new()?),
            config,
            total_runs: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        })
    }

    pub fn with_cache(mut self, cache: AssessmentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_validator(mut self, validator: ProtocolValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn metrics(&self) -> &Arc<AssessmentMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn validator(&self) -> &ProtocolValidator {
        &self.validator
    }

    pub fn engine(&self) -> &Arc<SynthesisEngine> {
        &self.engine
    }

    pub async fn assess(&self, subject: &str) -> AssessmentOutcome {
        self.assess_with_cancel(subject, CancellationToken::new()).await
    }

    /// Assess `subject`. Always returns an outcome; faults become an `Error` stand-in.
    pub async fn assess_with_cancel(&self, subject: &str, cancel: CancellationToken) -> AssessmentOutcome {
        let started = Instant::now();
        self.total_runs.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.execute(subject, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(protocol = %subject, error = %e, "Assessment run failed");
                AssessmentOutcome::Error(Box::new(ErrorAssessment::new(
                    subject.trim(),
                    None,
                    ErrorKind::GeneralFailure,
                    e.to_string(),
                )))
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.record_run(outcome.label(), elapsed);
        info!(
            protocol = %subject,
            outcome = outcome.label(),
            duration_secs = elapsed,
            "Assessment run finished"
        );
        outcome
    }

    fn resolve_subject(&self, subject: &str) -> Result<String, Box<ErrorAssessment>> {
        let trimmed = subject.trim();
        if !self.config.validate_subjects {
            if trimmed.is_empty() {
                return Err(Box::new(ErrorAssessment::new(
                    trimmed,
                    None,
                    ErrorKind::UnsupportedSubject,
                    "Protocol name must not be empty",
                )));
            }
            return Ok(trimmed.to_string());
        }

        match self.validator.normalize_name(trimmed) {
            Some(name) => Ok(name),
            None => {
                let suggestions = self.validator.suggestions(trimmed, MAX_SUGGESTIONS);
                warn!(protocol = %trimmed, suggestions = ?suggestions, "Unsupported protocol requested");
                Err(Box::new(
                    ErrorAssessment::new(
                        trimmed,
                        None,
                        ErrorKind::UnsupportedSubject,
                        format!("Protocol '{}' is not supported", trimmed),
                    )
                    .with_suggestions(suggestions),
                ))
            }
        }
    }

    fn new_run_id(subject: &str) -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!(
            "assessment_{}_{}_{}",
            subject_slug(subject).replace('-', "_"),
            Utc::now().format("%Y%m%d_%H%M%S"),
            &uuid[..8]
        )
    }

    fn record_units(&self, results: &[UnitResult]) {
        for result in results {
            self.metrics.record_unit(result.unit_id.as_str(), result.succeeded);
        }
    }

    fn cancelled(subject: &str, run_id: &str, phase: Phase, completed_units: Vec<UnitId>) -> AssessmentOutcome {
        info!(protocol = %subject, run_id = %run_id, phase = %phase, "Assessment cancelled");
        AssessmentOutcome::Cancelled(CancelledResult {
            subject_name: subject.to_string(),
            run_id: run_id.to_string(),
            phase,
            completed_units,
            cancelled_at: Utc::now(),
        })
    }

    async fn execute(&self, subject: &str, cancel: &CancellationToken) -> Result<AssessmentOutcome, AppError> {
        let subject_name = match self.resolve_subject(subject) {
            Ok(name) => name,
            Err(error) => return Ok(AssessmentOutcome::Error(error)),
        };

        if let Some(cache) = &self.cache {
            let cached = cache.get(&subject_name).await;
            self.metrics.record_cache(cached.is_some());
            if let Some(assessment) = cached {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                info!(protocol = %subject_name, run_id = %assessment.run_id, "Returning cached assessment");
                return Ok(AssessmentOutcome::Assessment(Box::new(assessment)));
            }
        }

        let run_id = Self::new_run_id(&subject_name);
        info!(protocol = %subject_name, run_id = %run_id, "Starting multi-unit risk assessment");
        self.store
            .create(RunContext::new(run_id.clone(), subject_name.clone()).with_parameter("requested_subject", json!(subject)))
            .await;

        let runner = PhaseRunner::new(&self.executor, &self.store, &run_id, cancel);

        let discovery = runner.run_sequential(Phase::Discovery, self.roster.discovery.as_ref()).await?;
        self.record_units(std::slice::from_ref(&discovery));
        if runner.is_cancelled() {
            return Ok(Self::cancelled(&subject_name, &run_id, Phase::Discovery, runner.completed_units().await));
        }

        let analysis = runner
            .run_concurrent(Phase::Analysis, &self.roster.analysis, self.config.max_concurrent_units)
            .await?;
        self.record_units(&analysis);
        if runner.is_cancelled() {
            return Ok(Self::cancelled(&subject_name, &run_id, Phase::Analysis, runner.completed_units().await));
        }

        let ctx = runner.snapshot().await?;
        let phase_outputs = ctx
            .successful_results()
            .filter(|r| r.kind != UnitKind::Synthesis)
            .count();
        if phase_outputs < MIN_SUCCESSFUL_UNITS {
            warn!(
                protocol = %subject_name,
                run_id = %run_id,
                successful_units = phase_outputs,
                "Too few unit outputs, skipping synthesis"
            );
            return Ok(match self.engine.insufficient_data(&ctx) {
                Ok(report) => AssessmentOutcome::InsufficientData(report),
                Err(e) => AssessmentOutcome::Error(Box::new(ErrorAssessment::new(
                    &subject_name,
                    Some(run_id.clone()),
                    ErrorKind::WorkflowFailure,
                    e.to_string(),
                ))),
            });
        }

        let synthesis = runner.run_sequential(Phase::Synthesis, self.roster.synthesis.as_ref()).await?;
        self.record_units(std::slice::from_ref(&synthesis));
        if runner.is_cancelled() {
            return Ok(Self::cancelled(&subject_name, &run_id, Phase::Synthesis, runner.completed_units().await));
        }

        Ok(self.conclude(&subject_name, &run_id, synthesis).await)
    }

    async fn conclude(&self, subject_name: &str, run_id: &str, synthesis: UnitResult) -> AssessmentOutcome {
        if !synthesis.succeeded {
            error!(protocol = %subject_name, run_id = %run_id, errors = ?synthesis.errors, "Risk synthesis failed");
            return AssessmentOutcome::Error(Box::new(ErrorAssessment::new(
                subject_name,
                Some(run_id.to_string()),
                ErrorKind::WorkflowFailure,
                synthesis.errors.join("; "),
            )));
        }

        match synthesis.payload {
            UnitPayload::Synthesis(outcome) => match *outcome {
                SynthesisOutcome::Assessment(assessment) => {
                    if let Some(cache) = &self.cache {
                        cache.put(&assessment).await;
                    }
                    info!(
                        protocol = %subject_name,
                        run_id = %run_id,
                        final_score = assessment.final_score,
                        risk_tier = %assessment.risk_tier,
                        "Multi-unit risk assessment completed"
                    );
                    AssessmentOutcome::Assessment(Box::new(assessment))
                }
                SynthesisOutcome::InsufficientData(report) => AssessmentOutcome::InsufficientData(report),
            },
            _ => AssessmentOutcome::Error(Box::new(ErrorAssessment::new(
                subject_name,
                Some(run_id.to_string()),
                ErrorKind::WorkflowFailure,
                "Synthesis unit returned an unexpected payload",
            ))),
        }
    }

    /// Per-unit run statistics and overall health
    pub async fn get_unit_status(&self) -> UnitStatusReport {
        let mut units = Vec::new();
        for unit in self.roster.all() {
            units.push(UnitHealth {
                kind: unit.kind(),
                stats: self.memory.stats(&unit.unit_id()).await,
            });
        }
        let healthy = units
            .iter()
            .all(|u| u.stats.success_rate.map_or(true, |rate| rate >= HEALTHY_SUCCESS_RATE));

        UnitStatusReport {
            units,
            overall_health: if healthy { HealthState::Healthy } else { HealthState::Degraded },
            checked_at: Utc::now(),
        }
    }

    /// Drop every stored run context, unit memory and cached assessment
    pub async fn cleanup(&self) {
        let sessions = self.store.len().await;
        self.store.clear().await;
        self.memory.clear().await;
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
        info!(sessions_cleared = sessions, "Orchestrator cleanup completed");
    }

    pub async fn get_statistics(&self) -> OrchestratorStatistics {
        OrchestratorStatistics {
            total_runs: self.total_runs.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            assessments: self.metrics.runs_with_outcome("assessment"),
            insufficient_data: self.metrics.runs_with_outcome("insufficient_data"),
            errors: self.metrics.runs_with_outcome("error"),
            cancelled: self.metrics.runs_with_outcome("cancelled"),
            active_sessions: self.store.len().await,
            cache: self.cache.as_ref().map(AssessmentCache::stats),
        }
    }
}
