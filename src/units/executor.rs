use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RetryPolicy;
use crate::models::{RunContext, UnitResult};
use crate::services::SessionStore;
use crate::units::confidence::{compute_confidence, ConfidenceInputs};
use crate::units::memory::UnitMemory;
use crate::units::traits::{AnalysisUnit, UnitAnalysis, UnitError};

pub const TIMEOUT_ERROR: &str = "timeout";
pub const CANCELLED_ERROR: &str = "cancelled";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            retry_policy: RetryPolicy::default(),
        }
    }
}

enum AttemptOutcome {
    Success(UnitAnalysis),
    Failed(UnitError),
    TimedOut,
    Cancelled,
    Panicked(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs units with bounded time, retries and cancellation, and turns every
/// outcome into a `UnitResult`
#[derive(Clone)]
pub struct UnitExecutor {
    config: ExecutorConfig,
    store: SessionStore,
    memory: Arc<UnitMemory>,
}

impl UnitExecutor {
    pub fn new(config: ExecutorConfig, store: SessionStore, memory: Arc<UnitMemory>) -> Self {
        Self { config, store, memory }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<UnitMemory> {
        &self.memory
    }

    async fn attempt(&self, unit: &dyn AnalysisUnit, ctx: &RunContext, cancel: &CancellationToken) -> AttemptOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => AttemptOutcome::Cancelled,
            outcome = tokio::time::timeout(self.config.timeout, AssertUnwindSafe(unit.analyze(ctx)).catch_unwind()) => match outcome {
                Ok(Ok(Ok(analysis))) => AttemptOutcome::Success(analysis),
                Ok(Ok(Err(UnitError::Cancelled))) => AttemptOutcome::Cancelled,
                Ok(Ok(Err(UnitError::Timeout))) => AttemptOutcome::TimedOut,
                Ok(Ok(Err(error))) => AttemptOutcome::Failed(error),
                Ok(Err(payload)) => AttemptOutcome::Panicked(panic_message(payload)),
                Err(_) => AttemptOutcome::TimedOut,
            },
        }
    }

    /// Execute `unit` against `ctx`. Never fails: faults, panics included,
    /// become a failed result. A panicking unit is not retried.
    pub async fn run(&self, unit: &dyn AnalysisUnit, ctx: &RunContext, cancel: &CancellationToken) -> UnitResult {
        let unit_id = unit.unit_id();
        let started = Instant::now();
        let max_attempts = self.config.retry_policy.max_attempts.max(1);
        let mut attempts = 0;

        let outcome = loop {
            attempts += 1;
            debug!(unit = %unit_id, run_id = %ctx.run_id, attempt = attempts, "Executing unit");

            match self.attempt(unit, ctx, cancel).await {
                AttemptOutcome::Failed(error) if error.retryable() && attempts < max_attempts => {
                    let delay = self.config.retry_policy.delay_for(attempts - 1);
                    warn!(
                        unit = %unit_id,
                        run_id = %ctx.run_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Unit attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break AttemptOutcome::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => break other,
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let kind = unit.kind();

        let result = match outcome {
            AttemptOutcome::Success(analysis) => {
                let now = Utc::now();
                let inputs = ConfidenceInputs {
                    field_presence: analysis.payload.field_presence(unit.required_fields()),
                    observed_at: analysis.payload.observed_at(),
                    has_warnings: !analysis.warnings.is_empty(),
                    completeness: analysis.completeness,
                    historical_success: self.memory.historical_success(&unit_id, &ctx.subject_name).await,
                    calibration_factor: self.memory.calibration_factor(&unit_id).await,
                };
                UnitResult {
                    unit_id: unit_id.clone(),
                    kind,
                    succeeded: true,
                    payload: analysis.payload,
                    confidence: compute_confidence(&inputs, now),
                    reasoning: analysis.reasoning,
                    duration_ms,
                    attempts,
                    completed_at: now,
                    errors: analysis.warnings,
                }
            }
            AttemptOutcome::Failed(error) => {
                warn!(unit = %unit_id, run_id = %ctx.run_id, attempts = attempts, error = %error, "Unit failed");
                UnitResult::failure(unit_id.clone(), kind, vec![error.to_string()], duration_ms, attempts)
            }
            AttemptOutcome::TimedOut => {
                warn!(
                    unit = %unit_id,
                    run_id = %ctx.run_id,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Unit timed out"
                );
                UnitResult::failure(unit_id.clone(), kind, vec![TIMEOUT_ERROR.to_string()], duration_ms, attempts)
            }
            AttemptOutcome::Cancelled => {
                info!(unit = %unit_id, run_id = %ctx.run_id, "Unit cancelled");
                UnitResult::failure(unit_id.clone(), kind, vec![CANCELLED_ERROR.to_string()], duration_ms, attempts)
            }
            AttemptOutcome::Panicked(message) => {
                error!(unit = %unit_id, run_id = %ctx.run_id, panic = %message, "Unit panicked");
                UnitResult::failure(
                    unit_id.clone(),
                    kind,
                    vec![format!("panic: {}", message)],
                    duration_ms,
                    attempts,
                )
            }
        };

        if result.succeeded {
            if let Err(e) = self.store.append(&ctx.run_id, result.clone()).await {
                warn!(unit = %unit_id, run_id = %ctx.run_id, error = %e, "Could not record unit result");
            }
        }
        self.memory
            .record(&unit_id, &ctx.subject_name, &ctx.run_id, result.succeeded, result.confidence)
            .await;

        info!(
            unit = %unit_id,
            run_id = %ctx.run_id,
            succeeded = result.succeeded,
            confidence = result.confidence,
            duration_ms = duration_ms,
            attempts = attempts,
            "Unit finished"
        );
        result
    }
}
