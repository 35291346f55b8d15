use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{Phase, RunContext, UnitId, UnitResult};
use crate::services::SessionStore;
use crate::units::{AnalysisUnit, UnitExecutor};

/// Drives the units of one phase against the run's stored context
pub struct PhaseRunner<'a> {
    executor: &'a UnitExecutor,
    store: &'a SessionStore,
    run_id: &'a str,
    cancel: &'a CancellationToken,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(executor: &'a UnitExecutor, store: &'a SessionStore, run_id: &'a str, cancel: &'a CancellationToken) -> Self {
        Self {
            executor,
            store,
            run_id,
            cancel,
        }
    }

    /// Context as the next phase will see it
    pub async fn snapshot(&self) -> Result<RunContext, AppError> {
        self.store
            .get(self.run_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", self.run_id)))
    }

    /// Ids of the units that have succeeded so far in this run
    pub async fn completed_units(&self) -> Vec<UnitId> {
        match self.store.get(self.run_id).await {
            Some(ctx) => ctx.successful_results().map(|r| r.unit_id.clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // The executor records successes; failures are recorded here so the run keeps a full trace
    async fn record_failure(&self, result: &UnitResult) {
        if result.succeeded {
            return;
        }
        if let Err(e) = self.store.append(self.run_id, result.clone()).await {
            warn!(run_id = %self.run_id, unit = %result.unit_id, error = %e, "Could not record failed unit result");
        }
    }

    /// Run a single unit; used by the discovery and synthesis phases
    pub async fn run_sequential(&self, phase: Phase, unit: &dyn AnalysisUnit) -> Result<UnitResult, AppError> {
        let ctx = self.snapshot().await?;
        info!(run_id = %self.run_id, phase = %phase, unit = %unit.unit_id(), "Starting phase");

        let result = self.executor.run(unit, &ctx, self.cancel).await;
        self.record_failure(&result).await;

        debug!(run_id = %self.run_id, phase = %phase, succeeded = result.succeeded, "Phase finished");
        Ok(result)
    }

    /// Launch every unit together and wait for all of them. A failing unit
    /// never cancels its siblings. With `max_concurrent` set, units beyond the
    /// cap start as earlier ones finish.
    pub async fn run_concurrent(
        &self,
        phase: Phase,
        units: &[Arc<dyn AnalysisUnit>],
        max_concurrent: Option<usize>,
    ) -> Result<Vec<UnitResult>, AppError> {
        let ctx = self.snapshot().await?;
        let limit = Arc::new(Semaphore::new(max_concurrent.unwrap_or(units.len()).max(1)));
        info!(run_id = %self.run_id, phase = %phase, units = units.len(), "Starting concurrent phase");

        let runs = units.iter().map(|unit| {
            let ctx = &ctx;
            let limit = Arc::clone(&limit);
            async move {
                let _permit = limit.acquire().await.ok();
                self.executor.run(unit.as_ref(), ctx, self.cancel).await
            }
        });
        let results = join_all(runs).await;

        for result in &results {
            self.record_failure(result).await;
        }

        let succeeded = results.iter().filter(|r| r.succeeded).count();
        info!(
            run_id = %self.run_id,
            phase = %phase,
            succeeded = succeeded,
            failed = results.len() - succeeded,
            "Concurrent phase finished"
        );
        Ok(results)
    }
}
